use super::http_client::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendType {
    Csv,
    Sqlite,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone)]
pub struct DominosConfig {
    pub base_url: String,
    pub stores_url: String,
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct PizzaHutConfig {
    pub base_url: String,
    pub sectors: Vec<String>,
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct PizzaPizzaConfig {
    pub base_url: String,
    pub session_token: Option<String>,
    pub store_ids: Vec<u32>,
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

/// Acquisition-side settings, read once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub backend: BackendType,
    pub raw_dir: PathBuf,
    pub raw_db: PathBuf,
    pub channel_buffer: usize,
    pub request_timeout: Duration,
    pub dominos: Option<DominosConfig>,
    pub pizza_hut: Option<PizzaHutConfig>,
    pub pizza_pizza: Option<PizzaPizzaConfig>,
}

const ALL_CHAINS: [&str; 3] = ["dominos", "pizzahut", "pizzapizza"];

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key → value lookup (environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = match var("MENUFLOW_RAW_BACKEND", "csv").to_lowercase().as_str() {
            "csv" => BackendType::Csv,
            "sqlite" => BackendType::Sqlite,
            other => {
                log::warn!("Invalid MENUFLOW_RAW_BACKEND '{}', defaulting to csv", other);
                BackendType::Csv
            }
        };

        let raw_dir = PathBuf::from(var("MENUFLOW_RAW_DIR", "data/raw"));
        let raw_db = PathBuf::from(var("MENUFLOW_RAW_DB", "data/raw/menuflow.db"));

        let channel_buffer = var("MENUFLOW_CHANNEL_BUFFER", "10000")
            .parse::<usize>()
            .unwrap_or(10_000)
            .max(1);

        let request_timeout = Duration::from_secs(
            var("MENUFLOW_REQUEST_TIMEOUT_SECS", "20").parse::<u64>().unwrap_or(20),
        );

        let chains: Vec<String> = list(&var("MENUFLOW_CHAINS", &ALL_CHAINS.join(",")))
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();
        for chain in &chains {
            if !ALL_CHAINS.contains(&chain.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "MENUFLOW_CHAINS contains unknown chain '{}'",
                    chain
                )));
            }
        }
        let selected = |name: &str| chains.iter().any(|c| c == name);

        let dominos = if selected("dominos") {
            Some(DominosConfig {
                base_url: url_var(&lookup, "DOMINOS_BASE_URL", "https://order.dominos.ca/power")?,
                stores_url: url_var(&lookup, "DOMINOS_STORES_URL", "https://pizza.dominos.ca/")?,
                max_workers: workers(&var("DOMINOS_MAX_WORKERS", "15"), 15),
                retry: RetryPolicy::default(),
            })
        } else {
            None
        };

        let pizza_hut = if selected("pizzahut") {
            let cooldown = var("PIZZAHUT_COOLDOWN_SECS", "15").parse::<u64>().unwrap_or(15);
            Some(PizzaHutConfig {
                base_url: url_var(&lookup, "PIZZAHUT_BASE_URL", "https://api.pizzahut.io")?,
                sectors: list(&var("PIZZAHUT_SECTORS", "ca-1,ca-2")),
                max_workers: workers(&var("PIZZAHUT_MAX_WORKERS", "32"), 32),
                retry: RetryPolicy {
                    throttle_floor: Duration::from_secs(cooldown),
                    ..RetryPolicy::default()
                },
            })
        } else {
            None
        };

        let pizza_pizza = if selected("pizzapizza") {
            Some(PizzaPizzaConfig {
                base_url: url_var(&lookup, "PIZZAPIZZA_BASE_URL", "https://www.pizzapizza.ca/ajax")?,
                session_token: lookup("PIZZAPIZZA_SESSION_TOKEN").filter(|t| !t.trim().is_empty()),
                store_ids: parse_store_ids(&var("PIZZAPIZZA_STORE_IDS", "1-2000"))?,
                max_workers: workers(&var("PIZZAPIZZA_MAX_WORKERS", "32"), 32),
                retry: RetryPolicy::default(),
            })
        } else {
            None
        };

        Ok(Self {
            backend,
            raw_dir,
            raw_db,
            channel_buffer,
            request_timeout,
            dominos,
            pizza_hut,
            pizza_pizza,
        })
    }
}

/// Parse `"1-500"`, `"1,2,3"`, `"10"` or a mix (`"1-3,7"`).
pub fn parse_store_ids(ranges: &str) -> Result<Vec<u32>, ConfigError> {
    let invalid = |part: &str| ConfigError::InvalidValue(format!("store id range '{}'", part));

    let mut ids = Vec::new();
    for part in list(ranges) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid(&part))?;
                let end: u32 = end.trim().parse().map_err(|_| invalid(&part))?;
                if start > end {
                    return Err(invalid(&part));
                }
                ids.extend(start..=end);
            }
            None => ids.push(part.parse().map_err(|_| invalid(&part))?),
        }
    }
    if ids.is_empty() {
        return Err(ConfigError::InvalidValue("store id range is empty".to_string()));
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn workers(value: &str, default: usize) -> usize {
    value.parse::<usize>().unwrap_or(default).max(1)
}

fn url_var<F>(lookup: &F, key: &str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = lookup(key).unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must start with http:// or https://",
            key
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}
