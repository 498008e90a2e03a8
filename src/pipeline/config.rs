//! Model-build configuration from environment variables

use crate::model_core::SentinelFilter;
use std::env;
use std::path::PathBuf;

/// Where the build reads raw records and writes the star tables.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Directory of raw `*.csv` batches
    pub raw_dir: PathBuf,

    /// Optional SQLite raw store, loaded as one extra batch when present
    pub raw_db: PathBuf,

    pub dim_dir: PathBuf,
    pub fact_dir: PathBuf,

    /// Product-key placeholder tokens; empty disables the filter
    pub sentinel_tokens: Vec<String>,
}

impl ModelConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `MENUFLOW_RAW_DIR` (default: data/raw)
    /// - `MENUFLOW_RAW_DB` (default: data/raw/menuflow.db)
    /// - `MENUFLOW_DIM_DIR` (default: data/clean/dimensions)
    /// - `MENUFLOW_FACT_DIR` (default: data/clean/fact)
    /// - `MENUFLOW_SENTINEL_TOKENS` (default: product)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));

        let sentinel_tokens = lookup("MENUFLOW_SENTINEL_TOKENS")
            .unwrap_or_else(|| "product".to_string())
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            raw_dir: path("MENUFLOW_RAW_DIR", "data/raw"),
            raw_db: path("MENUFLOW_RAW_DB", "data/raw/menuflow.db"),
            dim_dir: path("MENUFLOW_DIM_DIR", "data/clean/dimensions"),
            fact_dir: path("MENUFLOW_FACT_DIR", "data/clean/fact"),
            sentinel_tokens,
        }
    }

    pub fn sentinel_filter(&self) -> SentinelFilter {
        SentinelFilter::new(&self.sentinel_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ModelConfig::from_lookup(lookup_from(&[]));

        assert_eq!(config.raw_dir, PathBuf::from("data/raw"));
        assert_eq!(config.raw_db, PathBuf::from("data/raw/menuflow.db"));
        assert_eq!(config.dim_dir, PathBuf::from("data/clean/dimensions"));
        assert_eq!(config.fact_dir, PathBuf::from("data/clean/fact"));
        assert_eq!(config.sentinel_tokens, vec!["product"]);
        assert!(config.sentinel_filter().is_sentinel("PP_Product_MD_HT"));
    }

    #[test]
    fn test_empty_sentinel_list_disables_filter() {
        let config = ModelConfig::from_lookup(lookup_from(&[
            ("MENUFLOW_SENTINEL_TOKENS", ""),
            ("MENUFLOW_DIM_DIR", "/tmp/dims"),
        ]));

        assert!(config.sentinel_tokens.is_empty());
        assert!(!config.sentinel_filter().is_sentinel("PP_product_MD_HT"));
        assert_eq!(config.dim_dir, PathBuf::from("/tmp/dims"));
    }
}
