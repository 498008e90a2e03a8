//! Domino's: store-level adapter
//!
//! Store ids are scraped from the public store-list page, then each store is
//! one unit of work: profile (city/province) plus the structured menu.
//! Stores are processed with at most `max_workers` in flight.

use super::adapter::{absorb, AdapterError, AdapterRun, RawObservation, SourceAdapter};
use super::config::DominosConfig;
use super::http_client::HttpClient;
use super::json_util::{number_field, str_field, tidy};
use super::normalizer::{CanonicalSize, Vocabulary};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

pub const CHAIN_KEY: &str = "DP";

const CRUST_PATTERNS: [&str; 7] = [
    "Parmesan Stuffed Crust",
    "Crunchy Thin Crust",
    "New-York Style",
    "Hand Tossed",
    "Brooklyn",
    "Gluten Free",
    "Pan Pizza",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreProfile {
    pub city: String,
    pub province: String,
}

pub struct DominosAdapter {
    http: HttpClient,
    config: DominosConfig,
}

impl DominosAdapter {
    pub fn new(config: DominosConfig, timeout: Duration) -> Result<Self, AdapterError> {
        let http = HttpClient::new(timeout, config.retry.clone(), &[])?;
        Ok(Self { http, config })
    }

    async fn store_ids(&self) -> Result<Vec<u32>, AdapterError> {
        let html = self.http.get_text(&self.config.stores_url).await?;
        let ids = parse_store_ids(&html);
        if ids.is_empty() {
            return Err(AdapterError::SchemaChanged(format!(
                "no store ids found on {}",
                self.config.stores_url
            )));
        }
        Ok(ids)
    }

    async fn scrape_store(&self, store_id: u32) -> Result<AdapterRun, AdapterError> {
        let base = &self.config.base_url;
        let profile = self
            .http
            .get_json(&format!("{}/store/{}/profile", base, store_id), &[])
            .await?;
        let menu = self
            .http
            .get_json(
                &format!("{}/store/{}/menu", base, store_id),
                &[("lang", "en".to_string()), ("structured", "true".to_string())],
            )
            .await?;

        let profile = parse_profile(&profile);
        Ok(parse_menu(&menu, &format!("{}_{}", CHAIN_KEY, store_id), &profile))
    }
}

#[async_trait]
impl SourceAdapter for DominosAdapter {
    fn chain_key(&self) -> &'static str {
        CHAIN_KEY
    }

    fn vocabulary(&self) -> Vocabulary {
        inch_vocabulary()
    }

    async fn collect(&self) -> Result<AdapterRun, AdapterError> {
        let ids = self.store_ids().await?;
        log::info!("🍕 [{}] {} stores to scrape", CHAIN_KEY, ids.len());

        let mut run = AdapterRun::default();
        let mut results = stream::iter(ids)
            .map(|id| async move { (id, self.scrape_store(id).await) })
            .buffer_unordered(self.config.max_workers);

        // Returning early drops `results`, cancelling the in-flight stores.
        while let Some((id, result)) = results.next().await {
            match absorb(CHAIN_KEY, &format!("store {}", id), result)? {
                Some(store_run) => run.merge(store_run),
                None => run.dropped += 1,
            }
        }

        Ok(run)
    }
}

fn inch_vocabulary() -> Vocabulary {
    Vocabulary::new(&[
        (10, CanonicalSize::Small),
        (12, CanonicalSize::Medium),
        (14, CanonicalSize::Large),
        (16, CanonicalSize::XLarge),
    ])
}

/// Store ids appear on the store-list page as `(#1234)`.
pub fn parse_store_ids(html: &str) -> Vec<u32> {
    static STORE_ID: OnceLock<Regex> = OnceLock::new();
    let re = STORE_ID.get_or_init(|| Regex::new(r"\(#(\d{4,5})\)").expect("static regex"));

    re.captures_iter(html)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

pub fn parse_profile(profile: &Value) -> StoreProfile {
    let city = str_field(profile, &["City", "city"]).unwrap_or_default();
    let province = str_field(profile, &["Region", "Province", "State"])
        .or_else(|| {
            profile
                .get("Address")
                .and_then(|a| str_field(a, &["Region", "Province", "State"]))
        })
        .unwrap_or_default();
    StoreProfile { city, province }
}

/// Pizza variants of one store's structured menu.
///
/// Variants whose price is missing are counted as dropped.
pub fn parse_menu(menu: &Value, store_key: &str, profile: &StoreProfile) -> AdapterRun {
    let mut run = AdapterRun::default();
    let products = menu.get("Products");

    for variant in entries(menu.get("Variants")) {
        let Some(product_code) = str_field(variant, &["ProductCode"]) else {
            continue;
        };
        let Some(product) = products.and_then(|p| p.get(&product_code)) else {
            continue;
        };
        let product_type = str_field(product, &["ProductType"]).unwrap_or_default();
        if !product_type.eq_ignore_ascii_case("pizza") {
            continue;
        }

        let variant_name = str_field(variant, &["Name", "VariantName"]).unwrap_or_default();
        let recipe = str_field(product, &["Name", "ProductName"]).unwrap_or_default();

        let size_label = derive_size(menu, variant, product, &product_type, &variant_name);

        let crust_label = str_field(variant, &["FlavorCode"])
            .and_then(|code| lookup_name(menu, "Flavors", &product_type, &code))
            .or_else(|| crust_from_name(&variant_name))
            .or_else(|| crust_from_name(&recipe))
            .unwrap_or_default();

        let Some(price) = number_field(variant, &["Price"]) else {
            log::warn!("⚠️  [{}] {} '{}' has no price", CHAIN_KEY, store_key, variant_name);
            run.dropped += 1;
            continue;
        };

        run.observations.push(RawObservation {
            chain_key: CHAIN_KEY.to_string(),
            store_key: store_key.to_string(),
            city: profile.city.clone(),
            province: profile.province.clone(),
            category: "Pizza".to_string(),
            recipe,
            size_label,
            crust_label,
            price,
        });
    }

    run
}

fn entries(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Object(map)) => map.values().collect(),
        Some(Value::Array(items)) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// Size label of a pizza variant, most specific source first:
/// the `SizeCode` lookup, the variant's own `Size`/`SizeName`, the product's,
/// a size named in the variant name, then the inches leading the variant
/// code (`14SCREEN` → `14"`). The bare variant name is the last resort.
fn derive_size(
    menu: &Value,
    variant: &Value,
    product: &Value,
    product_type: &str,
    variant_name: &str,
) -> String {
    str_field(variant, &["SizeCode"])
        .and_then(|code| lookup_name(menu, "Sizes", product_type, &code))
        .or_else(|| str_field(variant, &["Size", "SizeName"]))
        .or_else(|| str_field(product, &["Size", "SizeName"]))
        .or_else(|| names_size(variant_name).then(|| variant_name.to_string()))
        .or_else(|| str_field(variant, &["Code"]).and_then(|code| size_from_code(&code)))
        .unwrap_or_else(|| variant_name.to_string())
}

fn names_size(name: &str) -> bool {
    static SIZE_WORD: OnceLock<Regex> = OnceLock::new();
    let re = SIZE_WORD.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:personal|small|medium|large|x-?large|extra large|party)\b|\d{1,2}\s*(?:"|in\b|inch)"#)
            .expect("static regex")
    });
    re.is_match(name)
}

/// `12SCREEN` → `12"`; only plausible pizza diameters count.
fn size_from_code(code: &str) -> Option<String> {
    static LEADING_INCHES: OnceLock<Regex> = OnceLock::new();
    let re = LEADING_INCHES.get_or_init(|| Regex::new(r"^(\d{1,2})[A-Z]").expect("static regex"));
    let inches: u8 = re.captures(code)?.get(1)?.as_str().parse().ok()?;
    (6..=20).contains(&inches).then(|| format!("{}\"", inches))
}

/// `menu[table][product_type][code].Name`
fn lookup_name(menu: &Value, table: &str, product_type: &str, code: &str) -> Option<String> {
    let by_type = menu.get(table)?;
    by_type
        .get(product_type)
        .or_else(|| by_type.get("Pizza"))?
        .get(code)
        .and_then(|entry| str_field(entry, &["Name"]))
}

fn crust_from_name(name: &str) -> Option<String> {
    let lower = tidy(name).to_lowercase();
    CRUST_PATTERNS
        .iter()
        .find(|pattern| lower.contains(&pattern.to_lowercase()))
        .map(|pattern| pattern.to_string())
}
