//! Pizza Hut: throttle-aware fan-out adapter
//!
//! Huts are listed once, grouped by sector, and every hut's pizza list is an
//! independent request. Sectors run side by side; inside a sector at most
//! `max_workers / sectors` requests are in flight. A 429/403 makes only the
//! throttled request wait out the cooldown (`RetryPolicy::throttle_floor`)
//! before it retries. The rest of the fan-out keeps going.

use super::adapter::{absorb, AdapterError, AdapterRun, RawObservation, SourceAdapter};
use super::config::PizzaHutConfig;
use super::http_client::HttpClient;
use super::json_util::{number, number_field, str_field, tidy};
use super::normalizer::{CanonicalSize, Vocabulary};
use async_trait::async_trait;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const CHAIN_KEY: &str = "PH";

const VARIANT_KEYS: [&str; 6] = [
    "priceVariants",
    "sizePrices",
    "variants",
    "variantPrices",
    "sizes",
    "items",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Hut {
    pub id: String,
    pub sector: String,
    pub city: String,
    pub province: String,
}

pub struct PizzaHutAdapter {
    http: HttpClient,
    config: PizzaHutConfig,
}

impl PizzaHutAdapter {
    pub fn new(config: PizzaHutConfig, timeout: Duration) -> Result<Self, AdapterError> {
        let http = HttpClient::new(
            timeout,
            config.retry.clone(),
            &[("Accept-Language", "en-CA,en;q=0.9".to_string())],
        )?;
        Ok(Self { http, config })
    }

    async fn huts(&self) -> Result<Vec<Hut>, AdapterError> {
        let url = format!("{}/v1/huts/", self.config.base_url);
        let body = self
            .http
            .get_json(
                &url,
                &[
                    ("sector", self.config.sectors.join(",")),
                    ("featureRole", "none".to_string()),
                ],
            )
            .await?;

        let huts = parse_huts(&body)?;
        if huts.is_empty() {
            return Err(AdapterError::SchemaChanged(format!("{} returned no huts", url)));
        }
        Ok(huts)
    }

    async fn scrape_hut(&self, hut: &Hut) -> Result<AdapterRun, AdapterError> {
        let url = format!("{}/v2/products/pizzas", self.config.base_url);
        let mut query = vec![("hutid", hut.id.clone()), ("collection", "true".to_string())];
        if !hut.sector.is_empty() {
            query.push(("sector", hut.sector.clone()));
        }
        let body = self.http.get_json(&url, &query).await?;
        parse_pizzas(&body, hut)
    }

    async fn scrape_sector(&self, sector: &str, huts: Vec<Hut>, workers: usize) -> Result<AdapterRun, AdapterError> {
        log::info!("📡 [{}] sector {}: {} huts", CHAIN_KEY, sector, huts.len());

        let mut run = AdapterRun::default();
        let mut results = stream::iter(huts)
            .map(|hut| async move {
                let result = self.scrape_hut(&hut).await;
                (hut, result)
            })
            .buffer_unordered(workers);

        while let Some((hut, result)) = results.next().await {
            match absorb(CHAIN_KEY, &format!("hut {}", hut.id), result)? {
                Some(hut_run) => run.merge(hut_run),
                None => run.dropped += 1,
            }
        }
        Ok(run)
    }
}

#[async_trait]
impl SourceAdapter for PizzaHutAdapter {
    fn chain_key(&self) -> &'static str {
        CHAIN_KEY
    }

    fn vocabulary(&self) -> Vocabulary {
        inch_vocabulary()
    }

    async fn collect(&self) -> Result<AdapterRun, AdapterError> {
        let huts = self.huts().await?;
        log::info!("🍕 [{}] {} huts to scrape", CHAIN_KEY, huts.len());

        let mut by_sector: BTreeMap<String, Vec<Hut>> = BTreeMap::new();
        for hut in huts {
            by_sector.entry(hut.sector.clone()).or_default().push(hut);
        }
        let workers = (self.config.max_workers / by_sector.len().max(1)).max(1);

        // try_join_all drops the remaining sectors on the first systemic error.
        let runs = try_join_all(
            by_sector
                .into_iter()
                .map(|(sector, huts)| async move { self.scrape_sector(&sector, huts, workers).await }),
        )
        .await?;

        let mut run = AdapterRun::default();
        for sector_run in runs {
            run.merge(sector_run);
        }
        Ok(run)
    }
}

pub fn parse_huts(body: &Value) -> Result<Vec<Hut>, AdapterError> {
    let items = match body {
        Value::Array(items) => items,
        other => other
            .get("huts")
            .and_then(Value::as_array)
            .ok_or_else(|| AdapterError::SchemaChanged("hut list is not an array".to_string()))?,
    };

    Ok(items
        .iter()
        .filter_map(|hut| {
            let id = str_field(hut, &["id"])?;
            let address = hut.get("address").cloned().unwrap_or(Value::Null);
            let city = str_field(&address, &["city"]).or_else(|| {
                // City is sometimes only present as the second-to-last address line
                address
                    .get("lines")
                    .and_then(Value::as_array)
                    .filter(|lines| lines.len() >= 2)
                    .and_then(|lines| lines[lines.len() - 2].as_str())
                    .map(tidy)
            });
            Some(Hut {
                id,
                sector: str_field(hut, &["sector"]).unwrap_or_default(),
                city: city.unwrap_or_default(),
                province: str_field(&address, &["region", "province", "state"]).unwrap_or_default(),
            })
        })
        .collect())
}

/// Pizza Hut Canada sells personal, small, medium and large rounds.
fn inch_vocabulary() -> Vocabulary {
    Vocabulary::new(&[
        (6, CanonicalSize::Personal),
        (9, CanonicalSize::Small),
        (12, CanonicalSize::Medium),
        (14, CanonicalSize::Large),
    ])
}

/// Every priced pizza variant in one hut's product response.
pub fn parse_pizzas(body: &Value, hut: &Hut) -> Result<AdapterRun, AdapterError> {
    let products = body
        .get("data")
        .and_then(|d| d.get("products"))
        .or_else(|| body.get("products"))
        .unwrap_or(body);
    let products = products
        .as_array()
        .ok_or_else(|| AdapterError::Parse(format!("hut {}: products is not an array", hut.id)))?;

    let mut run = AdapterRun::default();
    for product in products {
        let recipe = str_field(product, &["name", "displayName", "kind", "slug"]).unwrap_or_default();
        if recipe.is_empty() {
            run.dropped += 1;
            continue;
        }

        let variants: Vec<&Value> = VARIANT_KEYS
            .iter()
            .find_map(|key| product.get(*key).and_then(Value::as_array).filter(|v| !v.is_empty()))
            .map(|v| v.iter().collect())
            .unwrap_or_else(|| vec![product]);

        for variant in variants {
            let keyish = str_field(variant, &["key", "label", "id"]).unwrap_or_default();
            let size_label = str_field(variant, &["size", "sizeKey", "sizeSlug", "sizeName"])
                .unwrap_or_else(|| keyish.clone());
            let crust_label = str_field(variant, &["crust", "dough", "style"])
                .or_else(|| crust_from_key(&keyish))
                .unwrap_or_else(|| "Regular Dough".to_string());

            let Some(price) = variant_price(variant).or_else(|| variant_price_fallback(product)) else {
                log::warn!("⚠️  [{}] hut {} '{}' has no price", CHAIN_KEY, hut.id, recipe);
                run.dropped += 1;
                continue;
            };

            run.observations.push(RawObservation {
                chain_key: CHAIN_KEY.to_string(),
                store_key: format!("{}_{}", CHAIN_KEY, hut.id),
                city: hut.city.clone(),
                province: hut.province.clone(),
                category: "Pizza".to_string(),
                recipe: recipe.clone(),
                size_label,
                crust_label,
                price,
            });
        }
    }
    Ok(run)
}

/// `price` as a number, `{amount|value|price}`, `{cents}`, or sibling fields.
fn variant_price(variant: &Value) -> Option<f64> {
    match variant.get("price") {
        Some(Value::Number(n)) => return n.as_f64(),
        Some(nested) if nested.is_object() => {
            if let Some(price) = number_field(nested, &["amount", "value", "price"]) {
                return Some(price);
            }
            if let Some(cents) = nested.get("cents").and_then(number) {
                return Some(cents / 100.0);
            }
        }
        _ => {}
    }
    number_field(variant, &["unitPrice", "value", "amount"])
        .or_else(|| variant.get("priceCents").and_then(number).map(|c| c / 100.0))
}

fn variant_price_fallback(product: &Value) -> Option<f64> {
    match product.get("price") {
        Some(Value::Number(n)) => n.as_f64(),
        _ => product.get("priceCents").and_then(Value::as_i64).map(|c| c as f64 / 100.0),
    }
}

/// `12 Medium 1P2.Crusts.Handcrafted` → `Handcrafted`
fn crust_from_key(key: &str) -> Option<String> {
    let (_, crust) = key.split_once("Crusts.")?;
    let crust = tidy(&crust.replace(['-', '.'], " "));
    (!crust.is_empty()).then_some(crust)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper_core::Normalizer;
    use serde_json::json;

    fn hut() -> Hut {
        Hut {
            id: "3021".into(),
            sector: "ca-1".into(),
            city: "Halifax".into(),
            province: "NS".into(),
        }
    }

    #[test]
    fn test_parse_huts() {
        let body = json!([
            {"id": "3021", "sector": "ca-1", "address": {"city": "Halifax", "region": "NS"}},
            {"id": "4100", "sector": "ca-2", "address": {"lines": ["1 Main St", "Calgary", "AB"], "province": "AB"}},
            {"sector": "ca-2"}
        ]);
        let huts = parse_huts(&body).unwrap();
        assert_eq!(huts.len(), 2);
        assert_eq!(huts[1].city, "Calgary");
        assert_eq!(huts[1].province, "AB");

        assert!(parse_huts(&json!({"error": "gone"})).is_err());
    }

    #[test]
    fn test_parse_pizzas_variant_shapes() {
        let body = json!({"data": {"products": [
            {"name": "Super Supreme 2X", "priceVariants": [
                {"size": "medium", "crust": "Pan", "price": 17.99},
                {"size": "large", "crust": "thin", "price": {"amount": 21.49}},
                {"key": "12 Medium 1P2.Crusts.Handcrafted", "priceCents": 1899}
            ]},
            {"name": "Cheese", "sizes": [{"sizeName": "Personal", "price": {"cents": 899}}]},
            {"name": "Mystery", "variants": [{"size": "large"}]}
        ]}});

        let run = parse_pizzas(&body, &hut()).unwrap();
        assert_eq!(run.observations.len(), 4);
        assert_eq!(run.dropped, 1);

        let keyed = &run.observations[2];
        assert_eq!(keyed.size_label, "12 Medium 1P2.Crusts.Handcrafted");
        assert_eq!(keyed.crust_label, "Handcrafted");
        assert_eq!(keyed.price, 18.99);
        assert_eq!(keyed.store_key, "PH_3021");

        let personal = &run.observations[3];
        assert_eq!(personal.crust_label, "Regular Dough");
        assert_eq!(personal.price, 8.99);
        assert_eq!(run.observations[1].price, 21.49);
    }

    #[test]
    fn test_numeric_sizes_map_through_inches() {
        let body = json!({"products": [
            {"name": "Pepperoni Lover's", "variants": [
                {"size": 12, "crust": "Pan", "price": 16.99},
                {"size": 14, "crust": "Pan", "price": 19.99},
                {"size": 20, "crust": "Pan", "price": 29.99}
            ]}
        ]});
        let run = parse_pizzas(&body, &hut()).unwrap();
        assert_eq!(run.observations[0].size_label, "12");

        let normalizer = Normalizer::new(CHAIN_KEY, inch_vocabulary());
        let sizes: Vec<_> = run
            .observations
            .iter()
            .map(|o| normalizer.normalize_size(&o.size_label).ok())
            .collect();
        assert_eq!(sizes, vec![Some(CanonicalSize::Medium), Some(CanonicalSize::Large), None]);
    }

    #[test]
    fn test_parse_pizzas_rejects_non_list() {
        assert!(matches!(
            parse_pizzas(&json!({"products": "none"}), &hut()),
            Err(AdapterError::Parse(_))
        ));
    }
}
