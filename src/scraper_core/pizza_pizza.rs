//! Pizza Pizza: configurator-expanding adapter
//!
//! Per store: store details, the Pizza category subtree, the product lists
//! (delivery and pickup), then one configurator document per product. The
//! configurator is expanded into every size × crust combination, priced as
//! the size's base price plus the crust upcharge, whether or not the
//! combination is sold as a standalone menu item.
//!
//! The compressed `js_data` payload, when it decodes, is the authoritative
//! price source; the plain option groups are the fallback.

use super::adapter::{absorb, AdapterError, AdapterRun, RawObservation, SourceAdapter};
use super::config::PizzaPizzaConfig;
use super::http_client::{HttpClient, HttpError};
use super::json_util::{number, round2, str_field, tidy, walk_objects};
use super::normalizer::Vocabulary;
use async_trait::async_trait;
use base64::prelude::*;
use flate2::read::ZlibDecoder;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::time::Duration;

pub const CHAIN_KEY: &str = "PP";

/// Root of the "Pizza" category tree
pub const PIZZA_ROOT_CATEGORY: i64 = 10020;

/// Size option prices at or above this are absolute, below it deltas.
const ABSOLUTE_PRICE_FLOOR: f64 = 6.0;

const SIZE_GROUPS: [&str; 6] = [
    "size",
    "pizza size",
    "select size",
    "choose size",
    "sizes",
    "size selection",
];
const CRUST_GROUPS: [&str; 5] = ["dough", "crust", "pizza dough", "choose dough", "choose crust"];
const PRICE_FIELD_HINTS: [&str; 6] = ["price", "amount", "delta", "difference", "value", "final"];

#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredVariant {
    pub size_label: String,
    pub crust_label: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PizzaProduct {
    pub product_id: String,
    pub slug: String,
    pub name: String,
    pub starting_price: Option<f64>,
    pub categories: BTreeSet<String>,
}

pub struct PizzaPizzaAdapter {
    http: HttpClient,
    config: PizzaPizzaConfig,
}

impl PizzaPizzaAdapter {
    pub fn new(config: PizzaPizzaConfig, timeout: Duration) -> Result<Self, AdapterError> {
        let mut headers = vec![
            ("Lang", "en".to_string()),
            ("App-Web-Version", "1419".to_string()),
        ];
        if let Some(token) = &config.session_token {
            headers.push(("Session-Token", token.clone()));
            headers.push(("Cookie", format!("pp-mw-session={}", token)));
        }
        let http = HttpClient::new(timeout, config.retry.clone(), &headers)?;
        Ok(Self { http, config })
    }

    async fn scrape_store(&self, store_id: u32) -> Result<AdapterRun, AdapterError> {
        let base = &self.config.base_url;
        let details = self
            .http
            .get_json(
                &format!("{}/store/api/v1/store_details/", base),
                &[("store_id", store_id.to_string())],
            )
            .await;
        let details = match details {
            Ok(details) => details,
            // Most ids in the probed range are not stores
            Err(HttpError::NotFound { .. }) => {
                log::debug!("[{}] store {} does not exist", CHAIN_KEY, store_id);
                return Ok(AdapterRun::default());
            }
            Err(e) => return Err(e.into()),
        };
        let city = str_field(&details, &["city"]).unwrap_or_default();
        let province = str_field(&details, &["province"]).unwrap_or_default();
        if city.is_empty() && province.is_empty() {
            log::debug!("[{}] store {} has no details, skipping", CHAIN_KEY, store_id);
            return Ok(AdapterRun::default());
        }

        let products = self.pizza_products(store_id).await?;
        let store_key = format!("{}_{}", CHAIN_KEY, store_id);

        let mut run = AdapterRun::default();
        for product in products {
            let configurator = if product.slug.is_empty() {
                Value::Null
            } else {
                let fetched = self
                    .http
                    .get_json(
                        &format!("{}/catalog/api/v1/product/config/{}", base, store_id),
                        &[("product_slug", product.slug.clone())],
                    )
                    .await;
                absorb(CHAIN_KEY, &format!("configurator {}", product.slug), fetched)?.unwrap_or(Value::Null)
            };

            let fallback_crust = infer_crust_from_context(&product.name, &product.categories);
            let variants = expand_configurator(&configurator, product.starting_price, fallback_crust);
            if variants.is_empty() {
                log::warn!("⚠️  [{}] {} '{}' has no priced variants", CHAIN_KEY, store_key, product.name);
                run.dropped += 1;
                continue;
            }

            for variant in variants {
                run.observations.push(RawObservation {
                    chain_key: CHAIN_KEY.to_string(),
                    store_key: store_key.clone(),
                    city: city.clone(),
                    province: province.clone(),
                    category: "Pizza".to_string(),
                    recipe: product.name.clone(),
                    size_label: variant.size_label,
                    crust_label: variant.crust_label,
                    price: variant.price,
                });
            }
        }
        Ok(run)
    }

    /// Unique pizza products of one store, keyed by product id.
    async fn pizza_products(&self, store_id: u32) -> Result<Vec<PizzaProduct>, AdapterError> {
        let base = &self.config.base_url;
        let categories = self
            .http
            .get_json(&format!("{}/catalog/api/v1/category_list/{}", base, store_id), &[])
            .await?;
        let categories = list_items(&categories, &["categories", "items"]);
        let (pizza_ids, names) = pizza_category_ids(&categories);

        let mut index: BTreeMap<String, PizzaProduct> = BTreeMap::new();
        for category_id in pizza_ids {
            let category_name = names.get(&category_id).cloned().unwrap_or_default();
            for mode in ["delivery", "pickup"] {
                let listed = self
                    .http
                    .get_json(
                        &format!("{}/catalog/api/v1/product_list/{}/{}", base, store_id, mode),
                        &[("category_id", category_id.to_string())],
                    )
                    .await;
                let what = format!("product list {} ({})", category_id, mode);
                let Some(listed) = absorb(CHAIN_KEY, &what, listed)? else {
                    continue;
                };

                for item in list_items(&listed, &["products", "items"]) {
                    let Some(product_id) = str_field(&item, &["product_id"]) else {
                        continue;
                    };
                    let entry = index.entry(product_id.clone()).or_insert_with(|| PizzaProduct {
                        product_id,
                        slug: str_field(&item, &["seo_title"]).unwrap_or_default(),
                        name: str_field(&item, &["name"]).unwrap_or_default(),
                        starting_price: starting_price(&item),
                        categories: BTreeSet::new(),
                    });
                    if !category_name.is_empty() {
                        entry.categories.insert(category_name.clone());
                    }
                }
            }
        }
        Ok(index.into_values().collect())
    }
}

#[async_trait]
impl SourceAdapter for PizzaPizzaAdapter {
    fn chain_key(&self) -> &'static str {
        CHAIN_KEY
    }

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::default()
    }

    async fn collect(&self) -> Result<AdapterRun, AdapterError> {
        log::info!(
            "🍕 [{}] probing {} store ids",
            CHAIN_KEY,
            self.config.store_ids.len()
        );

        let mut run = AdapterRun::default();
        let mut results = stream::iter(self.config.store_ids.iter().copied())
            .map(|id| async move { (id, self.scrape_store(id).await) })
            .buffer_unordered(self.config.max_workers);

        while let Some((id, result)) = results.next().await {
            match absorb(CHAIN_KEY, &format!("store {}", id), result)? {
                Some(store_run) => run.merge(store_run),
                None => run.dropped += 1,
            }
        }
        Ok(run)
    }
}

fn list_items(body: &Value, keys: &[&str]) -> Vec<Value> {
    let list = match body {
        Value::Array(_) => Some(body),
        _ => keys.iter().find_map(|key| body.get(*key).filter(|v| v.is_array())),
    };
    list.and_then(Value::as_array).cloned().unwrap_or_default()
}

/// Category ids in the Pizza subtree that actually list products.
pub fn pizza_category_ids(categories: &[Value]) -> (Vec<i64>, HashMap<i64, String>) {
    let mut parents: HashMap<i64, i64> = HashMap::new();
    let mut names: HashMap<i64, String> = HashMap::new();
    for category in categories {
        if let Some(id) = category.get("id").and_then(Value::as_i64) {
            parents.insert(id, category.get("parent_id").and_then(Value::as_i64).unwrap_or(0));
            names.insert(id, str_field(category, &["name"]).unwrap_or_default());
        }
    }

    let descends_from_root = |mut id: i64| {
        let mut seen = BTreeSet::new();
        while id != 0 && seen.insert(id) {
            let parent = parents.get(&id).copied().unwrap_or(0);
            if parent == PIZZA_ROOT_CATEGORY {
                return true;
            }
            id = parent;
        }
        false
    };

    let available = |category: &Value| {
        category
            .get("products_available")
            .map(|v| v.as_bool().unwrap_or_else(|| number(v).unwrap_or(0.0) > 0.0))
            .unwrap_or(false)
    };

    let ids: BTreeSet<i64> = categories
        .iter()
        .filter(|category| available(*category))
        .filter_map(|category| category.get("id").and_then(Value::as_i64))
        .filter(|id| *id == PIZZA_ROOT_CATEGORY || descends_from_root(*id))
        .collect();

    (ids.into_iter().collect(), names)
}

/// Crust implied by the product name or its categories ("Gourmet Thin", "Stuffed Crust Pizzas").
pub fn infer_crust_from_context(recipe: &str, categories: &BTreeSet<String>) -> Option<&'static str> {
    let context = std::iter::once(recipe)
        .chain(categories.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if context.contains("stuffed") {
        Some("Stuffed Crust")
    } else if context.contains("gourmet thin") || (context.contains("thin") && context.contains("crust")) {
        Some("Thin")
    } else if context.contains("brooklyn") {
        Some("Brooklyn")
    } else if context.contains("new york") || context.contains("new-york") {
        Some("New York Style")
    } else if context.contains("cauliflower") {
        Some("Cauliflower")
    } else if context.contains("gluten free") || context.contains("gluten-free") {
        Some("Gluten Free")
    } else if context.contains("hand tossed") || context.contains("hand-tossed") {
        Some("Hand Tossed")
    } else {
        None
    }
}

pub fn starting_price(product: &Value) -> Option<f64> {
    product
        .get("price_text")
        .and_then(|text| text.get("price_value"))
        .and_then(number)
        .or_else(|| product.get("price").and_then(number))
}

/// Expand a configurator document into priced (size, crust) combinations.
///
/// Resolution order: the compressed `js_data` payload, an explicit price
/// matrix embedded in the document, then the size and crust option groups,
/// then the starting price at a single size.
pub fn expand_configurator(
    config: &Value,
    starting_price: Option<f64>,
    fallback_crust: Option<&str>,
) -> Vec<ConfiguredVariant> {
    let fallback_crust = fallback_crust.unwrap_or("Regular Dough");

    let from_js_data = js_data_variants(config);
    if !from_js_data.is_empty() {
        return from_js_data;
    }

    let matrix = price_matrix(config);
    if !matrix.is_empty() {
        return matrix;
    }

    let size_options = find_group(config, &SIZE_GROUPS).map(options).unwrap_or_default();
    let crust_options = find_group(config, &CRUST_GROUPS).map(options).unwrap_or_default();

    let priced_sizes: Vec<(String, f64)> = size_options
        .iter()
        .filter_map(|opt| {
            let first = price_fields(opt).first().copied()?;
            Some((option_label(opt), first))
        })
        .collect();

    let mut size_prices: Vec<(String, f64)> = if priced_sizes.is_empty() {
        Vec::new()
    } else if priced_sizes.iter().any(|(_, p)| *p >= ABSOLUTE_PRICE_FLOOR) {
        priced_sizes
    } else {
        let base = starting_price.unwrap_or(0.0);
        priced_sizes.into_iter().map(|(label, delta)| (label, base + delta)).collect()
    };
    if size_prices.is_empty() && !size_options.is_empty() {
        if let Some(start) = starting_price {
            size_prices = size_options.iter().map(|opt| (option_label(opt), start)).collect();
        }
    }

    let crust_upcharges: Vec<(String, f64)> = crust_options
        .iter()
        .map(|opt| (option_label(opt), crust_upcharge(opt)))
        .collect();

    let mut combos: Vec<(String, String, f64)> = Vec::new();
    for (size, base) in &size_prices {
        if crust_upcharges.is_empty() {
            combos.push((size.clone(), fallback_crust.to_string(), *base));
        } else {
            for (crust, upcharge) in &crust_upcharges {
                combos.push((size.clone(), crust.clone(), base + upcharge));
            }
        }
    }
    if combos.is_empty() {
        if let Some(start) = starting_price {
            let size = size_options
                .first()
                .map(|opt| option_label(opt))
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| "Small".to_string());
            combos.push((size, fallback_crust.to_string(), start));
        }
    }

    let mut seen = BTreeSet::new();
    combos
        .into_iter()
        .filter(|(size, crust, _)| !size.is_empty() && seen.insert((size.clone(), crust.clone())))
        .map(|(size, crust, price)| ConfiguredVariant {
            size_label: size,
            crust_label: if crust.is_empty() { fallback_crust.to_string() } else { crust },
            price: round2(f64::max(0.0, price)),
        })
        .collect()
}

/// `js_data` is base64 over a zlib stream of JSON. Anything undecodable is `None`.
pub fn decode_js_data(encoded: &str) -> Option<Value> {
    let compressed = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let mut json = String::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_string(&mut json).ok()?;
    serde_json::from_str(&json).ok()
}

/// Every dough option priced at every size it is offered in.
///
/// `js_data.products[0].product_options` holds the per-size base prices;
/// its `configuration_options` with `subconfiguration_id == "dough"` hold
/// per-size deltas. Dough titles come from the plain configurator document,
/// keyed by option id.
fn js_data_variants(config: &Value) -> Vec<ConfiguredVariant> {
    let Some(decoded) = config.get("js_data").and_then(Value::as_str).and_then(decode_js_data) else {
        return Vec::new();
    };
    let Some(product) = decoded.get("products").and_then(|p| p.get(0)) else {
        return Vec::new();
    };

    let titles: HashMap<String, String> = config
        .get("data")
        .and_then(|d| d.get("products"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("configuration_options"))
        .and_then(Value::as_array)
        .map(|opts| {
            opts.iter()
                .filter_map(|opt| {
                    let title = str_field(opt, &["title", "name", "label"])?;
                    Some((str_field(opt, &["id"])?, title))
                })
                .collect()
        })
        .unwrap_or_default();

    let mut sizes: BTreeMap<i64, (String, f64)> = BTreeMap::new();
    if let Some(options) = product.get("product_options").and_then(Value::as_object) {
        for (size_id, size) in options {
            let Ok(size_id) = size_id.trim().parse::<i64>() else {
                continue;
            };
            let label = size
                .get("size_name")
                .and_then(|name| str_field(name, &["en"]))
                .or_else(|| str_field(size, &["size"]))
                .unwrap_or_default();
            let Some(base) = size.get("base_price").and_then(number) else {
                continue;
            };
            sizes.insert(size_id, (label, base));
        }
    }

    let mut variants = Vec::new();
    let Some(doughs) = product.get("configuration_options").and_then(Value::as_object) else {
        return variants;
    };
    for (option_id, option) in doughs {
        let is_dough = str_field(option, &["subconfiguration_id"])
            .map(|sub| sub.eq_ignore_ascii_case("dough"))
            .unwrap_or(false);
        if !is_dough {
            continue;
        }
        let crust = titles.get(option_id).cloned().unwrap_or_else(|| option_id.clone());
        let Some(per_size) = option.get("product_options") else {
            continue;
        };
        for (size_id, (size, base)) in sizes.iter().filter(|(_, (size, _))| !size.is_empty()) {
            let Some(entry) = per_size.get(size_id.to_string()) else {
                continue;
            };
            let delta = entry.get("price").and_then(number).unwrap_or(0.0);
            variants.push(ConfiguredVariant {
                size_label: size.clone(),
                crust_label: crust.clone(),
                price: round2(f64::max(0.0, base + delta)),
            });
        }
    }
    variants
}

/// Crust upcharge: the smallest-magnitude price field; absolute prices count as zero.
fn crust_upcharge(option: &Map<String, Value>) -> f64 {
    let fields = price_fields(option);
    let smallest = fields
        .iter()
        .copied()
        .min_by(|a, b| a.abs().total_cmp(&b.abs()))
        .unwrap_or(0.0);
    if smallest >= ABSOLUTE_PRICE_FLOOR {
        0.0
    } else {
        smallest
    }
}

/// Objects that carry a price next to a size (and optionally crust) label.
fn price_matrix(config: &Value) -> Vec<ConfiguredVariant> {
    let mut objects = Vec::new();
    walk_objects(config, &mut objects);

    let mut cells: Vec<ConfiguredVariant> = Vec::new();
    for object in objects {
        let price = ["price", "price_value", "amount", "final_price"]
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(number);
        let Some(price) = price else {
            continue;
        };

        let mut size = None;
        let mut crust = None;
        for (key, value) in object {
            let key = key.to_lowercase();
            if let Value::String(text) = value {
                if key.contains("size") {
                    size = Some(tidy(text));
                }
                if key.contains("crust") || key.contains("dough") {
                    crust = Some(tidy(text));
                }
            }
        }
        let Some(size) = size.filter(|s| !s.is_empty()) else {
            continue;
        };
        let crust = crust.filter(|c| !c.is_empty()).unwrap_or_else(|| "Regular Dough".to_string());

        match cells.iter_mut().find(|c| c.size_label == size && c.crust_label == crust) {
            Some(cell) => cell.price = round2(price),
            None => cells.push(ConfiguredVariant {
                size_label: size,
                crust_label: crust,
                price: round2(price),
            }),
        }
    }
    cells
}

fn find_group<'a>(config: &'a Value, names: &[&str]) -> Option<&'a Map<String, Value>> {
    let mut objects = Vec::new();
    walk_objects(config, &mut objects);

    let groups: Vec<(&Map<String, Value>, String)> = objects
        .into_iter()
        .filter(|object| object.get("options").map(Value::is_array).unwrap_or(false))
        .filter_map(|object| {
            let name = ["name", "title", "label"]
                .iter()
                .find_map(|key| object.get(*key).and_then(Value::as_str))
                .map(|name| tidy(name).to_lowercase())
                .filter(|name| !name.is_empty())?;
            Some((object, name))
        })
        .collect();

    groups
        .iter()
        .find(|(_, name)| names.contains(&name.as_str()))
        .or_else(|| groups.iter().find(|(_, name)| names.iter().any(|n| name.contains(n))))
        .map(|(group, _)| *group)
}

fn options(group: &Map<String, Value>) -> Vec<&Map<String, Value>> {
    group
        .get("options")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn option_label(option: &Map<String, Value>) -> String {
    ["name", "label", "title", "display_name"]
        .iter()
        .find_map(|key| option.get(*key).and_then(Value::as_str))
        .map(tidy)
        .unwrap_or_default()
}

fn price_fields(option: &Map<String, Value>) -> Vec<f64> {
    option
        .iter()
        .filter(|(key, _)| {
            let key = key.to_lowercase();
            PRICE_FIELD_HINTS.iter().any(|hint| key.contains(hint))
        })
        .filter_map(|(_, value)| number(value))
        .collect()
}
