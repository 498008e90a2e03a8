//! Star-schema construction: DIMENSION_BUILD and FACT_BUILD
//!
//! Required keys are validated here, not during load. For every grain the
//! row with the greatest `(ingested_at, batch_seq, row_seq)` wins; the same
//! winning row supplies the descriptive attributes, so each dimension has
//! exactly one row per business key and the fact table one row per
//! (chain, store, product, date). Prices are never averaged.

use super::dimensions::{DimChain, DimDate, DimProduct, DimStore};
use super::fact::FactMenuPrice;
use super::reconciler::{CleanDataset, TypedRow};
use super::surrogate;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("none of {input} cleaned rows carries chain_key, store_key and product_key")]
    NoUsableRows { input: usize },
}

/// A cleaned row whose required keys are present.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow<'a> {
    pub chain_key: &'a str,
    pub store_key: &'a str,
    pub product_key: &'a str,
    pub row: &'a TypedRow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    pub dim_chain: Vec<DimChain>,
    pub dim_store: Vec<DimStore>,
    pub dim_product: Vec<DimProduct>,
    pub dim_date: Vec<DimDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub dim_chain: usize,
    pub dim_store: usize,
    pub dim_product: usize,
    pub dim_date: usize,
    pub fact_menu_price: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StarSchema {
    pub dimensions: Dimensions,
    pub fact_menu_price: Vec<FactMenuPrice>,
}

impl StarSchema {
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            dim_chain: self.dimensions.dim_chain.len(),
            dim_store: self.dimensions.dim_store.len(),
            dim_product: self.dimensions.dim_product.len(),
            dim_date: self.dimensions.dim_date.len(),
            fact_menu_price: self.fact_menu_price.len(),
        }
    }
}

pub struct ModelBuilder;

impl ModelBuilder {
    /// Rows with all required keys; the second value counts rows dropped as invalid.
    pub fn validate(clean: &CleanDataset) -> Result<(Vec<ValidRow<'_>>, usize), BuildError> {
        let mut valid = Vec::with_capacity(clean.rows.len());
        let mut invalid = 0;
        for row in &clean.rows {
            match (present(&row.chain_key), present(&row.store_key), present(&row.product_key)) {
                (Some(chain_key), Some(store_key), Some(product_key)) => valid.push(ValidRow {
                    chain_key,
                    store_key,
                    product_key,
                    row,
                }),
                _ => {
                    log::warn!(
                        "⚠️  Dropping row {}:{} missing a required key",
                        row.batch_seq,
                        row.row_seq
                    );
                    invalid += 1;
                }
            }
        }

        if valid.is_empty() && !clean.rows.is_empty() {
            return Err(BuildError::NoUsableRows {
                input: clean.rows.len(),
            });
        }
        Ok((valid, invalid))
    }

    pub fn build_dimensions(rows: &[ValidRow<'_>]) -> Dimensions {
        let chains: BTreeSet<&str> = rows.iter().map(|r| r.chain_key).collect();
        let stores = winners(rows, |r| (r.chain_key, r.store_key));
        let products = winners(rows, |r| (r.chain_key, r.product_key));
        let dates: BTreeSet<NaiveDate> = rows.iter().map(|r| r.row.date_key).collect();

        let mut dim_chain: Vec<DimChain> = chains.into_iter().map(DimChain::new).collect();
        dim_chain.sort_by_key(|c| c.chain_id);

        let mut dim_store: Vec<DimStore> = stores
            .into_iter()
            .map(|((chain_key, store_key), winner)| DimStore {
                store_id: surrogate::store_id(chain_key, store_key),
                chain_id: surrogate::chain_id(chain_key),
                store_key: store_key.to_string(),
                city: winner.row.city.clone(),
                province: winner.row.province.clone(),
            })
            .collect();
        dim_store.sort_by_key(|s| s.store_id);

        let mut dim_product: Vec<DimProduct> = products
            .into_iter()
            .map(|((chain_key, product_key), winner)| DimProduct {
                product_id: surrogate::product_id(chain_key, product_key),
                chain_id: surrogate::chain_id(chain_key),
                product_key: product_key.to_string(),
                recipe: winner.row.recipe.clone(),
                size: winner.row.size.clone(),
                crust: winner.row.crust.clone(),
                category: winner.row.category.clone(),
            })
            .collect();
        dim_product.sort_by_key(|p| p.product_id);

        let dim_date = dates.into_iter().map(DimDate::from_date).collect();

        Dimensions {
            dim_chain,
            dim_store,
            dim_product,
            dim_date,
        }
    }

    pub fn build_fact(rows: &[ValidRow<'_>]) -> Vec<FactMenuPrice> {
        let mut fact: Vec<FactMenuPrice> = winners(rows, |r| (r.chain_key, r.store_key, r.product_key, r.row.date_key))
            .into_iter()
            .map(|((chain_key, store_key, product_key, date_key), winner)| FactMenuPrice {
                chain_id: surrogate::chain_id(chain_key),
                store_id: surrogate::store_id(chain_key, store_key),
                product_id: surrogate::product_id(chain_key, product_key),
                date_id: surrogate::date_id(date_key),
                price: winner.row.price,
            })
            .collect();
        fact.sort_by_key(FactMenuPrice::grain);
        fact
    }

    /// Validate, then build every dimension and the fact table.
    pub fn build(clean: &CleanDataset) -> Result<StarSchema, BuildError> {
        let (rows, _) = Self::validate(clean)?;
        Ok(StarSchema {
            dimensions: Self::build_dimensions(&rows),
            fact_menu_price: Self::build_fact(&rows),
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The most recent row per key.
fn winners<'r, 'a, K, F>(rows: &'r [ValidRow<'a>], key: F) -> BTreeMap<K, &'r ValidRow<'a>>
where
    K: Ord,
    F: Fn(&ValidRow<'a>) -> K,
{
    let mut best: BTreeMap<K, &ValidRow<'a>> = BTreeMap::new();
    for row in rows {
        best.entry(key(row))
            .and_modify(|current| {
                if row.row.recency() > current.row.recency() {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_row(store: &str, product: &str, price: f64, seq: usize) -> TypedRow {
        TypedRow {
            chain_key: Some("PP".to_string()),
            store_key: Some(store.to_string()),
            product_key: Some(product.to_string()),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            category: "Pizza".to_string(),
            recipe: "Pepperoni".to_string(),
            size: "Medium".to_string(),
            crust: "Hand Tossed".to_string(),
            price,
            date_key: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ingested_at: None,
            batch_seq: 0,
            row_seq: seq,
        }
    }

    fn dataset(rows: Vec<TypedRow>) -> CleanDataset {
        CleanDataset {
            rows,
            ..CleanDataset::default()
        }
    }

    #[test]
    fn test_duplicate_grain_keeps_latest_ingestion() {
        let mut early = create_test_row("PP_1", "PP_pepperoni_MD_HT", 11.49, 5);
        early.ingested_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        let mut late = create_test_row("PP_1", "PP_pepperoni_MD_HT", 10.99, 0);
        late.ingested_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap());

        let star = ModelBuilder::build(&dataset(vec![early, late])).unwrap();
        assert_eq!(star.fact_menu_price.len(), 1);
        assert_eq!(star.fact_menu_price[0].price, 10.99);
    }

    #[test]
    fn test_later_row_wins_without_timestamps() {
        let first = create_test_row("PP_1", "PP_pepperoni_MD_HT", 10.99, 0);
        let mut second = create_test_row("PP_1", "PP_pepperoni_MD_HT", 11.49, 1);
        second.city = "Mississauga".to_string();

        let star = ModelBuilder::build(&dataset(vec![first, second])).unwrap();
        assert_eq!(star.fact_menu_price[0].price, 11.49);
        assert_eq!(star.dimensions.dim_store.len(), 1);
        assert_eq!(star.dimensions.dim_store[0].city, "Mississauga");
    }

    #[test]
    fn test_star_references_resolve() {
        let rows = vec![
            create_test_row("PP_1", "PP_pepperoni_MD_HT", 12.99, 0),
            create_test_row("PP_2", "PP_pepperoni_MD_HT", 13.49, 1),
            create_test_row("PP_2", "PP_pepperoni_LG_HT", 15.99, 2),
        ];
        let star = ModelBuilder::build(&dataset(rows)).unwrap();
        let counts = star.counts();
        assert_eq!(
            counts,
            TableCounts {
                dim_chain: 1,
                dim_store: 2,
                dim_product: 2,
                dim_date: 1,
                fact_menu_price: 3,
            }
        );

        for fact in &star.fact_menu_price {
            assert!(star.dimensions.dim_store.iter().any(|s| s.store_id == fact.store_id));
            assert!(star.dimensions.dim_product.iter().any(|p| p.product_id == fact.product_id));
            assert!(star.dimensions.dim_date.iter().any(|d| d.date_id == fact.date_id));
        }
    }

    #[test]
    fn test_missing_keys_are_invalid() {
        let mut keyless = create_test_row("PP_1", "PP_x", 1.0, 0);
        keyless.store_key = None;
        let good = create_test_row("PP_1", "PP_y", 2.0, 1);

        let clean = dataset(vec![keyless.clone(), good]);
        let (valid, invalid) = ModelBuilder::validate(&clean).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid, 1);

        assert!(matches!(
            ModelBuilder::build(&dataset(vec![keyless])),
            Err(BuildError::NoUsableRows { input: 1 })
        ));
        assert_eq!(ModelBuilder::build(&dataset(Vec::new())).unwrap().counts(), TableCounts::default());
    }
}
