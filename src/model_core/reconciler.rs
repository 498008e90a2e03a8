//! Schema reconciliation: RAW_LOAD and CLEAN/CAST
//!
//! Batches are unioned by column name against the unified schema. Any
//! unified column a batch lacks is null for its rows; columns the schema does
//! not know are ignored. A batch is rejected (`SchemaMismatch`) only when it
//! cannot be matched at all: no header, duplicate column names, or not a
//! single unified column. Every batch rejected is fatal (`NoCompatibleBatches`).
//!
//! Cleaning drops sentinel rows and casts price and date. Failed casts are
//! per-row drops, never fatal.

use super::reader::RawBatch;
use crate::scraper_core::output_writer::{INGESTED_AT_COLUMN, UNIFIED_COLUMNS};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema mismatch in batch {batch}: {reason}")]
    SchemaMismatch { batch: String, reason: String },

    #[error("no compatible raw batches ({skipped} skipped)")]
    NoCompatibleBatches { skipped: usize },
}

/// One raw row after union-by-name; every field optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub chain_key: Option<String>,
    pub store_key: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub category: Option<String>,
    pub recipe: Option<String>,
    pub product_key: Option<String>,
    pub size: Option<String>,
    pub crust: Option<String>,
    pub price: Option<String>,
    pub date_key: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub ingested_at: Option<String>,
    /// Position of the source batch in load order
    pub batch_seq: usize,
    /// Position of the row within its batch
    pub row_seq: usize,
}

impl RawRow {
    fn field_mut(&mut self, column: &str) -> Option<&mut Option<String>> {
        Some(match column {
            "chain_key" => &mut self.chain_key,
            "store_key" => &mut self.store_key,
            "city" => &mut self.city,
            "province" => &mut self.province,
            "category" => &mut self.category,
            "recipe" => &mut self.recipe,
            "product_key" => &mut self.product_key,
            "size" => &mut self.size,
            "crust" => &mut self.crust,
            "price" => &mut self.price,
            "date_key" => &mut self.date_key,
            "month" => &mut self.month,
            "year" => &mut self.year,
            c if c == INGESTED_AT_COLUMN => &mut self.ingested_at,
            _ => return None,
        })
    }
}

#[derive(Debug, Default)]
pub struct RawDataset {
    pub rows: Vec<RawRow>,
    pub batches_loaded: usize,
    pub batches_skipped: usize,
    /// Records the loaders could not decode
    pub undecodable: usize,
}

fn check_batch(batch: &RawBatch) -> Result<(), ReconcileError> {
    let mismatch = |reason: &str| ReconcileError::SchemaMismatch {
        batch: batch.source.clone(),
        reason: reason.to_string(),
    };

    if batch.columns.iter().all(|c| c.is_empty()) {
        return Err(mismatch("no header"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = batch.columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(mismatch(&format!("duplicate column '{}'", dup)));
    }
    if !batch.columns.iter().any(|c| UNIFIED_COLUMNS.contains(&c.as_str())) {
        return Err(mismatch("no unified columns"));
    }
    Ok(())
}

/// RAW_LOAD: union all batches by column name.
pub fn union_by_name(batches: Vec<RawBatch>) -> Result<RawDataset, ReconcileError> {
    let mut dataset = RawDataset::default();

    for (batch_seq, batch) in batches.into_iter().enumerate() {
        if let Err(e) = check_batch(&batch) {
            log::warn!("⚠️  Skipping batch: {}", e);
            dataset.batches_skipped += 1;
            continue;
        }

        let absent: Vec<&str> = UNIFIED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !batch.columns.iter().any(|b| b == c))
            .collect();
        if !absent.is_empty() {
            log::info!("ℹ️  {} lacks columns {:?}, treating them as null", batch.source, absent);
        }

        for (row_seq, values) in batch.rows.into_iter().enumerate() {
            let mut row = RawRow {
                batch_seq,
                row_seq,
                ..RawRow::default()
            };
            for (column, value) in batch.columns.iter().zip(values) {
                if let Some(slot) = row.field_mut(column) {
                    *slot = value;
                }
            }
            dataset.rows.push(row);
        }
        dataset.undecodable += batch.dropped;
        dataset.batches_loaded += 1;
    }

    if dataset.batches_loaded == 0 {
        return Err(ReconcileError::NoCompatibleBatches {
            skipped: dataset.batches_skipped,
        });
    }
    Ok(dataset)
}

/// Drops rows whose product key contains a placeholder token.
///
/// Guards against header rows emitted as data; an empty token list disables it.
#[derive(Debug, Clone)]
pub struct SentinelFilter {
    tokens: Vec<String>,
}

impl SentinelFilter {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn disabled() -> Self {
        Self { tokens: Vec::new() }
    }

    pub fn is_sentinel(&self, product_key: &str) -> bool {
        let key = product_key.to_lowercase();
        self.tokens.iter().any(|token| key.contains(token.as_str()))
    }
}

impl Default for SentinelFilter {
    fn default() -> Self {
        Self::new(["product"])
    }
}

/// A row with price and date cast. Keys stay optional until the build validates them.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    pub chain_key: Option<String>,
    pub store_key: Option<String>,
    pub product_key: Option<String>,
    pub city: String,
    pub province: String,
    pub category: String,
    pub recipe: String,
    pub size: String,
    pub crust: String,
    pub price: f64,
    pub date_key: NaiveDate,
    pub ingested_at: Option<DateTime<Utc>>,
    pub batch_seq: usize,
    pub row_seq: usize,
}

impl TypedRow {
    /// Ordering used to pick one row among duplicates: greatest wins.
    pub fn recency(&self) -> (Option<DateTime<Utc>>, usize, usize) {
        (self.ingested_at, self.batch_seq, self.row_seq)
    }
}

#[derive(Debug, Default)]
pub struct CleanDataset {
    pub rows: Vec<TypedRow>,
    pub dropped_sentinel: usize,
    pub dropped_cast: usize,
    pub dropped_negative: usize,
}

/// CLEAN/CAST: sentinel filter, then price and date casts.
///
/// Records the loaders could not decode count as cast failures.
pub fn clean(raw: &RawDataset, filter: &SentinelFilter) -> CleanDataset {
    let mut clean = CleanDataset {
        dropped_cast: raw.undecodable,
        ..CleanDataset::default()
    };

    for row in &raw.rows {
        if row.product_key.as_deref().map(|k| filter.is_sentinel(k)).unwrap_or(false) {
            log::debug!("Sentinel row dropped: {:?}", row.product_key);
            clean.dropped_sentinel += 1;
            continue;
        }

        let Some(price) = row.price.as_deref().and_then(parse_price) else {
            log::warn!(
                "⚠️  Dropping row {}:{} with unparseable price {:?}",
                row.batch_seq,
                row.row_seq,
                row.price
            );
            clean.dropped_cast += 1;
            continue;
        };
        if price < 0.0 {
            log::warn!(
                "⚠️  Dropping row {}:{} with negative price {}",
                row.batch_seq,
                row.row_seq,
                price
            );
            clean.dropped_negative += 1;
            continue;
        }

        let Some(date_key) = row.date_key.as_deref().and_then(parse_date) else {
            log::warn!(
                "⚠️  Dropping row {}:{} with unparseable date {:?}",
                row.batch_seq,
                row.row_seq,
                row.date_key
            );
            clean.dropped_cast += 1;
            continue;
        };

        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        clean.rows.push(TypedRow {
            chain_key: row.chain_key.clone(),
            store_key: row.store_key.clone(),
            product_key: row.product_key.clone(),
            city: text(&row.city),
            province: text(&row.province),
            category: text(&row.category),
            recipe: text(&row.recipe),
            size: text(&row.size),
            crust: text(&row.crust),
            price,
            date_key,
            ingested_at: row.ingested_at.as_deref().and_then(parse_timestamp),
            batch_seq: row.batch_seq,
            row_seq: row.row_seq,
        });
    }

    clean
}

fn parse_price(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// ISO date; a trailing time part is ignored.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
            .collect()
    }

    #[test]
    fn test_union_tolerates_missing_and_extra_columns() {
        let old = RawBatch::new(
            "old.csv",
            strings(&["chain_key", "store_key", "product_key", "price", "date_key"]),
            vec![row(&["DP", "DP_1", "DP_cyo_MD_HT", "12.99", "2024-01-02"])],
        );
        let new = RawBatch::new(
            "new.csv",
            strings(&["debug_col", "chain_key", "product_key", "price", "date_key", "ingested_at", "city"]),
            vec![row(&["x", "PH", "PH_cheese_LG_PAN", "15.00", "2024-01-02", "2024-01-02T10:00:00Z", "Halifax"])],
        );

        let dataset = union_by_name(vec![old, new]).unwrap();
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.rows[0].city, None);
        assert_eq!(dataset.rows[0].ingested_at, None);
        assert_eq!(dataset.rows[1].store_key, None);
        assert_eq!(dataset.rows[1].city.as_deref(), Some("Halifax"));
        assert_eq!(dataset.rows[1].batch_seq, 1);
    }

    #[test]
    fn test_incompatible_batches() {
        let empty = RawBatch::new("empty.csv", Vec::new(), Vec::new());
        let foreign = RawBatch::new("foreign.csv", strings(&["a", "b"]), vec![row(&["1", "2"])]);
        let duplicated = RawBatch::new("dup.csv", strings(&["price", "price"]), Vec::new());
        let good = RawBatch::new("good.csv", strings(&["chain_key"]), vec![row(&["DP"])]);

        let dataset = union_by_name(vec![empty, foreign, good]).unwrap();
        assert_eq!(dataset.batches_loaded, 1);
        assert_eq!(dataset.batches_skipped, 2);

        let result = union_by_name(vec![duplicated]);
        assert!(matches!(result, Err(ReconcileError::NoCompatibleBatches { skipped: 1 })));
        assert!(matches!(union_by_name(Vec::new()), Err(ReconcileError::NoCompatibleBatches { .. })));
    }

    #[test]
    fn test_clean_drops_sentinels_and_bad_casts() {
        let batch = RawBatch::new(
            "menu.csv",
            strings(&["chain_key", "store_key", "product_key", "price", "date_key"]),
            vec![
                row(&["PP", "PP_1", "PP_pepperoni_MD_HT", "12.99", "2024-05-01"]),
                row(&["PP", "PP_1", "product_key", "price", "date_key"]),
                row(&["PP", "PP_1", "PP_cheese_MD_HT", "-1", "2024-05-01"]),
                row(&["PP", "PP_1", "PP_cheese_LG_HT", "abc", "2024-05-01"]),
                row(&["PP", "PP_1", "PP_cheese_XL_HT", "14.00", "05/01/2024"]),
            ],
        );
        let dataset = union_by_name(vec![batch]).unwrap();
        let clean = clean(&dataset, &SentinelFilter::default());

        assert_eq!(clean.rows.len(), 1);
        assert_eq!(clean.dropped_sentinel, 1);
        assert_eq!(clean.dropped_negative, 1);
        assert_eq!(clean.dropped_cast, 2);
        assert_eq!(clean.rows[0].city, "");
    }

    #[test]
    fn test_sentinel_filter() {
        let filter = SentinelFilter::default();
        assert!(filter.is_sentinel("PP_PRODUCT_KEY"));
        assert!(!filter.is_sentinel("PP_pepperoni_MD_HT"));
        assert!(!SentinelFilter::disabled().is_sentinel("product"));
        assert!(!SentinelFilter::new([""]).is_sentinel("product"));
    }

    #[test]
    fn test_recency_orders_missing_timestamps_first() {
        let dataset = union_by_name(vec![RawBatch::new(
            "t.csv",
            strings(&["product_key", "price", "date_key", "ingested_at"]),
            vec![
                row(&["PP_a", "1", "2024-01-01", "2024-01-01T08:00:00Z"]),
                row(&["PP_a", "2", "2024-01-01", ""]),
            ],
        )])
        .unwrap();
        let clean = clean(&dataset, &SentinelFilter::disabled());
        assert!(clean.rows[0].recency() > clean.rows[1].recency());
    }
}
