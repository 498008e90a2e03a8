//! Model build engine
//!
//! ```text
//! RAW_LOAD → CLEAN/CAST → DIMENSION_BUILD → FACT_BUILD → EXPORT
//! ```
//!
//! Each stage consumes the previous stage's value and produces a new one;
//! nothing is mutated in place across stages. A failure before EXPORT leaves
//! previously exported tables untouched.

use super::config::ModelConfig;
use crate::model_core::reader::{read_csv_dir, read_sqlite_batch, RawBatch};
use crate::model_core::{
    clean, export_star, reload_counts, union_by_name, BuildError, ExportError, ModelBuilder, ReconcileError,
    SentinelFilter, StarSchema, TableCounts,
};
use crate::scraper_core::sqlite_writer::RAW_TABLE;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("exported {exported:?} but reloaded {reloaded:?}")]
    RoundTrip {
        exported: TableCounts,
        reloaded: TableCounts,
    },
}

/// Row counts observed at each stage of one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub batches_loaded: usize,
    pub batches_skipped: usize,
    pub raw_rows: usize,
    pub dropped_sentinel: usize,
    pub dropped_cast: usize,
    pub dropped_negative: usize,
    pub dropped_invalid: usize,
    pub valid_rows: usize,
    pub tables: TableCounts,
    pub files: Vec<PathBuf>,
}

impl BuildReport {
    pub fn log_summary(&self) {
        log::info!("📊 Build summary");
        log::info!(
            "   ├─ RAW_LOAD: {} rows from {} batches ({} skipped)",
            self.raw_rows,
            self.batches_loaded,
            self.batches_skipped
        );
        log::info!(
            "   ├─ CLEAN: {} sentinel, {} cast failures, {} negative prices, {} missing keys dropped",
            self.dropped_sentinel,
            self.dropped_cast,
            self.dropped_negative,
            self.dropped_invalid
        );
        log::info!(
            "   ├─ DIMENSIONS: {} chains, {} stores, {} products, {} dates",
            self.tables.dim_chain,
            self.tables.dim_store,
            self.tables.dim_product,
            self.tables.dim_date
        );
        log::info!(
            "   └─ FACT: {} prices from {} valid rows",
            self.tables.fact_menu_price,
            self.valid_rows
        );
    }
}

/// RAW_LOAD sources: every CSV batch in file-name order, then the SQLite table.
pub fn load_raw_batches(config: &ModelConfig) -> Result<Vec<RawBatch>, ReconcileError> {
    let mut batches = read_csv_dir(&config.raw_dir)?;
    if let Some(batch) = read_sqlite_batch(&config.raw_db, RAW_TABLE)? {
        batches.push(batch);
    }
    log::info!("📥 Loaded {} raw batches", batches.len());
    Ok(batches)
}

/// Everything up to (not including) EXPORT.
pub fn build_from_batches(
    batches: Vec<RawBatch>,
    filter: &SentinelFilter,
) -> Result<(StarSchema, BuildReport), PipelineError> {
    let raw = union_by_name(batches)?;
    let cleaned = clean(&raw, filter);

    let (valid, dropped_invalid) = ModelBuilder::validate(&cleaned)?;
    let dimensions = ModelBuilder::build_dimensions(&valid);
    let fact_menu_price = ModelBuilder::build_fact(&valid);

    let star = StarSchema {
        dimensions,
        fact_menu_price,
    };
    let report = BuildReport {
        batches_loaded: raw.batches_loaded,
        batches_skipped: raw.batches_skipped,
        raw_rows: raw.rows.len(),
        dropped_sentinel: cleaned.dropped_sentinel,
        dropped_cast: cleaned.dropped_cast,
        dropped_negative: cleaned.dropped_negative,
        dropped_invalid,
        valid_rows: valid.len(),
        tables: star.counts(),
        files: Vec::new(),
    };
    Ok((star, report))
}

/// Full rebuild from the configured raw store, then export and verify by reload.
pub fn run_build(config: &ModelConfig) -> Result<BuildReport, PipelineError> {
    let batches = load_raw_batches(config)?;
    let (star, mut report) = build_from_batches(batches, &config.sentinel_filter())?;

    let summary = export_star(&star, &config.dim_dir, &config.fact_dir)?;
    let reloaded = reload_counts(&config.dim_dir, &config.fact_dir)?;
    if reloaded != summary.counts {
        return Err(PipelineError::RoundTrip {
            exported: summary.counts,
            reloaded,
        });
    }

    report.files = summary.files;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper_core::UNIFIED_COLUMNS;

    fn batch(source: &str, rows: &[[&str; 13]]) -> RawBatch {
        RawBatch::new(
            source,
            UNIFIED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Some(v.to_string()).filter(|v| !v.is_empty())).collect())
                .collect(),
        )
    }

    const ROW: [&str; 13] = [
        "PP", "PP_1", "Toronto", "ON", "Pizza", "Pepperoni", "PP_pepperoni_MD_HT", "Medium", "Hand Tossed", "12.99",
        "2024-06-01", "6", "2024",
    ];

    #[test]
    fn test_stage_counts() {
        let mut negative = ROW;
        negative[6] = "PP_pepperoni_LG_HT";
        negative[9] = "-1";
        let mut sentinel = ROW;
        sentinel[6] = "product_key";
        let mut keyless = ROW;
        keyless[1] = "";

        let batches = vec![batch("a.csv", &[ROW, negative, sentinel, keyless])];
        let (star, report) = build_from_batches(batches, &SentinelFilter::default()).unwrap();

        assert_eq!(report.raw_rows, 4);
        assert_eq!(report.dropped_negative, 1);
        assert_eq!(report.dropped_sentinel, 1);
        assert_eq!(report.dropped_invalid, 1);
        assert_eq!(report.valid_rows, 1);
        assert_eq!(star.fact_menu_price.len(), 1);
        assert_eq!(star.fact_menu_price[0].price, 12.99);
    }

    #[test]
    fn test_no_batches_is_fatal() {
        assert!(matches!(
            build_from_batches(Vec::new(), &SentinelFilter::default()),
            Err(PipelineError::Reconcile(ReconcileError::NoCompatibleBatches { skipped: 0 }))
        ));
    }
}
