//! EXPORT: one CSV per table for the reporting tool
//!
//! Column order is fixed by the header constants below and matches the
//! field order of each row struct. Rows are written in the order the
//! builder sorted them, so identical input gives byte-identical files.

use super::builder::{StarSchema, TableCounts};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DIM_CHAIN_FILE: &str = "dim_chain.csv";
pub const DIM_STORE_FILE: &str = "dim_store.csv";
pub const DIM_PRODUCT_FILE: &str = "dim_product.csv";
pub const DIM_DATE_FILE: &str = "dim_date.csv";
pub const FACT_MENU_PRICE_FILE: &str = "fact_menu_price.csv";

pub const DIM_CHAIN_COLUMNS: [&str; 2] = ["chain_id", "chain_key"];
pub const DIM_STORE_COLUMNS: [&str; 5] = ["store_id", "chain_id", "store_key", "city", "province"];
pub const DIM_PRODUCT_COLUMNS: [&str; 7] = [
    "product_id",
    "chain_id",
    "product_key",
    "recipe",
    "size",
    "crust",
    "category",
];
pub const DIM_DATE_COLUMNS: [&str; 7] = [
    "date_id",
    "date_key",
    "year_num",
    "month_num",
    "month_name",
    "day_num",
    "dow_num",
];
pub const FACT_MENU_PRICE_COLUMNS: [&str; 5] = ["chain_id", "store_id", "product_id", "date_id", "price"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{file}: expected columns {expected:?}, found {found:?}")]
    UnexpectedHeader {
        file: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub counts: TableCounts,
}

pub fn export_star(
    star: &StarSchema,
    dim_dir: impl AsRef<Path>,
    fact_dir: impl AsRef<Path>,
) -> Result<ExportSummary, ExportError> {
    let dim_dir = dim_dir.as_ref();
    let fact_dir = fact_dir.as_ref();
    fs::create_dir_all(dim_dir)?;
    fs::create_dir_all(fact_dir)?;

    let dims = &star.dimensions;
    let files = vec![
        write_table(&dim_dir.join(DIM_CHAIN_FILE), &DIM_CHAIN_COLUMNS, &dims.dim_chain)?,
        write_table(&dim_dir.join(DIM_STORE_FILE), &DIM_STORE_COLUMNS, &dims.dim_store)?,
        write_table(&dim_dir.join(DIM_PRODUCT_FILE), &DIM_PRODUCT_COLUMNS, &dims.dim_product)?,
        write_table(&dim_dir.join(DIM_DATE_FILE), &DIM_DATE_COLUMNS, &dims.dim_date)?,
        write_table(
            &fact_dir.join(FACT_MENU_PRICE_FILE),
            &FACT_MENU_PRICE_COLUMNS,
            &star.fact_menu_price,
        )?,
    ];

    for file in &files {
        log::info!("📄 Exported {}", file.display());
    }

    Ok(ExportSummary {
        files,
        counts: star.counts(),
    })
}

/// Written to a sibling temp file first so a reader never sees half a table.
fn write_table<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<PathBuf, ExportError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        writer.write_record(columns)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(path.to_path_buf())
}

/// Re-read exported tables and count their rows, checking each header.
pub fn reload_counts(dim_dir: impl AsRef<Path>, fact_dir: impl AsRef<Path>) -> Result<TableCounts, ExportError> {
    let dim_dir = dim_dir.as_ref();
    let fact_dir = fact_dir.as_ref();

    Ok(TableCounts {
        dim_chain: count_rows(&dim_dir.join(DIM_CHAIN_FILE), &DIM_CHAIN_COLUMNS)?,
        dim_store: count_rows(&dim_dir.join(DIM_STORE_FILE), &DIM_STORE_COLUMNS)?,
        dim_product: count_rows(&dim_dir.join(DIM_PRODUCT_FILE), &DIM_PRODUCT_COLUMNS)?,
        dim_date: count_rows(&dim_dir.join(DIM_DATE_FILE), &DIM_DATE_COLUMNS)?,
        fact_menu_price: count_rows(&fact_dir.join(FACT_MENU_PRICE_FILE), &FACT_MENU_PRICE_COLUMNS)?,
    })
}

fn count_rows(path: &Path, columns: &[&str]) -> Result<usize, ExportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if found != columns {
        return Err(ExportError::UnexpectedHeader {
            file: path.display().to_string(),
            expected: columns.iter().map(|c| c.to_string()).collect(),
            found,
        });
    }

    let mut count = 0;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}
