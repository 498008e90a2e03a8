use crate::scraper_core::writer_backend::{EmitError, RawSink};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Column order of every raw batch.
pub const UNIFIED_COLUMNS: [&str; 13] = [
    "chain_key",
    "store_key",
    "city",
    "province",
    "category",
    "recipe",
    "product_key",
    "size",
    "crust",
    "price",
    "date_key",
    "month",
    "year",
];

/// Optional trailing column; batches written before it existed stay readable.
pub const INGESTED_AT_COLUMN: &str = "ingested_at";

/// One row of the unified raw-record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedRecord {
    pub chain_key: String,
    pub store_key: String,
    pub city: String,
    pub province: String,
    pub category: String,
    pub recipe: String,
    pub product_key: String,
    pub size: String,
    pub crust: String,
    pub price: f64,
    pub date_key: NaiveDate,
    pub month: u32,
    pub year: i32,
    pub ingested_at: Option<DateTime<Utc>>,
}

impl UnifiedRecord {
    pub fn header() -> Vec<&'static str> {
        let mut header = UNIFIED_COLUMNS.to_vec();
        header.push(INGESTED_AT_COLUMN);
        header
    }

    /// Field values in `header()` order, as written to disk.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.chain_key.clone(),
            self.store_key.clone(),
            self.city.clone(),
            self.province.clone(),
            self.category.clone(),
            self.recipe.clone(),
            self.product_key.clone(),
            self.size.clone(),
            self.crust.clone(),
            format!("{:.2}", self.price),
            self.date_key.format("%Y-%m-%d").to_string(),
            self.month.to_string(),
            self.year.to_string(),
            self.ingested_at
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
        ]
    }
}

/// One append-only CSV file per chain per day: `menu_{chain}_{YYYYMMDD}.csv`.
///
/// Reruns on the same day append to the existing file; the header is only
/// written when the file is created.
pub struct CsvRawWriter {
    dir: PathBuf,
    files: HashMap<PathBuf, csv::Writer<File>>,
    rows_written: u64,
}

impl CsvRawWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, EmitError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: HashMap::new(),
            rows_written: 0,
        })
    }

    pub fn file_name(chain_key: &str, date: NaiveDate) -> String {
        format!("menu_{}_{}.csv", chain_key.to_lowercase(), date.format("%Y%m%d"))
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    fn writer_for(&mut self, record: &UnifiedRecord) -> Result<&mut csv::Writer<File>, EmitError> {
        let path = self.dir.join(Self::file_name(&record.chain_key, record.date_key));
        if !self.files.contains_key(&path) {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let is_new = file.metadata()?.len() == 0;

            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            if is_new {
                writer.write_record(UnifiedRecord::header())?;
            }
            log::info!("📄 Writing raw records to {}", path.display());
            self.files.insert(path.clone(), writer);
        }
        self.files
            .get_mut(&path)
            .ok_or_else(|| EmitError::InvalidRecord(format!("no writer for {}", path.display())))
    }
}

#[async_trait]
impl RawSink for CsvRawWriter {
    async fn write(&mut self, record: &UnifiedRecord) -> Result<(), EmitError> {
        let writer = self.writer_for(record)?;
        writer.write_record(record.to_row())?;
        self.rows_written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), EmitError> {
        for writer in self.files.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "CSV"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn create_test_record(chain: &str, price: f64) -> UnifiedRecord {
        UnifiedRecord {
            chain_key: chain.to_string(),
            store_key: format!("{}_1", chain),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            category: "Pizza".to_string(),
            recipe: "Pepperoni".to_string(),
            product_key: format!("{}_pepperoni_MD_HT", chain),
            size: "Medium".to_string(),
            crust: "Hand Tossed".to_string(),
            price,
            date_key: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            month: 3,
            year: 2024,
            ingested_at: Some(Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_row_format() {
        let row = create_test_record("PP", 10.0).to_row();
        assert_eq!(row.len(), UnifiedRecord::header().len());
        assert_eq!(row[9], "10.00");
        assert_eq!(row[10], "2024-03-05");
        assert_eq!(row[11], "3");
        assert_eq!(row[13], "2024-03-05T14:30:00Z");
    }

    #[tokio::test]
    async fn test_one_file_per_chain_and_day() {
        let dir = tempdir().unwrap();
        let mut writer = CsvRawWriter::new(dir.path()).unwrap();

        writer.write(&create_test_record("PP", 12.99)).await.unwrap();
        writer.write(&create_test_record("DP", 11.49)).await.unwrap();
        writer.write(&create_test_record("PP", 13.49)).await.unwrap();
        writer.flush().await.unwrap();

        let pp = std::fs::read_to_string(dir.path().join("menu_pp_20240305.csv")).unwrap();
        assert_eq!(pp.lines().count(), 3);
        assert!(pp.starts_with("chain_key,store_key,"));
        assert!(dir.path().join("menu_dp_20240305.csv").exists());
        assert_eq!(writer.rows_written(), 3);
    }

    #[tokio::test]
    async fn test_rerun_appends_without_second_header() {
        let dir = tempdir().unwrap();

        for _ in 0..2 {
            let mut writer = CsvRawWriter::new(dir.path()).unwrap();
            writer.write(&create_test_record("PH", 9.99)).await.unwrap();
            writer.flush().await.unwrap();
        }

        let contents = std::fs::read_to_string(dir.path().join("menu_ph_20240305.csv")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert_eq!(contents.matches("chain_key").count(), 1);
    }
}
