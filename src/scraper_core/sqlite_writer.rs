use crate::scraper_core::{
    output_writer::UnifiedRecord,
    writer_backend::{EmitError, RawSink},
};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Instant;

pub const RAW_TABLE: &str = "raw_menu_price";

pub struct SqliteRawWriter {
    conn: Connection,
    batch: Vec<UnifiedRecord>,
    batch_size: usize,
    last_flush: Instant,
    flush_interval_secs: u64,
}

impl SqliteRawWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, EmitError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

        // Append-only: no uniqueness constraint, duplicates are resolved at build time
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    chain_key TEXT,
                    store_key TEXT,
                    city TEXT,
                    province TEXT,
                    category TEXT,
                    recipe TEXT,
                    product_key TEXT,
                    size TEXT,
                    crust TEXT,
                    price REAL,
                    date_key TEXT,
                    month INTEGER,
                    year INTEGER,
                    ingested_at TEXT
                )",
                RAW_TABLE
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_raw_chain_date ON {}(chain_key, date_key)",
                RAW_TABLE
            ),
            [],
        )?;

        log::info!("✅ SQLite raw store initialized with WAL mode");

        Ok(Self {
            conn,
            batch: Vec::with_capacity(500),
            batch_size: 500,
            last_flush: Instant::now(),
            flush_interval_secs: 2,
        })
    }

    fn flush_batch(&mut self) -> Result<(), EmitError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {}
                 (chain_key, store_key, city, province, category, recipe, product_key,
                  size, crust, price, date_key, month, year, ingested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                RAW_TABLE
            ))?;
            for record in &self.batch {
                let row = record.to_row();
                stmt.execute(params![
                    record.chain_key,
                    record.store_key,
                    record.city,
                    record.province,
                    record.category,
                    record.recipe,
                    record.product_key,
                    record.size,
                    record.crust,
                    record.price,
                    row[10],
                    record.month,
                    record.year,
                    Some(row[13].as_str()).filter(|ts| !ts.is_empty()),
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("✅ Flushed {} raw records to SQLite", self.batch.len());
        self.batch.clear();
        self.last_flush = Instant::now();

        Ok(())
    }
}

#[async_trait]
impl RawSink for SqliteRawWriter {
    async fn write(&mut self, record: &UnifiedRecord) -> Result<(), EmitError> {
        self.batch.push(record.clone());

        if self.batch.len() >= self.batch_size || self.last_flush.elapsed().as_secs() >= self.flush_interval_secs {
            self.flush_batch()?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), EmitError> {
        self.flush_batch()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn create_test_record(store: &str) -> UnifiedRecord {
        UnifiedRecord {
            chain_key: "DP".to_string(),
            store_key: store.to_string(),
            city: "Ottawa".to_string(),
            province: "ON".to_string(),
            category: "Pizza".to_string(),
            recipe: "Pepperoni".to_string(),
            product_key: "DP_pepperoni_LG_THIN".to_string(),
            size: "Large".to_string(),
            crust: "Thin".to_string(),
            price: 18.49,
            date_key: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            month: 1,
            year: 2024,
            ingested_at: None,
        }
    }

    #[tokio::test]
    async fn test_sqlite_basic_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("raw.db");
        let mut writer = SqliteRawWriter::new(&db_path).unwrap();

        writer.write(&create_test_record("DP_10413")).await.unwrap();
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (date_key, ingested_at): (String, Option<String>) = conn
            .query_row(
                "SELECT date_key, ingested_at FROM raw_menu_price WHERE store_key = ?1",
                params!["DP_10413"],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(date_key, "2024-01-31");
        assert!(ingested_at.is_none());
    }

    #[tokio::test]
    async fn test_append_keeps_duplicates() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("raw.db");
        let mut writer = SqliteRawWriter::new(&db_path).unwrap();

        let record = create_test_record("DP_1");
        writer.write(&record).await.unwrap();
        writer.write(&record).await.unwrap();
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM raw_menu_price", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_batch_flush() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("raw.db");
        let mut writer = SqliteRawWriter::new(&db_path).unwrap();

        for i in 0..750 {
            writer.write(&create_test_record(&format!("DP_{}", i))).await.unwrap();
        }
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM raw_menu_price", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 750);

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }
}
