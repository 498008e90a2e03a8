//! End-to-end: adapters → raw CSV sink → reconcile → build → export → reload

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use menuflow::model_core::exporter::{DIM_PRODUCT_FILE, DIM_STORE_FILE, FACT_MENU_PRICE_FILE};
use menuflow::model_core::{reload_counts, surrogate};
use menuflow::pipeline::{run_acquisition, run_build, ModelConfig};
use menuflow::scraper_core::{
    AdapterError, AdapterRun, CsvRawWriter, RawObservation, SourceAdapter, UnifiedRecordEmitter, Vocabulary,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct FakeAdapter {
    chain_key: &'static str,
    medium_price: f64,
    fail: bool,
}

#[async_trait]
impl SourceAdapter for FakeAdapter {
    fn chain_key(&self) -> &'static str {
        self.chain_key
    }

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::default()
    }

    async fn collect(&self) -> Result<AdapterRun, AdapterError> {
        if self.fail {
            return Err(AdapterError::SchemaChanged("store list is empty".to_string()));
        }
        let observation = |store: &str, size: &str, price: f64| RawObservation {
            chain_key: self.chain_key.to_string(),
            store_key: format!("{}_{}", self.chain_key, store),
            city: "Toronto".to_string(),
            province: "ON".to_string(),
            category: "Pizza".to_string(),
            recipe: "Pepperoni".to_string(),
            size_label: size.to_string(),
            crust_label: "Hand Tossed".to_string(),
            price,
        };
        Ok(AdapterRun {
            observations: vec![
                observation("1", "12\"", self.medium_price),
                observation("1", "Large", 15.99),
                observation("2", "Medium", 13.49),
            ],
            dropped: 0,
        })
    }
}

fn model_config(root: &Path) -> ModelConfig {
    ModelConfig {
        raw_dir: root.join("raw"),
        raw_db: root.join("raw/absent.db"),
        dim_dir: root.join("clean/dimensions"),
        fact_dir: root.join("clean/fact"),
        sentinel_tokens: vec!["product".to_string()],
    }
}

async fn scrape_once(raw_dir: &Path, medium_price: f64, hour: u32) {
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let ingested_at = Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap();
    let sink = CsvRawWriter::new(raw_dir).unwrap();
    let mut emitter = UnifiedRecordEmitter::new(Box::new(sink), date, ingested_at);

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FakeAdapter {
            chain_key: "PP",
            medium_price,
            fail: false,
        }),
        Arc::new(FakeAdapter {
            chain_key: "DP",
            medium_price,
            fail: true,
        }),
    ];

    let report = run_acquisition(adapters, &mut emitter, 8).await.unwrap();
    assert_eq!(report.chains["PP"].emitted, 3);
    assert_eq!(report.chains["DP"].emitted, 0);
    assert!(report.chains["DP"].failed());
}

#[tokio::test]
async fn test_scrape_then_build_star() {
    let temp = TempDir::new().unwrap();
    let config = model_config(temp.path());

    // Two runs on the same day; the later run's price must win
    scrape_once(&config.raw_dir, 10.99, 9).await;
    scrape_once(&config.raw_dir, 11.49, 18).await;

    // A foreign batch with a negative price and a placeholder row
    fs::write(
        config.raw_dir.join("manual_fix.csv"),
        "chain_key,store_key,product_key,price,date_key\n\
         PP,PP_1,PP_hawaiian_MD_HT,-1,2024-06-01\n\
         PP,PP_1,product_key,price,date_key\n",
    )
    .unwrap();

    let report = run_build(&config).unwrap();
    assert_eq!(report.batches_loaded, 2);
    assert_eq!(report.raw_rows, 8);
    assert_eq!(report.dropped_negative, 1);
    assert_eq!(report.dropped_sentinel, 1);
    assert_eq!(report.tables.dim_chain, 1);
    assert_eq!(report.tables.dim_store, 2);
    assert_eq!(report.tables.dim_product, 2);
    assert_eq!(report.tables.dim_date, 1);
    assert_eq!(report.tables.fact_menu_price, 3);

    // The failed chain is absent, not mixed in
    let stores = fs::read_to_string(config.dim_dir.join(DIM_STORE_FILE)).unwrap();
    assert!(!stores.contains("DP_"));

    let products = fs::read_to_string(config.dim_dir.join(DIM_PRODUCT_FILE)).unwrap();
    assert!(!products.contains("hawaiian"));

    let fact = fs::read_to_string(config.fact_dir.join(FACT_MENU_PRICE_FILE)).unwrap();
    let medium_at_store_1 = format!(
        "{},{},{},{},",
        surrogate::chain_id("PP"),
        surrogate::store_id("PP", "PP_1"),
        surrogate::product_id("PP", "PP_pepperoni_MD_HT"),
        surrogate::date_id(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    );
    let prices: Vec<&str> = fact
        .lines()
        .filter(|line| line.starts_with(&medium_at_store_1))
        .collect();
    assert_eq!(prices.len(), 1);
    assert!(prices[0].ends_with(",11.49"));

    assert_eq!(reload_counts(&config.dim_dir, &config.fact_dir).unwrap(), report.tables);
}

#[tokio::test]
async fn test_rebuild_is_byte_identical() {
    let temp = TempDir::new().unwrap();
    let config = model_config(temp.path());
    scrape_once(&config.raw_dir, 12.99, 12).await;

    let first = run_build(&config).unwrap();
    let snapshot: Vec<Vec<u8>> = first.files.iter().map(|f| fs::read(f).unwrap()).collect();

    let second = run_build(&config).unwrap();
    let again: Vec<Vec<u8>> = second.files.iter().map(|f| fs::read(f).unwrap()).collect();

    assert_eq!(first.files, second.files);
    assert_eq!(snapshot, again);
}
