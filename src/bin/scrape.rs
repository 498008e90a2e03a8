//! Scrape raw menu prices from every configured chain
//!
//! Usage:
//!   cargo run --release --bin scrape
//!
//! Environment variables:
//!   MENUFLOW_CHAINS - Chains to scrape (default: dominos,pizzahut,pizzapizza)
//!   MENUFLOW_RAW_BACKEND - csv or sqlite (default: csv)
//!   MENUFLOW_RAW_DIR - Raw CSV directory (default: data/raw)
//!   MENUFLOW_RAW_DB - Raw SQLite database (default: data/raw/menuflow.db)

use chrono::{Local, Utc};
use dotenv::dotenv;
use log::{error, info};
use menuflow::pipeline::{adapters_from_config, make_sink, run_acquisition};
use menuflow::scraper_core::{RuntimeConfig, UnifiedRecordEmitter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RuntimeConfig::from_env()?;
    let adapters = adapters_from_config(&config)?;
    let chains: Vec<&str> = adapters.iter().map(|a| a.chain_key()).collect();

    info!("🍕 MenuFlow scrape");
    info!("   ├─ Chains: {:?}", chains);
    info!("   ├─ Backend: {:?}", config.backend);
    info!("   └─ Channel buffer: {}", config.channel_buffer);

    let sink = make_sink(&config)?;
    let mut emitter = UnifiedRecordEmitter::new(sink, Local::now().date_naive(), Utc::now());

    let report = run_acquisition(adapters, &mut emitter, config.channel_buffer).await?;
    report.log_summary();

    if report.all_failed() {
        error!("❌ Every selected chain failed");
        std::process::exit(1);
    }

    info!(
        "✅ Scrape complete: {} rows written to {}",
        emitter.emitted(),
        emitter.backend_type()
    );
    Ok(())
}
