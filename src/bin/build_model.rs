//! Rebuild the star schema from all raw records
//!
//! Usage:
//!   cargo run --release --bin build_model
//!
//! Environment variables:
//!   MENUFLOW_RAW_DIR - Raw CSV directory (default: data/raw)
//!   MENUFLOW_RAW_DB - Raw SQLite database (default: data/raw/menuflow.db)
//!   MENUFLOW_DIM_DIR - Dimension output (default: data/clean/dimensions)
//!   MENUFLOW_FACT_DIR - Fact output (default: data/clean/fact)
//!   MENUFLOW_SENTINEL_TOKENS - Placeholder product-key tokens (default: product)

use dotenv::dotenv;
use log::info;
use menuflow::pipeline::{run_build, ModelConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ModelConfig::from_env();
    info!("🔧 Building star schema");
    info!("   ├─ Raw: {} (+ {})", config.raw_dir.display(), config.raw_db.display());
    info!("   ├─ Dimensions: {}", config.dim_dir.display());
    info!("   └─ Fact: {}", config.fact_dir.display());

    let report = run_build(&config)?;
    report.log_summary();

    info!("✅ Build complete ({} tables written)", report.files.len());
    Ok(())
}
