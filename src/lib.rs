//! # MenuFlow
//!
//! Collects pizza menu prices from several chains with incompatible public
//! APIs, normalizes them into one unified raw-record schema, and rebuilds a
//! star schema (four dimensions plus one price fact) for reporting tools.
//!
//! ```text
//! SourceAdapter (DP / PH / PP) → Normalizer → UnifiedRecordEmitter → raw sink
//!     ↓ (later, possibly another machine)
//! RawBatch loaders → union by name → clean/cast → ModelBuilder → Exporter
//! ```
//!
//! - `scraper_core` - adapters, HTTP plumbing, vocabulary normalization, raw sinks
//! - `model_core` - reconciliation, surrogate keys, dimensions, fact, export
//! - `pipeline` - runtime orchestration of both halves


pub mod model_core;
pub mod pipeline;
pub mod scraper_core;
