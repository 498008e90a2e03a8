pub mod adapter;
pub mod config;
pub mod dominos;
pub mod emitter;
pub mod error_handler;
pub mod http_client;
pub mod json_util;
pub mod normalizer;
pub mod output_writer;
pub mod pizza_hut;
pub mod pizza_pizza;
pub mod sqlite_writer;
pub mod writer_backend;

pub use adapter::{AdapterError, AdapterRun, RawObservation, SourceAdapter};
pub use config::{BackendType, ConfigError, RuntimeConfig};
pub use emitter::UnifiedRecordEmitter;
pub use normalizer::{CanonicalCrust, CanonicalSize, NormalizeError, NormalizedObservation, Normalizer, Vocabulary};
pub use output_writer::{CsvRawWriter, UnifiedRecord, INGESTED_AT_COLUMN, UNIFIED_COLUMNS};
pub use sqlite_writer::SqliteRawWriter;
pub use writer_backend::{EmitError, RawSink};
