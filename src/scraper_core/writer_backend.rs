use crate::scraper_core::output_writer::UnifiedRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for EmitError {
    fn from(err: rusqlite::Error) -> Self {
        EmitError::Database(err.to_string())
    }
}

/// Append-only destination for unified raw records.
#[async_trait]
pub trait RawSink: Send {
    /// Append a single record
    async fn write(&mut self, record: &UnifiedRecord) -> Result<(), EmitError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), EmitError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
