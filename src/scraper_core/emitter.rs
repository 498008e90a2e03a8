//! Turns normalized observations into unified records and appends them to a raw sink.

use super::normalizer::NormalizedObservation;
use super::output_writer::UnifiedRecord;
use super::writer_backend::{EmitError, RawSink};
use crate::scraper_core::json_util::round2;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub struct UnifiedRecordEmitter {
    sink: Box<dyn RawSink>,
    date_key: NaiveDate,
    ingested_at: DateTime<Utc>,
    emitted: u64,
}

impl UnifiedRecordEmitter {
    /// `date_key` is the observation day; `ingested_at` stamps every record of this run.
    pub fn new(sink: Box<dyn RawSink>, date_key: NaiveDate, ingested_at: DateTime<Utc>) -> Self {
        Self {
            sink,
            date_key,
            ingested_at,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn backend_type(&self) -> &'static str {
        self.sink.backend_type()
    }

    pub fn to_record(&self, observation: &NormalizedObservation) -> Result<UnifiedRecord, EmitError> {
        to_record(observation, self.date_key, Some(self.ingested_at))
    }

    pub async fn emit(&mut self, observation: &NormalizedObservation) -> Result<(), EmitError> {
        let record = self.to_record(observation)?;
        self.sink.write(&record).await?;
        self.emitted += 1;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), EmitError> {
        self.sink.flush().await
    }
}

/// Assemble one unified record; rejects non-finite or negative prices and blank keys.
pub fn to_record(
    observation: &NormalizedObservation,
    date_key: NaiveDate,
    ingested_at: Option<DateTime<Utc>>,
) -> Result<UnifiedRecord, EmitError> {
    if !observation.price.is_finite() || observation.price < 0.0 {
        return Err(EmitError::InvalidRecord(format!(
            "price {} for {} at {}",
            observation.price, observation.product_key, observation.store_key
        )));
    }
    for (name, value) in [
        ("chain_key", &observation.chain_key),
        ("store_key", &observation.store_key),
        ("product_key", &observation.product_key),
    ] {
        if value.trim().is_empty() {
            return Err(EmitError::InvalidRecord(format!("missing {}", name)));
        }
    }

    Ok(UnifiedRecord {
        chain_key: observation.chain_key.clone(),
        store_key: observation.store_key.clone(),
        city: observation.city.clone(),
        province: observation.province.clone(),
        category: observation.category.clone(),
        recipe: observation.recipe.clone(),
        product_key: observation.product_key.clone(),
        size: observation.size.as_str().to_string(),
        crust: observation.crust.as_str().to_string(),
        price: round2(observation.price),
        date_key,
        month: date_key.month(),
        year: date_key.year(),
        ingested_at,
    })
}
