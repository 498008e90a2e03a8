//! Source adapter contract
//!
//! One adapter per chain. An adapter discovers stores, fans out menu
//! requests under the chain's throttle limits and yields `RawObservation`s
//! in the chain's own vocabulary. Normalization happens downstream.
//!
//! Item-scoped failures (a store 404, an unparseable product) are logged and
//! dropped inside the adapter. Systemic failures (authentication, a store
//! list that no longer parses) abort the whole chain and surface as
//! `AdapterError`.

use super::http_client::HttpError;
use super::normalizer::Vocabulary;
use async_trait::async_trait;
use thiserror::Error;

/// One priced (store, product, size, crust) observation, still chain-native.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservation {
    pub chain_key: String,
    pub store_key: String,
    pub city: String,
    pub province: String,
    pub category: String,
    pub recipe: String,
    pub size_label: String,
    pub crust_label: String,
    pub price: f64,
}

/// Everything one adapter collected in a single run.
#[derive(Debug, Default)]
pub struct AdapterRun {
    pub observations: Vec<RawObservation>,
    /// Items dropped inside the adapter (404 stores, malformed products)
    pub dropped: usize,
}

impl AdapterRun {
    pub fn merge(&mut self, other: AdapterRun) {
        self.observations.extend(other.observations);
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("upstream schema changed: {0}")]
    SchemaChanged(String),
}

impl AdapterError {
    /// Whether the error should abort the whole chain rather than one item.
    pub fn is_systemic(&self) -> bool {
        match self {
            AdapterError::Http(e) => e.is_systemic(),
            AdapterError::SchemaChanged(_) => true,
            AdapterError::Parse(_) => false,
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short chain code (`DP`, `PH`, `PP`)
    fn chain_key(&self) -> &'static str;

    /// Inch table used when normalizing this chain's size labels
    fn vocabulary(&self) -> Vocabulary;

    /// Discover stores and collect every priced variant.
    ///
    /// Returns `Err` only for systemic failures; a chain that errors
    /// contributes no rows at all.
    async fn collect(&self) -> Result<AdapterRun, AdapterError>;
}

/// Swallow an item-scoped failure, propagate a systemic one.
///
/// Returns `Ok(None)` when the item was dropped.
pub fn absorb<T, E>(chain: &str, what: &str, result: Result<T, E>) -> Result<Option<T>, AdapterError>
where
    E: Into<AdapterError>,
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let error = e.into();
            if error.is_systemic() {
                log::error!("❌ [{}] {} failed systemically: {}", chain, what, error);
                Err(error)
            } else {
                match &error {
                    AdapterError::Http(HttpError::NotFound { .. }) => {
                        log::debug!("[{}] {} not available: {}", chain, what, error)
                    }
                    _ => log::warn!("⚠️  [{}] dropping {}: {}", chain, what, error),
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_scopes() {
        let missing: Result<u32, HttpError> = Err(HttpError::NotFound {
            url: "u".into(),
            status: 404,
        });
        assert!(matches!(absorb("DP", "store 1", missing), Ok(None)));

        let auth: Result<u32, HttpError> = Err(HttpError::Unauthorized {
            url: "u".into(),
            status: 401,
        });
        assert!(absorb("PP", "store 1", auth).is_err());

        let ok: Result<u32, AdapterError> = Ok(7);
        assert_eq!(absorb("PH", "hut", ok).unwrap(), Some(7));

        let schema: Result<u32, AdapterError> = Err(AdapterError::SchemaChanged("no stores".into()));
        assert!(absorb("DP", "store list", schema).is_err());
    }

    #[test]
    fn test_merge_runs() {
        let mut run = AdapterRun::default();
        run.merge(AdapterRun {
            observations: Vec::new(),
            dropped: 2,
        });
        run.merge(AdapterRun {
            observations: Vec::new(),
            dropped: 1,
        });
        assert_eq!(run.dropped, 3);
    }
}
