//! Acquisition runtime: adapters → channel → normalizer → emitter
//!
//! Every adapter runs as its own task. A chain only forwards observations
//! after its `collect` succeeded, so a chain that fails systemically
//! contributes zero rows and shows up in the report with its error.
//! Observations reach the single emitter through a bounded channel, which
//! applies backpressure to the adapters while the sink is slow.

use crate::scraper_core::config::{BackendType, RuntimeConfig};
use crate::scraper_core::dominos::DominosAdapter;
use crate::scraper_core::pizza_hut::PizzaHutAdapter;
use crate::scraper_core::pizza_pizza::PizzaPizzaAdapter;
use crate::scraper_core::{
    AdapterError, CsvRawWriter, EmitError, NormalizeError, Normalizer, RawObservation, RawSink, SourceAdapter,
    SqliteRawWriter, UnifiedRecordEmitter,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

enum AdapterEvent {
    Observation(&'static str, RawObservation),
    Finished {
        chain_key: &'static str,
        dropped: usize,
        error: Option<String>,
    },
}

/// Per-chain result of one acquisition run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    pub emitted: u64,
    /// Items the adapter itself dropped (404 stores, malformed products)
    pub dropped_in_adapter: usize,
    /// Observations with a size or crust label missing from the vocabulary
    pub unmapped: usize,
    /// Observations rejected by the normalizer or the emitter
    pub invalid: usize,
    /// Systemic failure that aborted the chain
    pub error: Option<String>,
}

impl ChainOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionReport {
    pub chains: BTreeMap<String, ChainOutcome>,
}

impl AcquisitionReport {
    pub fn total_emitted(&self) -> u64 {
        self.chains.values().map(|c| c.emitted).sum()
    }

    /// True when at least one chain ran and every chain failed.
    pub fn all_failed(&self) -> bool {
        !self.chains.is_empty() && self.chains.values().all(ChainOutcome::failed)
    }

    pub fn log_summary(&self) {
        log::info!("📊 Acquisition summary ({} rows emitted)", self.total_emitted());
        for (chain, outcome) in &self.chains {
            match &outcome.error {
                Some(error) => log::error!("   ❌ {}: failed, 0 rows ({})", chain, error),
                None => log::info!(
                    "   ✅ {}: {} rows, {} dropped in adapter, {} unmapped, {} invalid",
                    chain,
                    outcome.emitted,
                    outcome.dropped_in_adapter,
                    outcome.unmapped,
                    outcome.invalid
                ),
            }
        }
    }
}

/// Build the adapters enabled in the configuration.
pub fn adapters_from_config(config: &RuntimeConfig) -> Result<Vec<Arc<dyn SourceAdapter>>, AdapterError> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if let Some(dominos) = &config.dominos {
        adapters.push(Arc::new(DominosAdapter::new(dominos.clone(), config.request_timeout)?));
    }
    if let Some(pizza_hut) = &config.pizza_hut {
        adapters.push(Arc::new(PizzaHutAdapter::new(pizza_hut.clone(), config.request_timeout)?));
    }
    if let Some(pizza_pizza) = &config.pizza_pizza {
        adapters.push(Arc::new(PizzaPizzaAdapter::new(pizza_pizza.clone(), config.request_timeout)?));
    }

    Ok(adapters)
}

/// Open the raw sink selected by `MENUFLOW_RAW_BACKEND`.
pub fn make_sink(config: &RuntimeConfig) -> Result<Box<dyn RawSink>, EmitError> {
    let sink: Box<dyn RawSink> = match config.backend {
        BackendType::Csv => Box::new(CsvRawWriter::new(&config.raw_dir)?),
        BackendType::Sqlite => {
            if let Some(parent) = config.raw_db.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Box::new(SqliteRawWriter::new(&config.raw_db)?)
        }
    };
    log::info!("📥 Raw sink: {}", sink.backend_type());
    Ok(sink)
}

/// Run every adapter concurrently and emit what they collect.
///
/// Returns `Err` only when the sink itself fails; chain failures are
/// recorded in the report.
pub async fn run_acquisition(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    emitter: &mut UnifiedRecordEmitter,
    channel_buffer: usize,
) -> Result<AcquisitionReport, EmitError> {
    let (tx, mut rx) = mpsc::channel::<AdapterEvent>(channel_buffer.max(1));

    let mut report = AcquisitionReport::default();
    let mut normalizers: HashMap<&'static str, Normalizer> = HashMap::new();
    let mut handles = Vec::with_capacity(adapters.len());

    for adapter in adapters {
        let chain_key = adapter.chain_key();
        normalizers.insert(chain_key, Normalizer::new(chain_key, adapter.vocabulary()));
        report.chains.insert(chain_key.to_string(), ChainOutcome::default());

        let tx = tx.clone();
        let handle = tokio::spawn(async move {
            log::info!("🍕 [{}] Starting collection", chain_key);
            let finished = match adapter.collect().await {
                Ok(run) => {
                    log::info!("📡 [{}] Collected {} observations", chain_key, run.observations.len());
                    for observation in run.observations {
                        if tx.send(AdapterEvent::Observation(chain_key, observation)).await.is_err() {
                            log::warn!("⚠️  [{}] Emitter gone, stopping", chain_key);
                            return;
                        }
                    }
                    AdapterEvent::Finished {
                        chain_key,
                        dropped: run.dropped,
                        error: None,
                    }
                }
                Err(e) => {
                    log::error!("❌ [{}] Collection aborted: {}", chain_key, e);
                    AdapterEvent::Finished {
                        chain_key,
                        dropped: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            let _ = tx.send(finished).await;
        });
        handles.push((chain_key, handle));
    }
    drop(tx);

    let mut finished = HashSet::new();
    while let Some(event) = rx.recv().await {
        match event {
            AdapterEvent::Observation(chain_key, observation) => {
                let Some(normalizer) = normalizers.get(chain_key) else {
                    continue;
                };
                let outcome = report.chains.entry(chain_key.to_string()).or_default();

                let normalized = match normalizer.normalize(&observation) {
                    Ok(normalized) => normalized,
                    Err(e @ NormalizeError::UnmappedToken { .. }) => {
                        log::error!("❌ {} ({} at {})", e, observation.recipe, observation.store_key);
                        outcome.unmapped += 1;
                        continue;
                    }
                    Err(e) => {
                        log::warn!("⚠️  {} ({})", e, observation.store_key);
                        outcome.invalid += 1;
                        continue;
                    }
                };

                match emitter.emit(&normalized).await {
                    Ok(()) => outcome.emitted += 1,
                    Err(EmitError::InvalidRecord(reason)) => {
                        log::warn!("⚠️  Invalid record dropped: {}", reason);
                        outcome.invalid += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            AdapterEvent::Finished {
                chain_key,
                dropped,
                error,
            } => {
                let outcome = report.chains.entry(chain_key.to_string()).or_default();
                outcome.dropped_in_adapter = dropped;
                outcome.error = error;
                finished.insert(chain_key);
            }
        }
    }

    emitter.flush().await?;

    for (chain_key, handle) in handles {
        if let Err(e) = handle.await {
            log::error!("❌ [{}] Adapter task failed: {}", chain_key, e);
            if !finished.contains(chain_key) {
                if let Some(outcome) = report.chains.get_mut(chain_key) {
                    outcome.error = Some(format!("adapter task failed: {}", e));
                }
            }
        }
    }

    Ok(report)
}
