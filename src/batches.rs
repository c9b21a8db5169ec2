//! Snapshot selection and per-batch row fetching.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::row::GiftCardRow;
use crate::source::GiftCardSource;

/// Known batch identifiers plus the one being displayed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BatchSelection {
    pub batches: Vec<String>,
    pub active: Option<String>,
}

impl BatchSelection {
    /// An explicit, non-blank request wins even when it is not in the known
    /// list; otherwise the newest batch is active.
    pub fn new(batches: Vec<String>, requested: Option<&str>) -> Self {
        let active = requested
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(str::to_string)
            .or_else(|| batches.first().cloned());
        Self { batches, active }
    }
}

/// Drops repeated identifiers, keeping the first occurrence's position.
pub fn dedupe_batch_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

pub struct SnapshotSelector {
    source: Arc<dyn GiftCardSource>,
}

impl SnapshotSelector {
    pub fn new(source: Arc<dyn GiftCardSource>) -> Self {
        Self { source }
    }

    /// Distinct batch ids, newest first. Failures collapse to an empty list.
    pub fn load(&self) -> Vec<String> {
        match self.source.batch_ids() {
            Ok(ids) => {
                let batches = dedupe_batch_ids(ids);
                if batches.is_empty() {
                    info!(component = "batches", event = "batches.fetch.empty");
                }
                batches
            }
            Err(err) => {
                warn!(
                    component = "batches",
                    event = "batches.fetch.error",
                    error = %err
                );
                Vec::new()
            }
        }
    }

    pub fn select(&self, requested: Option<&str>) -> BatchSelection {
        BatchSelection::new(self.load(), requested)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Committed,
    /// A newer fetch started before this one finished; its rows were not
    /// stored.
    Superseded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowFetch {
    pub batch_id: String,
    pub rows: Arc<Vec<GiftCardRow>>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone)]
struct LoadedBatch {
    batch_id: String,
    rows: Arc<Vec<GiftCardRow>>,
}

/// Fetches the rows of one batch on every call and tracks the row set most
/// recently committed.
///
/// Each fetch takes a ticket; only the holder of the newest ticket may
/// replace the committed rows, so a slow request for a batch the user has
/// already navigated away from can never overwrite newer rows.
pub struct RowFetcher {
    source: Arc<dyn GiftCardSource>,
    latest_ticket: AtomicU64,
    loaded: RwLock<Option<LoadedBatch>>,
}

impl RowFetcher {
    pub fn new(source: Arc<dyn GiftCardSource>) -> Self {
        Self {
            source,
            latest_ticket: AtomicU64::new(0),
            loaded: RwLock::new(None),
        }
    }

    pub fn fetch(&self, batch_id: &str) -> RowFetch {
        let ticket = self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.source.rows_for_batch(batch_id);

        let mut loaded = self
            .loaded
            .write()
            .expect("committed rows lock should not be poisoned");
        let is_latest = self.latest_ticket.load(Ordering::SeqCst) == ticket;

        match result {
            Ok(rows) => {
                let rows = Arc::new(rows);
                let outcome = if is_latest {
                    *loaded = Some(LoadedBatch {
                        batch_id: batch_id.to_string(),
                        rows: Arc::clone(&rows),
                    });
                    debug!(
                        component = "rows",
                        event = "rows.fetch.ok",
                        batch_id,
                        row_count = rows.len()
                    );
                    FetchOutcome::Committed
                } else {
                    info!(
                        component = "rows",
                        event = "rows.fetch.superseded",
                        batch_id,
                        ticket
                    );
                    FetchOutcome::Superseded
                };
                RowFetch {
                    batch_id: batch_id.to_string(),
                    rows,
                    outcome,
                }
            }
            Err(err) => {
                warn!(
                    component = "rows",
                    event = "rows.fetch.error",
                    batch_id,
                    error = %err
                );
                if is_latest {
                    *loaded = None;
                }
                RowFetch {
                    batch_id: batch_id.to_string(),
                    rows: Arc::new(Vec::new()),
                    outcome: FetchOutcome::Failed,
                }
            }
        }
    }

    /// Batch id and rows of the last committed fetch.
    pub fn current(&self) -> Option<(String, Arc<Vec<GiftCardRow>>)> {
        self.loaded
            .read()
            .expect("committed rows lock should not be poisoned")
            .as_ref()
            .map(|loaded| (loaded.batch_id.clone(), Arc::clone(&loaded.rows)))
    }
}
