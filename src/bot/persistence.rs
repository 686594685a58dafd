use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, error, info, warn};

use crate::{
    bot::metrics::CycleMetrics,
    database::{append_with_retry, OpportunityStore},
    types::Opportunity,
};

/// Batches still queued at shutdown get this long to land.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Background writer for ranked batches. The cycle hands a batch over and
/// moves on; a stalled store only grows this task's backlog.
pub struct PersistenceWriter {
    tx: mpsc::Sender<Vec<Opportunity>>,
    worker: JoinHandle<()>,
}

impl PersistenceWriter {
    pub fn spawn(store: Arc<dyn OpportunityStore>, metrics: Arc<RwLock<CycleMetrics>>, backlog: usize) -> Self {
        let (tx, rx) = mpsc::channel(backlog.max(1));
        let worker = tokio::spawn(write_batches(store, metrics, rx));
        Self { tx, worker }
    }

    /// Queues the batch without waiting. When the backlog is full the batch
    /// is dropped and its size returned.
    pub fn submit(&self, batch: Vec<Opportunity>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        match self.tx.try_send(batch) {
            Ok(()) => 0,
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!("Persistence backlog full, dropping {} opportunities", batch.len());
                batch.len()
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                error!("Persistence writer is gone, dropping {} opportunities", batch.len());
                batch.len()
            }
        }
    }

    /// Closes the queue and waits a bounded time for queued batches.
    pub async fn shutdown(self) {
        let Self { tx, mut worker } = self;
        drop(tx);

        if timeout(DRAIN_TIMEOUT, &mut worker).await.is_err() {
            warn!("Persistence writer did not drain in {}s, aborting", DRAIN_TIMEOUT.as_secs());
            worker.abort();
        }
    }
}

async fn write_batches(
    store: Arc<dyn OpportunityStore>,
    metrics: Arc<RwLock<CycleMetrics>>,
    mut rx: mpsc::Receiver<Vec<Opportunity>>,
) {
    while let Some(batch) = rx.recv().await {
        let mut failures = 0;
        for opportunity in &batch {
            if append_with_retry(store.as_ref(), opportunity).await.is_err() {
                failures += 1;
            }
        }

        if failures > 0 {
            metrics
                .write()
                .await
                .record_error(&format!("{} of {} opportunities not persisted", failures, batch.len()));
        } else {
            debug!("Persisted {} opportunities", batch.len());
        }
    }
    info!("Persistence writer stopped");
}
