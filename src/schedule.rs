//! Trigger surface: sync followed by an indexing pass, on start-up and on a
//! fixed interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use crate::pipeline::{Indexer, PassReport};
use crate::source::SyncService;
use crate::storage::Catalog;

pub struct Pipeline {
    catalog: Arc<Catalog>,
    sync: SyncService,
    indexer: Indexer,
}

impl Pipeline {
    pub fn new(sync: SyncService, indexer: Indexer) -> Self {
        Self {
            catalog: Arc::clone(indexer.catalog()),
            sync,
            indexer,
        }
    }

    /// Refresh the catalog. Failures are logged by the sync service.
    pub fn sync(&self) {
        let _ = self.sync.run(&self.catalog);
    }

    /// Index whatever is pending. `None` if a pass was already running.
    pub fn index(&self) -> Option<crate::Result<PassReport>> {
        self.indexer.run()
    }

    /// One full trigger; blocks until the pass ends. A failed sync still
    /// lets the pass run over what the catalog already holds.
    pub fn trigger(&self) -> Option<crate::Result<PassReport>> {
        self.sync();
        self.index()
    }
}

/// Run a trigger on the blocking pool without waiting for it
pub fn spawn_trigger(pipeline: &Arc<Pipeline>) -> JoinHandle<()> {
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || {
        if pipeline.trigger().is_none() {
            tracing::debug!("Pass already running, trigger coalesced");
        }
    })
}

/// Fire a trigger every `interval`, starting one interval from now, until
/// `cancel` fires. Ticks missed during a long pass are skipped.
pub fn spawn_schedule(pipeline: Arc<Pipeline>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tracing::info!("Scheduled sync and index starting");
                    spawn_trigger(&pipeline);
                }
            }
        }
        tracing::debug!("Scheduler stopped");
    })
}
