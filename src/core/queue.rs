//! Serialized ingestion queue.
//!
//! Device serials wait in a FIFO pending list with no duplicates. A single
//! worker task drains it, so at most one ingestion run is active at a time.
//! De-duplication only looks at the pending list: a serial that is currently
//! being ingested can be queued again and will run a second time once the
//! first run finishes.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Something that ingests one device. Implemented by the ingestion engine.
#[async_trait]
pub trait IngestRunner: Send + Sync {
    async fn run(&self, serial: &str) -> anyhow::Result<()>;
}

/// FIFO of serials waiting to be ingested.
#[derive(Debug, Default, Clone)]
pub struct PendingList {
    items: VecDeque<String>,
}

impl PendingList {
    /// Append `serial` unless it is already pending. Returns whether it was added.
    pub fn push(&mut self, serial: &str) -> bool {
        if self.contains(serial) {
            return false;
        }
        self.items.push_back(serial.to_string());
        true
    }

    /// Drop a pending serial. Returns whether it was present.
    pub fn remove(&mut self, serial: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|s| s != serial);
        self.items.len() != before
    }

    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.items.iter().any(|s| s == serial)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.items.iter().cloned().collect()
    }
}

#[derive(Default)]
struct QueueState {
    pending: PendingList,
    in_progress: Option<String>,
}

/// Handle to the ingestion queue. Cheap to clone.
#[derive(Clone)]
pub struct IngestQueue {
    state: Arc<Mutex<QueueState>>,
    wake: Arc<Notify>,
}

impl IngestQueue {
    /// Create the queue and spawn its worker. The worker exits when `cancel`
    /// fires, after any in-progress run has finished.
    pub fn start(
        runner: Arc<dyn IngestRunner>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let queue = Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            wake: Arc::new(Notify::new()),
        };

        let worker = tokio::spawn(queue.clone().drain(runner, cancel));
        (queue, worker)
    }

    /// Queue one device. No-op if it is already pending.
    pub async fn enqueue(&self, serial: &str) -> bool {
        let added = self.state.lock().await.pending.push(serial);
        if added {
            debug!(serial = %serial, "Queued for ingestion");
            self.wake.notify_one();
        } else {
            debug!(serial = %serial, "Already queued, ignoring");
        }
        added
    }

    /// Queue many devices in order. Returns how many were added.
    pub async fn enqueue_all<I, S>(&self, serials: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for serial in serials {
            if self.enqueue(serial.as_ref()).await {
                added += 1;
            }
        }
        added
    }

    /// Remove a device that has not started yet. A running ingestion is not
    /// affected.
    pub async fn cancel(&self, serial: &str) -> bool {
        let removed = self.state.lock().await.pending.remove(serial);
        if removed {
            info!(serial = %serial, "Removed from ingestion queue");
        }
        removed
    }

    pub async fn pending(&self) -> Vec<String> {
        self.state.lock().await.pending.to_vec()
    }

    pub async fn in_progress(&self) -> Option<String> {
        self.state.lock().await.in_progress.clone()
    }

    async fn drain(self, runner: Arc<dyn IngestRunner>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let next = {
                let mut state = self.state.lock().await;
                let next = state.pending.pop();
                state.in_progress = next.clone();
                next
            };

            let Some(serial) = next else {
                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = cancel.cancelled() => break,
                }
                continue;
            };

            info!(serial = %serial, "Started processing");

            // Run on its own task so a panic is contained like any other failure.
            let task = {
                let runner = runner.clone();
                let serial = serial.clone();
                tokio::spawn(async move { runner.run(&serial).await })
            };

            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(serial = %serial, error = %e, "Ingestion failed"),
                Err(e) => error!(serial = %serial, error = %e, "Ingestion task panicked"),
            }

            info!(serial = %serial, "Finished processing");
            self.state.lock().await.in_progress = None;
        }

        debug!("Ingestion queue worker stopped");
    }
}
