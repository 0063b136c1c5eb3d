use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::core::hardware::HardwareAdapter;
use crate::core::ingestion::{EngineConfig, IngestionEngine};
use crate::core::inventory::DriveInventory;
use crate::core::queue::IngestQueue;
use crate::core::watcher::{DeviceWatcher, WatchEvent, WatcherConfig};

/// Wires the watcher, queue and engine together and runs them until a
/// shutdown signal arrives.
pub struct Orchestrator {
    ctx: AppContext,
    adapter: Arc<dyn HardwareAdapter>,
}

impl Orchestrator {
    pub fn new(ctx: AppContext, adapter: Arc<dyn HardwareAdapter>) -> Self {
        Self { ctx, adapter }
    }

    pub async fn start(&self) -> Result<()> {
        info!(
            destination = %self.ctx.config.destination_root.display(),
            archive = %self.ctx.config.archive_root.display(),
            "Ingestion daemon starting"
        );

        let cancel = CancellationToken::new();
        let inventory = DriveInventory::new(self.adapter.clone());

        let engine = Arc::new(IngestionEngine::new(
            inventory.clone(),
            self.ctx.registry.clone(),
            self.ctx.progress.clone(),
            EngineConfig::from(self.ctx.config.as_ref()),
        ));
        let (queue, worker) = IngestQueue::start(engine, cancel.child_token());

        let watcher = DeviceWatcher::new(
            self.adapter.clone(),
            inventory,
            self.ctx.registry.clone(),
            queue,
            WatcherConfig::from(self.ctx.config.as_ref()),
        );
        tokio::spawn(log_watch_events(watcher.subscribe()));
        let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

        let signal = wait_for_shutdown().await?;
        info!(?signal, "Shutting down");
        cancel.cancel();

        watcher_task.await.context("Device watcher task failed")??;

        if self.ctx.progress.active_count().await > 0 {
            info!("Waiting for the in-progress ingestion to finish");
        }
        worker.await.context("Ingestion queue task failed")?;

        Ok(())
    }
}

async fn log_watch_events(mut events: broadcast::Receiver<WatchEvent>) {
    loop {
        match events.recv().await {
            Ok(WatchEvent::DrivesChanged(drives)) => {
                debug!(count = drives.len(), "Connected drives updated");
            }
            Ok(WatchEvent::DeviceAttached(handle)) => info!(device = %handle, "Device attached"),
            Ok(WatchEvent::DevicesMatched(serials)) => {
                info!(devices = ?serials, "Queued ingestion devices");
            }
            Ok(WatchEvent::DeviceDetached(handle)) => info!(device = %handle, "Device detached"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Watch event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ShutdownSignal {
    Sigint,
    Sigterm,
}

async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => Ok(ShutdownSignal::Sigint),
        _ = sigterm.recv() => Ok(ShutdownSignal::Sigterm),
    }
}
