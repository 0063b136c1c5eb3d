//! Device watcher: turns platform hotplug notifications into ingestion work.
//!
//! On attach it waits for the settle delay (USB attach events arrive before
//! the OS has enumerated and mounted the disk), re-enumerates, and queues
//! every newly appeared drive that has a registered profile. A fixed-interval
//! refresh publishes the full drive list for status consumers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::core::hardware::{DeviceHandle, DriveRecord, HardwareAdapter, HardwareEvent};
use crate::core::inventory::{DriveInventory, DriveSnapshot};
use crate::core::queue::IngestQueue;
use crate::core::registry::Registry;

const EVENT_BUS_CAPACITY: usize = 64;

/// Notifications published by the watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Periodic full inventory.
    DrivesChanged(DriveSnapshot),
    DeviceAttached(DeviceHandle),
    /// Newly attached drives that have an ingestion profile.
    DevicesMatched(Vec<String>),
    DeviceDetached(DeviceHandle),
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
}

impl From<&AppConfig> for WatcherConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }
}

/// State shared with the per-attach tasks.
#[derive(Clone)]
struct Matcher {
    inventory: DriveInventory,
    registry: Arc<dyn Registry>,
    queue: IngestQueue,
    events: broadcast::Sender<WatchEvent>,
}

impl Matcher {
    /// Serials that appeared since `previous` and have a registered profile,
    /// in inventory order.
    async fn match_new_drives(&self, previous: &HashSet<String>) -> Vec<String> {
        let current = self.inventory.refresh_or_current().await;
        let added: Vec<&DriveRecord> = current
            .iter()
            .filter(|d| !previous.contains(&d.serial))
            .collect();

        if added.is_empty() {
            debug!("No new drives after attach");
            return Vec::new();
        }

        let registered: HashSet<String> = match self.registry.profiles().await {
            Ok(profiles) => profiles.into_iter().map(|p| p.serial).collect(),
            Err(e) => {
                warn!(error = %e, "Profile lookup failed, treating attach as unmatched");
                return Vec::new();
            }
        };

        added
            .into_iter()
            .filter(|d| registered.contains(&d.serial))
            .map(|d| d.serial.clone())
            .collect()
    }

    async fn settle_and_match(&self, previous: HashSet<String>, settle_delay: Duration) {
        tokio::time::sleep(settle_delay).await;

        let matched = self.match_new_drives(&previous).await;
        if matched.is_empty() {
            info!("No new ingestion devices detected");
            return;
        }

        info!(devices = %matched.join(", "), "Detected ingestion devices");
        let _ = self.events.send(WatchEvent::DevicesMatched(matched.clone()));
        self.queue.enqueue_all(&matched).await;
    }
}

pub struct DeviceWatcher {
    adapter: Arc<dyn HardwareAdapter>,
    matcher: Matcher,
    config: WatcherConfig,
}

impl DeviceWatcher {
    pub fn new(
        adapter: Arc<dyn HardwareAdapter>,
        inventory: DriveInventory,
        registry: Arc<dyn Registry>,
        queue: IngestQueue,
        config: WatcherConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            adapter,
            matcher: Matcher {
                inventory,
                registry,
                queue,
                events,
            },
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.matcher.events.subscribe()
    }

    /// Listen for hardware events until `cancel` fires, then deregister the
    /// platform subscription.
    ///
    /// Drives already connected when this is called are the baseline and are
    /// never matched. The first `DrivesChanged` is published once the adapter
    /// is listening.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        // Baseline first: an attach delivered before it would otherwise be
        // diffed against a snapshot that already contains the new drive.
        if let Err(e) = self.matcher.inventory.refresh().await {
            warn!(error = %e, "Initial drive enumeration failed");
        }

        let (tx, mut rx) = mpsc::channel(32);
        self.adapter.start(tx);
        info!("Device watcher started");

        let baseline = self.matcher.inventory.current().await;
        let _ = self.matcher.events.send(WatchEvent::DrivesChanged(baseline));

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.handle_hardware_event(event).await,
                    None => {
                        warn!("Hardware event channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.publish_drives().await,
            }
        }

        self.adapter.stop();
        info!("Device watcher stopped, hardware listeners cleared");
        Ok(())
    }

    async fn handle_hardware_event(&self, event: HardwareEvent) {
        match event {
            HardwareEvent::Attached(handle) => self.handle_attached(handle).await,
            HardwareEvent::Detached(handle) => self.handle_detached(handle).await,
        }
    }

    async fn handle_attached(&self, handle: DeviceHandle) {
        debug!(device = %handle, "Device attached");

        // Snapshot before settling so drives enumerated meanwhile still count as new.
        let previous: HashSet<String> = self
            .matcher
            .inventory
            .current()
            .await
            .iter()
            .map(|d| d.serial.clone())
            .collect();

        let _ = self.matcher.events.send(WatchEvent::DeviceAttached(handle));

        let matcher = self.matcher.clone();
        let settle_delay = self.config.settle_delay;
        tokio::spawn(async move { matcher.settle_and_match(previous, settle_delay).await });
    }

    async fn handle_detached(&self, handle: DeviceHandle) {
        debug!(device = %handle, "Device detached");

        if let Err(e) = self.matcher.inventory.refresh().await {
            warn!(error = %e, "Drive enumeration after detach failed");
        }
        let _ = self.matcher.events.send(WatchEvent::DeviceDetached(handle));
    }

    async fn publish_drives(&self) {
        let drives = self.matcher.inventory.refresh_or_current().await;
        let _ = self.matcher.events.send(WatchEvent::DrivesChanged(drives));
    }
}
