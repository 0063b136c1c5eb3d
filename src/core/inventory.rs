//! Cached snapshot of the connected drives.
//!
//! `refresh` is the only writer. It swaps the whole snapshot in one step, so
//! readers always see either the previous or the new inventory, never a mix.
//! Refreshes are serialized, so a slow enumeration can never overwrite a
//! newer one. A failed refresh leaves the previous snapshot in place.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::InventoryError;
use super::hardware::{DriveRecord, HardwareAdapter, MountPoint};

pub type DriveSnapshot = Arc<Vec<DriveRecord>>;

#[derive(Clone)]
pub struct DriveInventory {
    adapter: Arc<dyn HardwareAdapter>,
    snapshot: Arc<RwLock<DriveSnapshot>>,
    // Held across enumerate-and-swap.
    refresh_lock: Arc<Mutex<()>>,
}

impl DriveInventory {
    pub fn new(adapter: Arc<dyn HardwareAdapter>) -> Self {
        Self {
            adapter,
            snapshot: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Re-enumerate drives and replace the cached snapshot.
    pub async fn refresh(&self) -> Result<DriveSnapshot, InventoryError> {
        let _guard = self.refresh_lock.lock().await;

        let adapter = self.adapter.clone();
        let drives = tokio::task::spawn_blocking(move || adapter.list_drives())
            .await?
            .map_err(InventoryError::Enumeration)?;

        debug!(count = drives.len(), "Drive inventory refreshed");

        let drives = Arc::new(drives);
        *self.snapshot.write().await = drives.clone();
        Ok(drives)
    }

    /// The last good snapshot. No I/O.
    pub async fn current(&self) -> DriveSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Refresh, falling back to the cached snapshot when enumeration fails.
    pub async fn refresh_or_current(&self) -> DriveSnapshot {
        match self.refresh().await {
            Ok(drives) => drives,
            Err(e) => {
                warn!(error = %e, "Drive enumeration failed, using last known inventory");
                self.current().await
            }
        }
    }

    /// Fresh mount table lookup for a drive. Errors are logged and reported
    /// as "no mount points", which is also the normal state of a drive that
    /// has not finished mounting.
    pub async fn resolve_mount_points(&self, drive: &DriveRecord) -> Vec<MountPoint> {
        let adapter = self.adapter.clone();
        let record = drive.clone();
        let result = tokio::task::spawn_blocking(move || adapter.mount_points(&record)).await;

        let err = match result {
            Ok(Ok(mount_points)) => return mount_points,
            Ok(Err(source)) => InventoryError::MountResolution {
                device: drive.device.clone(),
                source,
            },
            Err(join) => InventoryError::Join(join),
        };

        warn!(serial = %drive.serial, error = %err, "Treating drive as unmounted");
        Vec::new()
    }

    /// Find a drive by serial in a fresh inventory and resolve its mounts.
    /// Returns `None` when the drive is not connected.
    pub async fn drive_by_serial(&self, serial: &str) -> Option<DriveRecord> {
        let drives = self.refresh_or_current().await;
        let mut drive = drives.iter().find(|d| d.serial == serial)?.clone();
        drive.mount_points = self.resolve_mount_points(&drive).await;
        Some(drive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedAdapter;
    use crate::core::hardware::HardwareEvent;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// First enumeration is slow and sees the old drive; later ones are
    /// fast and see the new one.
    #[derive(Default)]
    struct SlowThenFast {
        calls: AtomicUsize,
    }

    impl HardwareAdapter for SlowThenFast {
        fn start(&self, _tx: mpsc::Sender<HardwareEvent>) {}

        fn stop(&self) {}

        fn list_drives(&self) -> anyhow::Result<Vec<DriveRecord>> {
            let serial = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(200));
                "OLD"
            } else {
                "NEW"
            };
            Ok(vec![DriveRecord {
                device: PathBuf::from("/dev/sdz"),
                serial: serial.to_string(),
                size: 0,
                model: None,
                mount_points: Vec::new(),
            }])
        }

        fn mount_points(&self, _drive: &DriveRecord) -> anyhow::Result<Vec<MountPoint>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn slow_refresh_does_not_overwrite_newer_one() {
        let inventory = DriveInventory::new(Arc::new(SlowThenFast::default()));

        let slow = tokio::spawn({
            let inventory = inventory.clone();
            async move { inventory.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        inventory.refresh().await.unwrap();
        slow.await.unwrap().unwrap();

        assert_eq!(inventory.current().await[0].serial, "NEW");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let (adapter, sim) = SimulatedAdapter::new();
        let inventory = DriveInventory::new(Arc::new(adapter));

        sim.add_drive("SER-1", PathBuf::from("/tmp/ser-1"));
        inventory.refresh().await.unwrap();
        assert_eq!(inventory.current().await.len(), 1);

        sim.add_drive("SER-2", PathBuf::from("/tmp/ser-2"));
        sim.fail_enumeration(true);
        assert!(matches!(
            inventory.refresh().await,
            Err(InventoryError::Enumeration(_))
        ));

        let current = inventory.current().await;
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].serial, "SER-1");
    }

    #[tokio::test]
    async fn mount_query_failure_yields_no_mount_points() {
        let (adapter, sim) = SimulatedAdapter::new();
        let inventory = DriveInventory::new(Arc::new(adapter));

        sim.add_drive("SER-1", PathBuf::from("/tmp/ser-1"));
        sim.fail_mount_queries(true);

        let drive = inventory.drive_by_serial("SER-1").await.unwrap();
        assert!(drive.mount_points.is_empty());
    }

    #[tokio::test]
    async fn unknown_serial_is_none() {
        let (adapter, _sim) = SimulatedAdapter::new();
        let inventory = DriveInventory::new(Arc::new(adapter));
        assert!(inventory.drive_by_serial("missing").await.is_none());
    }
}
