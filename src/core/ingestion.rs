//! Ingestion engine: copies a device's primary volume into the destination
//! tree with checksum-based change detection and archive-on-change.

pub mod checksum;
pub mod versioned_copy;
pub mod walk;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{Instrument, info, info_span, warn};

use crate::config::AppConfig;
use crate::core::error::IngestError;
use crate::core::hardware::MountPoint;
use crate::core::inventory::DriveInventory;
use crate::core::models::IngestionActionRecord;
use crate::core::progress::ProgressTracker;
use crate::core::queue::IngestRunner;
use crate::core::registry::Registry;
use crate::logging::LogThrottle;

use versioned_copy::{CopyRoots, FileOutcome, ProgressReporter};
use walk::{TreeWalk, WalkEntry};

/// Minimum interval between info-level progress lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub destination_root: PathBuf,
    pub archive_root: PathBuf,
    /// Volumes with this label are never used as the source root.
    pub boot_volume_label: String,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            destination_root: config.destination_root.clone(),
            archive_root: config.archive_root.clone(),
            boot_volume_label: config.boot_volume_label.clone(),
        }
    }
}

/// Totals for one completed device run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub directories: u64,
    pub files_copied: u64,
    pub files_unchanged: u64,
    pub files_archived: u64,
    pub bytes_copied: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Completed(IngestReport),
    /// The device is not in the current inventory.
    DeviceNotConnected,
    /// The device has no usable mount point (not mounted yet, or gone).
    NoMountPoints,
}

pub struct IngestionEngine {
    inventory: DriveInventory,
    registry: Arc<dyn Registry>,
    progress: ProgressTracker,
    config: EngineConfig,
}

impl IngestionEngine {
    pub fn new(
        inventory: DriveInventory,
        registry: Arc<dyn Registry>,
        progress: ProgressTracker,
        config: EngineConfig,
    ) -> Self {
        Self {
            inventory,
            registry,
            progress,
            config,
        }
    }

    /// Ingest one device.
    ///
    /// Missing devices and mount points end the run with an outcome rather
    /// than an error. Errors come only from the copy itself and leave files
    /// copied so far in place.
    pub async fn run(&self, serial: &str) -> Result<IngestOutcome, IngestError> {
        let span = info_span!("ingestion_run", serial = %serial);

        async {
            info!("Running ingestion");

            let Some(drive) = self.inventory.drive_by_serial(serial).await else {
                warn!("Device not connected, aborting ingestion");
                return Ok(IngestOutcome::DeviceNotConnected);
            };

            let Some(mount) =
                select_source_root(&drive.mount_points, &self.config.boot_volume_label)
            else {
                warn!("Device has no usable mount point, aborting ingestion");
                return Ok(IngestOutcome::NoMountPoints);
            };

            let roots = CopyRoots {
                source: mount.path.clone(),
                destination: self.config.destination_root.clone(),
                archive: self.config.archive_root.clone(),
            };

            let result = self.copy_tree(serial, &roots).await;
            self.progress.remove(serial).await;
            result.map(IngestOutcome::Completed)
        }
        .instrument(span)
        .await
    }

    /// Walk `roots.source` and ingest every regular file, writing one audit
    /// record per file actually copied.
    pub async fn copy_tree(
        &self,
        serial: &str,
        roots: &CopyRoots,
    ) -> Result<IngestReport, IngestError> {
        let start_time = Instant::now();
        info!(
            source = %roots.source.display(),
            destination = %roots.destination.display(),
            "Starting versioned copy"
        );

        versioned_copy::mirror_dir(roots, std::path::Path::new("")).await?;

        let reporter = ProgressReporter::new(
            serial,
            &self.progress,
            LogThrottle::new(PROGRESS_LOG_INTERVAL),
        );
        let mut report = IngestReport::default();
        let mut walk = TreeWalk::new(&roots.source);

        while let Some(entry) = walk.next().await {
            match entry? {
                WalkEntry::Dir(relative) => {
                    versioned_copy::mirror_dir(roots, &relative).await?;
                    report.directories += 1;
                }
                WalkEntry::File(relative) => {
                    info!(file = %relative.display(), "Processing file");

                    match versioned_copy::ingest_file(roots, &relative, &reporter).await? {
                        FileOutcome::Unchanged => report.files_unchanged += 1,
                        FileOutcome::Copied {
                            size,
                            checksum,
                            archived,
                        } => {
                            let filename = roots.source.join(&relative);
                            info!(file = %filename.display(), size, "Copy complete");

                            self.registry
                                .append_action(IngestionActionRecord {
                                    device_serial: serial.to_string(),
                                    filename,
                                    file_size: size,
                                    checksum,
                                })
                                .await
                                .map_err(IngestError::Registry)?;

                            report.files_copied += 1;
                            report.bytes_copied += size;
                            if archived {
                                report.files_archived += 1;
                            }
                        }
                    }
                }
            }
        }

        info!(
            files_copied = report.files_copied,
            files_unchanged = report.files_unchanged,
            files_archived = report.files_archived,
            total_bytes = report.bytes_copied,
            duration_secs = start_time.elapsed().as_secs(),
            "Ingestion complete"
        );

        Ok(report)
    }
}

#[async_trait]
impl IngestRunner for IngestionEngine {
    async fn run(&self, serial: &str) -> anyhow::Result<()> {
        match IngestionEngine::run(self, serial).await? {
            IngestOutcome::Completed(_) => {}
            outcome => info!(serial = %serial, ?outcome, "Ingestion ended without copying"),
        }
        Ok(())
    }
}

/// First mount point that is not the boot/EFI volume.
pub fn select_source_root<'a>(
    mount_points: &'a [MountPoint],
    boot_volume_label: &str,
) -> Option<&'a MountPoint> {
    mount_points
        .iter()
        .find(|m| m.label.as_deref() != Some(boot_volume_label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(path: &str, label: Option<&str>) -> MountPoint {
        MountPoint {
            path: PathBuf::from(path),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn skips_boot_volume() {
        let mounts = vec![mount("/boot/efi", Some("EFI")), mount("/media/card", Some("CARD"))];
        let selected = select_source_root(&mounts, "EFI").unwrap();
        assert_eq!(selected.path, PathBuf::from("/media/card"));
    }

    #[test]
    fn unlabelled_volume_is_eligible() {
        let mounts = vec![mount("/media/usb", None)];
        assert!(select_source_root(&mounts, "EFI").is_some());
    }

    #[test]
    fn only_boot_volume_means_no_source() {
        let mounts = vec![mount("/boot/efi", Some("EFI"))];
        assert!(select_source_root(&mounts, "EFI").is_none());
        assert!(select_source_root(&[], "EFI").is_none());
    }
}
