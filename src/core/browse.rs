//! Top-level listing of a connected drive's source volume.

use std::path::Path;

use serde::Serialize;

use super::error::BrowseError;
use super::ingestion::select_source_root;
use super::inventory::DriveInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowseEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// List the entries at the root of the volume an ingestion run would copy
/// from, sorted by name.
pub async fn browse_drive(
    inventory: &DriveInventory,
    serial: &str,
    boot_volume_label: &str,
) -> Result<Vec<BrowseEntry>, BrowseError> {
    let drive = inventory
        .drive_by_serial(serial)
        .await
        .ok_or_else(|| BrowseError::DeviceNotConnected(serial.to_string()))?;

    let mount = select_source_root(&drive.mount_points, boot_volume_label)
        .ok_or_else(|| BrowseError::NoMountPoints(serial.to_string()))?;

    list_dir(&mount.path).await
}

async fn list_dir(path: &Path) -> Result<Vec<BrowseEntry>, BrowseError> {
    let io_err = |source| BrowseError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut dir = tokio::fs::read_dir(path).await.map_err(io_err)?;
    let mut entries = Vec::new();

    while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
        let file_type = entry.file_type().await.map_err(io_err)?;
        let kind = if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else {
            EntryKind::Other
        };

        entries.push(BrowseEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}
