use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Platform handle for a device that raised a hotplug notification.
///
/// This is whatever the platform uses to name the device (a udev sysname on
/// Linux). It is not a drive serial: USB attach events fire before the block
/// device and its serial are enumerable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub String);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub enum HardwareEvent {
    Attached(DeviceHandle),
    Detached(DeviceHandle),
}

/// A filesystem path at which a drive's storage is accessible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub path: PathBuf,
    pub label: Option<String>,
}

/// A physical disk as seen by the last inventory refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveRecord {
    /// Platform device path, e.g. `/dev/sdb`.
    pub device: PathBuf,
    pub serial: String,
    pub size: u64,
    pub model: Option<String>,
    #[serde(default)]
    pub mount_points: Vec<MountPoint>,
}

pub trait HardwareAdapter: Send + Sync {
    /// Start listening for attach/detach notifications.
    /// Spawns internal tasks that send events to the provided channel.
    fn start(&self, event_sender: mpsc::Sender<HardwareEvent>);

    /// Deregister the notification subscription.
    fn stop(&self);

    /// Enumerate the physical drives currently connected.
    /// NOTE: may perform blocking I/O; call from a blocking context.
    fn list_drives(&self) -> anyhow::Result<Vec<DriveRecord>>;

    /// Query the mount table for one drive. Always a fresh query.
    /// NOTE: may perform blocking I/O; call from a blocking context.
    fn mount_points(&self, drive: &DriveRecord) -> anyhow::Result<Vec<MountPoint>>;
}
