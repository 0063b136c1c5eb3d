use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::hardware::{
    DeviceHandle, DriveRecord, HardwareAdapter, HardwareEvent, MountPoint,
};

/// How long the monitor thread blocks in poll before re-checking cancellation.
const POLL_TIMEOUT_MS: u16 = 500;

/// Kernel block devices that are never removable media.
const IGNORED_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "md", "sr"];

#[derive(Debug, Clone)]
pub struct LinuxAdapterConfig {
    /// Mount table to consult, normally `/proc/self/mounts`.
    pub mounts_file: PathBuf,
}

impl Default for LinuxAdapterConfig {
    fn default() -> Self {
        Self {
            mounts_file: PathBuf::from("/proc/self/mounts"),
        }
    }
}

pub struct LinuxAdapter {
    config: LinuxAdapterConfig,
    cancel: CancellationToken,
}

impl LinuxAdapter {
    pub fn new(config: LinuxAdapterConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(LinuxAdapterConfig::default())
    }
}

impl HardwareAdapter for LinuxAdapter {
    fn start(&self, tx: mpsc::Sender<HardwareEvent>) {
        let cancel = self.cancel.clone();

        let spawned = std::thread::Builder::new()
            .name("udev-monitor".to_string())
            .spawn(move || {
                if let Err(e) = run_monitor(&tx, &cancel) {
                    error!(error = %e, "udev monitor stopped");
                }
            });

        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn udev monitor thread");
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn list_drives(&self) -> Result<Vec<DriveRecord>> {
        let mut enumerator = udev::Enumerator::new().context("Failed to create udev enumerator")?;
        enumerator.match_subsystem("block")?;
        enumerator.match_property("DEVTYPE", "disk")?;

        let mut drives = Vec::new();
        for device in enumerator.scan_devices()? {
            let sysname = device.sysname().to_string_lossy();
            if IGNORED_PREFIXES.iter().any(|p| sysname.starts_with(p)) {
                continue;
            }

            let Some(devnode) = device.devnode() else {
                continue;
            };

            let serial = property(&device, "ID_SERIAL_SHORT").or_else(|| property(&device, "ID_SERIAL"));
            let Some(serial) = serial else {
                debug!(device = %devnode.display(), "Skipping disk without serial");
                continue;
            };

            let sectors = device
                .attribute_value("size")
                .and_then(|v| v.to_str())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);

            drives.push(DriveRecord {
                device: devnode.to_path_buf(),
                serial,
                size: sectors * 512,
                model: property(&device, "ID_MODEL"),
                mount_points: Vec::new(),
            });
        }

        Ok(drives)
    }

    fn mount_points(&self, drive: &DriveRecord) -> Result<Vec<MountPoint>> {
        let labels = volume_labels(&drive.device)?;

        let table = std::fs::read_to_string(&self.config.mounts_file).with_context(|| {
            format!("Failed to read {}", self.config.mounts_file.display())
        })?;

        let mut mount_points = Vec::new();
        for (source, target) in parse_mount_table(&table) {
            if !source.starts_with("/dev/") {
                continue;
            }
            // Mount sources may be /dev/disk/by-* symlinks.
            let node = std::fs::canonicalize(&source).unwrap_or(source);
            if let Some(label) = labels.get(&node) {
                mount_points.push(MountPoint {
                    path: target,
                    label: label.clone(),
                });
            }
        }

        Ok(mount_points)
    }
}

fn run_monitor(tx: &mpsc::Sender<HardwareEvent>, cancel: &CancellationToken) -> Result<()> {
    let socket = udev::MonitorBuilder::new()?
        .match_subsystem_devtype("usb", "usb_device")?
        .listen()
        .context("Failed to listen on udev monitor")?;

    info!("udev monitor listening for USB attach/detach");

    while !cancel.is_cancelled() {
        let mut fds = [PollFd::new(socket.as_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
            Ok(0) => continue,
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e).context("poll on udev socket failed"),
        }

        for event in socket.iter() {
            let handle = DeviceHandle(event.sysname().to_string_lossy().into_owned());
            let hw_event = match event.event_type() {
                udev::EventType::Add => HardwareEvent::Attached(handle),
                udev::EventType::Remove => HardwareEvent::Detached(handle),
                _ => continue,
            };

            debug!(event = ?hw_event, "udev event");
            if tx.blocking_send(hw_event).is_err() {
                return Ok(());
            }
        }
    }

    info!("udev monitor deregistered");
    Ok(())
}

/// Device nodes of a disk and its partitions, mapped to their volume labels.
fn volume_labels(disk_node: &Path) -> Result<HashMap<PathBuf, Option<String>>> {
    let mut labels = HashMap::new();

    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem("block")?;

    for device in enumerator.scan_devices()? {
        let Some(node) = device.devnode() else {
            continue;
        };

        let is_disk = node == disk_node;
        let is_partition = device
            .parent()
            .and_then(|p| p.devnode().map(|n| n == disk_node))
            .unwrap_or(false);

        if is_disk || is_partition {
            labels.insert(node.to_path_buf(), property(&device, "ID_FS_LABEL"));
        }
    }

    if labels.is_empty() {
        warn!(device = %disk_node.display(), "Disk not found in udev database");
    }

    Ok(labels)
}

fn property(device: &udev::Device, key: &str) -> Option<String> {
    device
        .property_value(key)
        .map(OsStr::to_string_lossy)
        .map(|v| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Parse `/proc/mounts` format into (source, target) pairs.
fn parse_mount_table(table: &str) -> Vec<(PathBuf, PathBuf)> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            Some((
                PathBuf::from(unescape_mount_field(source)),
                PathBuf::from(unescape_mount_field(target)),
            ))
        })
        .collect()
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace in paths.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' {
            let octal = field
                .get(i + 1..i + 4)
                .filter(|o| o.bytes().all(|b| (b'0'..=b'7').contains(&b)));
            if let Some(value) = octal.and_then(|o| u8::from_str_radix(o, 8).ok()) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
