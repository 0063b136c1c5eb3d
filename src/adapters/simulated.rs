use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::bail;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::hardware::{
    DeviceHandle, DriveRecord, HardwareAdapter, HardwareEvent, MountPoint,
};

#[derive(Default)]
struct Faults {
    fail_enumeration: AtomicBool,
    fail_mount_queries: AtomicBool,
}

type SharedState = Arc<(Mutex<Vec<DriveRecord>>, Faults)>;

/// Handle for injecting hardware changes into a `SimulatedAdapter`.
#[derive(Clone)]
pub struct Simulator {
    state: SharedState,
    tx: mpsc::UnboundedSender<HardwareEvent>,
}

impl Simulator {
    /// Plug in a drive whose only volume is mounted at `mount_path`.
    pub fn add_drive(&self, serial: &str, mount_path: PathBuf) {
        let drive = DriveRecord {
            device: PathBuf::from(format!("/dev/sim-{}", serial)),
            serial: serial.to_string(),
            size: 64 * 1024 * 1024 * 1024,
            model: Some("Simulated Card".to_string()),
            mount_points: vec![MountPoint {
                path: mount_path,
                label: Some(format!("SIM_{}", serial)),
            }],
        };
        self.add_drive_record(drive);
    }

    /// Plug in an arbitrary drive record, mount points included.
    pub fn add_drive_record(&self, drive: DriveRecord) {
        let handle = DeviceHandle(format!("sim-{}", drive.serial));
        {
            let mut drives = self.drives();
            drives.retain(|d| d.serial != drive.serial);
            drives.push(drive);
        }
        let _ = self.tx.send(HardwareEvent::Attached(handle));
    }

    pub fn remove_drive(&self, serial: &str) {
        self.drives().retain(|d| d.serial != serial);
        let _ = self
            .tx
            .send(HardwareEvent::Detached(DeviceHandle(format!("sim-{}", serial))));
    }

    /// Drop the drive's mount points without a detach notification.
    pub fn unmount(&self, serial: &str) {
        if let Some(drive) = self.drives().iter_mut().find(|d| d.serial == serial) {
            drive.mount_points.clear();
        }
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.state.1.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mount_queries(&self, fail: bool) {
        self.state.1.fail_mount_queries.store(fail, Ordering::SeqCst);
    }

    fn drives(&self) -> std::sync::MutexGuard<'_, Vec<DriveRecord>> {
        self.state.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hardware adapter backed by an in-memory drive table.
pub struct SimulatedAdapter {
    state: SharedState,
    // Taken by `start()`, which only runs once.
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<HardwareEvent>>>,
    cancel: CancellationToken,
}

impl SimulatedAdapter {
    pub fn new() -> (Self, Simulator) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state: SharedState = Arc::new((Mutex::new(Vec::new()), Faults::default()));

        (
            Self {
                state: state.clone(),
                event_rx: Mutex::new(Some(rx)),
                cancel: CancellationToken::new(),
            },
            Simulator { state, tx },
        )
    }
}

impl HardwareAdapter for SimulatedAdapter {
    fn start(&self, event_sender: mpsc::Sender<HardwareEvent>) {
        let Some(mut rx) = self
            .event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            warn!("Simulated adapter already started");
            return;
        };

        info!("Simulated adapter listening for injected events");

        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                if event_sender.send(event).await.is_err() {
                    break;
                }
            }
        });
    }

    fn stop(&self) {
        self.cancel.cancel();
    }

    fn list_drives(&self) -> anyhow::Result<Vec<DriveRecord>> {
        if self.state.1.fail_enumeration.load(Ordering::SeqCst) {
            bail!("simulated enumeration failure");
        }

        let drives = self.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(drives
            .iter()
            .map(|d| DriveRecord {
                mount_points: Vec::new(),
                ..d.clone()
            })
            .collect())
    }

    fn mount_points(&self, drive: &DriveRecord) -> anyhow::Result<Vec<MountPoint>> {
        if self.state.1.fail_mount_queries.load(Ordering::SeqCst) {
            bail!("simulated mount table failure");
        }

        let drives = self.state.0.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(drives
            .iter()
            .find(|d| d.device == drive.device)
            .map(|d| d.mount_points.clone())
            .unwrap_or_default())
    }
}
