use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::core::hardware::HardwareAdapter;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::{LinuxAdapter, LinuxAdapterConfig};
pub use simulated::{SimulatedAdapter, Simulator};

pub fn get_adapter(simulation: bool) -> Arc<dyn HardwareAdapter> {
    if simulation {
        let (adapter, controller) = SimulatedAdapter::new();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for cmd in stdin.lines().map_while(Result::ok) {
                let parts: Vec<&str> = cmd.split_whitespace().collect();
                match parts.as_slice() {
                    ["add", serial, dir] => controller.add_drive(serial, PathBuf::from(dir)),
                    ["rm", serial] => controller.remove_drive(serial),
                    ["unmount", serial] => controller.unmount(serial),
                    _ => info!("(Simulator) Use: 'add <serial> <dir>', 'rm <serial>' or 'unmount <serial>'"),
                }
            }
        });

        return Arc::new(adapter);
    }

    #[cfg(target_os = "linux")]
    {
        Arc::new(LinuxAdapter::with_defaults())
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::warn!("No hardware adapter for this platform, falling back to simulation");
        Arc::new(SimulatedAdapter::new().0)
    }
}
