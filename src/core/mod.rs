pub mod browse;
pub mod error;
pub mod hardware;
pub mod ingestion;
pub mod inventory;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod queue;
pub mod registration;
pub mod registry;
pub mod watcher;

pub use browse::{BrowseEntry, EntryKind, browse_drive};
pub use error::{BrowseError, IngestError, InventoryError, RegistrationError};
pub use hardware::{DeviceHandle, DriveRecord, HardwareAdapter, HardwareEvent, MountPoint};
pub use ingestion::{EngineConfig, IngestOutcome, IngestReport, IngestionEngine};
pub use inventory::DriveInventory;
pub use models::{IngestionActionRecord, IngestionProfile, RegisterRequest};
pub use orchestrator::Orchestrator;
pub use progress::{IngestProgress, ProgressTracker};
pub use queue::{IngestQueue, IngestRunner, PendingList};
pub use registration::register_profile;
pub use registry::{MemoryRegistry, Registry};
pub use watcher::{DeviceWatcher, WatchEvent, WatcherConfig};
