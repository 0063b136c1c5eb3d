use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hardware::DriveRecord;

/// A registered intent to ingest one specific device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionProfile {
    pub id: String,
    pub serial: String,
    pub copy_to: PathBuf,
    /// Carried for completeness; the copy traversal does not filter on it.
    pub allowed_extensions: Option<Vec<String>>,
    pub copy_on_attach: Option<bool>,
    pub device_details: DriveRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit entry for one file copied off a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionActionRecord {
    pub device_serial: String,
    /// Absolute path of the source file on the device.
    pub filename: PathBuf,
    pub file_size: u64,
    /// Hex-encoded BLAKE3 of the source content at copy time.
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub serial: String,
    pub copy_to: PathBuf,
    pub allowed_extensions: Option<Vec<String>>,
    pub copy_on_attach: Option<bool>,
}
