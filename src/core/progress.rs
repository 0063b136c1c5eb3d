//! In-memory progress tracking for the device being ingested.
//!
//! Progress is updated at every copy chunk but is NOT persisted. Only the
//! audit records written after each file reach the registry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestProgress {
    pub current_file: String,
    pub bytes_copied: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

impl IngestProgress {
    pub fn new(current_file: String, bytes_copied: u64, total_bytes: u64) -> Self {
        let percentage = if total_bytes > 0 {
            (bytes_copied as f64 / total_bytes as f64) * 100.0
        } else {
            100.0
        };

        Self {
            current_file,
            bytes_copied,
            total_bytes,
            percentage,
        }
    }
}

/// Thread-safe store of live progress, keyed by device serial.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<RwLock<HashMap<String, IngestProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, serial: &str, progress: IngestProgress) {
        let mut map = self.inner.write().await;
        map.insert(serial.to_string(), progress);
    }

    pub async fn get(&self, serial: &str) -> Option<IngestProgress> {
        let map = self.inner.read().await;
        map.get(serial).cloned()
    }

    /// Remove a device from tracking (called when its run ends).
    pub async fn remove(&self, serial: &str) {
        let mut map = self.inner.write().await;
        map.remove(serial);
    }

    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.len()
    }
}
