//! Contract with the persistence layer that owns ingestion profiles and the
//! audit log.
//!
//! The core only reads profiles and appends actions. Registration writes go
//! through the same trait so every backend enforces the one-profile-per-serial
//! rule itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{IngestionActionRecord, IngestionProfile};

#[async_trait]
pub trait Registry: Send + Sync {
    async fn profiles(&self) -> Result<Vec<IngestionProfile>>;

    async fn profile_exists(&self, serial: &str) -> Result<bool>;

    /// Persist a new profile. Fails if the serial is already registered.
    async fn register(&self, profile: IngestionProfile) -> Result<()>;

    /// Append one audit record. Must be durable when this returns.
    async fn append_action(&self, record: IngestionActionRecord) -> Result<()>;

    /// Audit records in append order, optionally for a single device.
    async fn actions(&self, serial: Option<&str>) -> Result<Vec<IngestionActionRecord>>;
}

#[derive(Default)]
struct MemoryState {
    profiles: Vec<IngestionProfile>,
    actions: Vec<IngestionActionRecord>,
}

/// In-process registry for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<RwLock<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make profile lookups fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("registry unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn profiles(&self) -> Result<Vec<IngestionProfile>> {
        self.check_available()?;
        Ok(self.state.read().await.profiles.clone())
    }

    async fn profile_exists(&self, serial: &str) -> Result<bool> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.profiles.iter().any(|p| p.serial == serial))
    }

    async fn register(&self, profile: IngestionProfile) -> Result<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.profiles.iter().any(|p| p.serial == profile.serial) {
            bail!("profile for {} already exists", profile.serial);
        }
        state.profiles.push(profile);
        Ok(())
    }

    async fn append_action(&self, record: IngestionActionRecord) -> Result<()> {
        self.state.write().await.actions.push(record);
        Ok(())
    }

    async fn actions(&self, serial: Option<&str>) -> Result<Vec<IngestionActionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .actions
            .iter()
            .filter(|a| serial.is_none_or(|s| a.device_serial == s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hardware::DriveRecord;
    use chrono::Utc;
    use std::path::PathBuf;

    fn profile(serial: &str) -> IngestionProfile {
        let now = Utc::now();
        IngestionProfile {
            id: format!("id-{}", serial),
            serial: serial.to_string(),
            copy_to: PathBuf::from("/tmp/out"),
            allowed_extensions: None,
            copy_on_attach: None,
            device_details: DriveRecord {
                device: PathBuf::from("/dev/sdz"),
                serial: serial.to_string(),
                size: 0,
                model: None,
                mount_points: vec![],
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_serial() {
        let registry = MemoryRegistry::new();
        registry.register(profile("A")).await.unwrap();
        assert!(registry.register(profile("A")).await.is_err());
        assert_eq!(registry.profiles().await.unwrap().len(), 1);
        assert!(registry.profile_exists("A").await.unwrap());
        assert!(!registry.profile_exists("B").await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_fails_lookups() {
        let registry = MemoryRegistry::new();
        registry.set_unavailable(true);
        assert!(registry.profiles().await.is_err());
        registry.set_unavailable(false);
        assert!(registry.profiles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn actions_filter_by_serial_in_append_order() {
        let registry = MemoryRegistry::new();
        for (serial, name) in [("A", "1"), ("B", "2"), ("A", "3")] {
            registry
                .append_action(IngestionActionRecord {
                    device_serial: serial.to_string(),
                    filename: PathBuf::from(name),
                    file_size: 1,
                    checksum: String::new(),
                })
                .await
                .unwrap();
        }

        let names: Vec<_> = registry
            .actions(Some("A"))
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, vec![PathBuf::from("1"), PathBuf::from("3")]);
        assert_eq!(registry.actions(None).await.unwrap().len(), 3);
    }
}
