//! SQLite-backed registry against a throwaway database file.

use chrono::{SubsecRound, Utc};
use ingestd::core::{DriveRecord, IngestionActionRecord, IngestionProfile, MountPoint, Registry};
use ingestd::db::SqliteRegistry;
use std::path::PathBuf;
use tempfile::tempdir;

fn profile(serial: &str) -> IngestionProfile {
    let now = Utc::now().trunc_subsecs(6);
    IngestionProfile {
        id: format!("profile-{}", serial),
        serial: serial.to_string(),
        copy_to: PathBuf::from("/srv/ingest"),
        allowed_extensions: Some(vec!["jpg".to_string(), "cr3".to_string()]),
        copy_on_attach: Some(true),
        device_details: DriveRecord {
            device: PathBuf::from("/dev/sdb"),
            serial: serial.to_string(),
            size: 128 * 1024 * 1024 * 1024,
            model: Some("Extreme PRO".to_string()),
            mount_points: vec![MountPoint {
                path: PathBuf::from("/media/card"),
                label: Some("CANON".to_string()),
            }],
        },
        created_at: now,
        updated_at: now,
    }
}

fn action(serial: &str, name: &str) -> IngestionActionRecord {
    IngestionActionRecord {
        device_serial: serial.to_string(),
        filename: PathBuf::from("/media/card").join(name),
        file_size: 42,
        checksum: format!("{:064x}", name.len()),
    }
}

#[tokio::test]
async fn profile_round_trips_all_fields() {
    let dir = tempdir().unwrap();
    let registry = SqliteRegistry::open(&dir.path().join("ingestd.db"))
        .await
        .unwrap();

    let stored = profile("CARD-1");
    registry.register(stored.clone()).await.unwrap();

    let profiles = registry.profiles().await.unwrap();
    assert_eq!(profiles, vec![stored]);
    assert!(registry.profile_exists("CARD-1").await.unwrap());
    assert!(!registry.profile_exists("CARD-2").await.unwrap());
}

#[tokio::test]
async fn optional_profile_fields_may_be_absent() {
    let dir = tempdir().unwrap();
    let registry = SqliteRegistry::open(&dir.path().join("ingestd.db"))
        .await
        .unwrap();

    let stored = IngestionProfile {
        allowed_extensions: None,
        copy_on_attach: None,
        ..profile("BARE")
    };
    registry.register(stored.clone()).await.unwrap();

    assert_eq!(registry.profiles().await.unwrap(), vec![stored]);
}

#[tokio::test]
async fn duplicate_serial_is_rejected() {
    let dir = tempdir().unwrap();
    let registry = SqliteRegistry::open(&dir.path().join("ingestd.db"))
        .await
        .unwrap();

    registry.register(profile("CARD-1")).await.unwrap();
    let second = IngestionProfile {
        id: "another-id".to_string(),
        ..profile("CARD-1")
    };
    assert!(registry.register(second).await.is_err());
    assert_eq!(registry.profiles().await.unwrap().len(), 1);
}

#[tokio::test]
async fn actions_keep_append_order_and_filter_by_serial() {
    let dir = tempdir().unwrap();
    let registry = SqliteRegistry::open(&dir.path().join("ingestd.db"))
        .await
        .unwrap();

    registry.append_action(action("A", "1.jpg")).await.unwrap();
    registry.append_action(action("B", "2.jpg")).await.unwrap();
    registry.append_action(action("A", "3.jpg")).await.unwrap();

    let all = registry.actions(None).await.unwrap();
    assert_eq!(
        all,
        vec![action("A", "1.jpg"), action("B", "2.jpg"), action("A", "3.jpg")]
    );

    let only_a = registry.actions(Some("A")).await.unwrap();
    assert_eq!(only_a, vec![action("A", "1.jpg"), action("A", "3.jpg")]);
    assert!(registry.actions(Some("C")).await.unwrap().is_empty());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ingestd.db");

    {
        let registry = SqliteRegistry::open(&path).await.unwrap();
        registry.register(profile("CARD-1")).await.unwrap();
        registry.append_action(action("CARD-1", "a.txt")).await.unwrap();
    }

    let reopened = SqliteRegistry::open(&path).await.unwrap();
    assert!(reopened.profile_exists("CARD-1").await.unwrap());
    assert_eq!(
        reopened.actions(None).await.unwrap(),
        vec![action("CARD-1", "a.txt")]
    );
}
