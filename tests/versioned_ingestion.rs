//! End-to-end runs of the ingestion engine against a simulated card.

use ingestd::adapters::{SimulatedAdapter, Simulator};
use ingestd::core::ingestion::checksum::hash_file;
use ingestd::core::{
    DriveInventory, DriveRecord, EngineConfig, IngestError, IngestOutcome, IngestionEngine,
    MemoryRegistry, MountPoint, ProgressTracker, Registry,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

const SERIAL: &str = "CARD-1";

struct Harness {
    _temp: TempDir,
    card: PathBuf,
    dest: PathBuf,
    archive: PathBuf,
    sim: Simulator,
    registry: MemoryRegistry,
    progress: ProgressTracker,
    engine: IngestionEngine,
}

fn harness() -> Harness {
    let temp = tempdir().unwrap();
    let card = temp.path().join("card");
    let dest = temp.path().join("dest");
    let archive = temp.path().join("_archive");
    fs::create_dir_all(&card).unwrap();

    let (adapter, sim) = SimulatedAdapter::new();
    let registry = MemoryRegistry::new();
    let progress = ProgressTracker::new();
    let engine = IngestionEngine::new(
        DriveInventory::new(Arc::new(adapter)),
        Arc::new(registry.clone()),
        progress.clone(),
        EngineConfig {
            destination_root: dest.clone(),
            archive_root: archive.clone(),
            boot_volume_label: "EFI".to_string(),
        },
    );
    sim.add_drive(SERIAL, card.clone());

    Harness {
        _temp: temp,
        card,
        dest,
        archive,
        sim,
        registry,
        progress,
        engine,
    }
}

fn write(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Every regular file under `root`, keyed by relative path.
fn files(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn visit(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(root, &path, out);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_path_buf();
                out.insert(relative, fs::read(&path).unwrap());
            }
        }
    }

    let mut out = BTreeMap::new();
    visit(root, root, &mut out);
    out
}

async fn run(h: &Harness) -> IngestOutcome {
    h.engine.run(SERIAL).await.unwrap()
}

#[tokio::test]
async fn three_run_scenario() {
    let h = harness();
    write(&h.card.join("a.txt"), b"X");
    write(&h.card.join("sub/b.txt"), b"Y");

    // First run mirrors both files.
    let IngestOutcome::Completed(report) = run(&h).await else {
        panic!("first run did not complete");
    };
    assert_eq!(report.files_copied, 2);
    assert_eq!(fs::read(h.dest.join("a.txt")).unwrap(), b"X");
    assert_eq!(fs::read(h.dest.join("sub/b.txt")).unwrap(), b"Y");
    assert_eq!(h.registry.actions(Some(SERIAL)).await.unwrap().len(), 2);
    assert!(files(&h.archive).is_empty());

    // Second run without changes is a no-op.
    let IngestOutcome::Completed(report) = run(&h).await else {
        panic!("second run did not complete");
    };
    assert_eq!(report.files_copied, 0);
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(h.registry.actions(None).await.unwrap().len(), 2);
    assert!(files(&h.archive).is_empty());

    // Third run archives the old a.txt.
    write(&h.card.join("a.txt"), b"X2");
    let IngestOutcome::Completed(report) = run(&h).await else {
        panic!("third run did not complete");
    };
    assert_eq!(report.files_copied, 1);
    assert_eq!(report.files_archived, 1);
    assert_eq!(fs::read(h.dest.join("a.txt")).unwrap(), b"X2");
    assert_eq!(
        files(&h.archive),
        BTreeMap::from([(PathBuf::from("a.txt"), b"X".to_vec())])
    );

    let actions = h.registry.actions(Some(SERIAL)).await.unwrap();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[2].filename, h.card.join("a.txt"));
    assert_eq!(actions[2].file_size, 2);
    assert!(!actions.iter().skip(2).any(|a| a.filename.ends_with("b.txt")));
}

#[tokio::test]
async fn recorded_checksum_matches_destination() {
    let h = harness();
    write(&h.card.join("photo.jpg"), &vec![0xAB; 300 * 1024]);
    write(&h.card.join("deep/nested/clip.mov"), b"moving pictures");

    run(&h).await;

    for action in h.registry.actions(Some(SERIAL)).await.unwrap() {
        let relative = action.filename.strip_prefix(&h.card).unwrap();
        let dest_hash = hash_file(&h.dest.join(relative)).await.unwrap();
        assert_eq!(dest_hash, action.checksum);
        assert_eq!(
            action.file_size,
            fs::metadata(h.dest.join(relative)).unwrap().len()
        );
    }
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let h = harness();
    write(&h.card.join("one.txt"), b"1");
    write(&h.card.join("d/two.txt"), b"2");
    write(&h.card.join("d/e/three.txt"), b"3");

    run(&h).await;
    let after_first = files(&h.dest);
    run(&h).await;

    assert_eq!(files(&h.dest), after_first);
    assert_eq!(after_first.len(), 3);
    assert!(files(&h.archive).is_empty());
    assert_eq!(h.registry.actions(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn empty_directories_are_mirrored_on_both_sides() {
    let h = harness();
    fs::create_dir_all(h.card.join("DCIM/100CANON")).unwrap();

    let IngestOutcome::Completed(report) = run(&h).await else {
        panic!("run did not complete");
    };

    assert_eq!(report.files_copied, 0);
    assert_eq!(report.directories, 2);
    assert!(h.dest.join("DCIM/100CANON").is_dir());
    assert!(h.archive.join("DCIM/100CANON").is_dir());
}

#[tokio::test]
async fn boot_volume_is_not_used_as_source() {
    let h = harness();
    let efi = h.card.parent().unwrap().join("efi");
    write(&efi.join("bootx64.efi"), b"boot");
    write(&h.card.join("data.txt"), b"data");

    h.sim.add_drive_record(DriveRecord {
        device: PathBuf::from("/dev/sim-BOOTABLE"),
        serial: "BOOTABLE".to_string(),
        size: 1,
        model: None,
        mount_points: vec![
            MountPoint {
                path: efi,
                label: Some("EFI".to_string()),
            },
            MountPoint {
                path: h.card.clone(),
                label: Some("DATA".to_string()),
            },
        ],
    });

    h.engine.run("BOOTABLE").await.unwrap();
    assert_eq!(
        files(&h.dest).into_keys().collect::<Vec<_>>(),
        vec![PathBuf::from("data.txt")]
    );
}

#[tokio::test]
async fn unmounted_device_aborts_cleanly() {
    let h = harness();
    write(&h.card.join("a.txt"), b"X");
    h.sim.unmount(SERIAL);

    assert_eq!(run(&h).await, IngestOutcome::NoMountPoints);
    assert!(h.registry.actions(None).await.unwrap().is_empty());
    assert!(!h.dest.exists());
}

#[tokio::test]
async fn detached_device_aborts_cleanly() {
    let h = harness();
    h.sim.remove_drive(SERIAL);
    assert_eq!(run(&h).await, IngestOutcome::DeviceNotConnected);
}

#[tokio::test]
async fn copy_failure_aborts_run_and_keeps_earlier_copies() {
    let h = harness();
    write(&h.card.join("a.txt"), b"ok");
    write(&h.card.join("b.txt"), b"blocked");
    write(&h.card.join("c.txt"), b"ok too");
    // A directory squatting on b.txt's destination cannot be hashed.
    fs::create_dir_all(h.dest.join("b.txt")).unwrap();

    let err = h.engine.run(SERIAL).await.unwrap_err();
    assert!(matches!(err, IngestError::ChecksumOrCopy { .. }));

    // Whatever was copied before the failure stays, with its audit record.
    let actions = h.registry.actions(None).await.unwrap();
    assert!(actions.len() < 3);
    for action in actions {
        let relative = action.filename.strip_prefix(&h.card).unwrap();
        assert!(h.dest.join(relative).is_file());
    }
    assert_eq!(h.progress.active_count().await, 0);
}

#[tokio::test]
async fn progress_is_cleared_after_run() {
    let h = harness();
    write(&h.card.join("a.txt"), b"X");

    run(&h).await;
    assert!(h.progress.get(SERIAL).await.is_none());
}

#[tokio::test]
async fn symlinked_files_are_copied_as_regular_files() {
    let h = harness();
    let outside = h.card.parent().unwrap().join("outside");
    write(&outside.join("target.jpg"), b"linked content");
    write(&outside.join("nested/inner.jpg"), b"not reached");
    std::os::unix::fs::symlink(outside.join("target.jpg"), h.card.join("alias.jpg")).unwrap();
    std::os::unix::fs::symlink(outside.join("nested"), h.card.join("linked_dir")).unwrap();

    let IngestOutcome::Completed(report) = run(&h).await else {
        panic!("run did not complete");
    };

    assert_eq!(report.files_copied, 1);
    let copied = h.dest.join("alias.jpg");
    assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&copied).unwrap(), b"linked content");
    assert!(!h.dest.join("linked_dir").exists());

    let actions = h.registry.actions(Some(SERIAL)).await.unwrap();
    assert_eq!(actions[0].filename, h.card.join("alias.jpg"));
    assert_eq!(actions[0].file_size, b"linked content".len() as u64);
}
