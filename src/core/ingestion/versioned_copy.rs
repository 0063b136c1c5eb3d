use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace};

use super::checksum::{BUFFER_SIZE, hash_file};
use crate::core::error::IngestError;
use crate::core::progress::{IngestProgress, ProgressTracker};
use crate::logging::LogThrottle;

/// The three trees a device run works across.
#[derive(Debug, Clone)]
pub struct CopyRoots {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub archive: PathBuf,
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Destination already holds identical content.
    Unchanged,
    Copied {
        size: u64,
        checksum: String,
        /// The previous destination content was moved into the archive.
        archived: bool,
    },
}

/// Reports per-chunk progress to the tracker and the log.
pub struct ProgressReporter<'a> {
    serial: &'a str,
    tracker: &'a ProgressTracker,
    throttle: LogThrottle,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(serial: &'a str, tracker: &'a ProgressTracker, throttle: LogThrottle) -> Self {
        Self {
            serial,
            tracker,
            throttle,
        }
    }

    async fn chunk(&self, file: &Path, bytes_copied: u64, total_bytes: u64) {
        let progress = IngestProgress::new(file.display().to_string(), bytes_copied, total_bytes);

        trace!(
            serial = %self.serial,
            file = %progress.current_file,
            percentage = format!("{:.2}", progress.percentage),
            "Copy progress"
        );
        if self.throttle.should_log() {
            info!(
                serial = %self.serial,
                file = %progress.current_file,
                percentage = format!("{:.2}", progress.percentage),
                "Copy progress"
            );
        }

        self.tracker.update(self.serial, progress).await;
    }
}

/// Create `relative` under both the destination and archive roots.
pub async fn mirror_dir(roots: &CopyRoots, relative: &Path) -> Result<(), IngestError> {
    for base in [&roots.destination, &roots.archive] {
        let dir = base.join(relative);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IngestError::io("create directory", &dir, e))?;
    }
    Ok(())
}

/// Bring one file into the destination tree.
///
/// Identical content is left alone. Changed content first moves the current
/// destination file into the archive, then the source is streamed over.
pub async fn ingest_file(
    roots: &CopyRoots,
    relative: &Path,
    progress: &ProgressReporter<'_>,
) -> Result<FileOutcome, IngestError> {
    let source = roots.source.join(relative);
    let destination = roots.destination.join(relative);

    let checksum = hash_file(&source)
        .await
        .map_err(|e| IngestError::io("checksum", &source, e))?;

    let dest_exists = tokio::fs::try_exists(&destination)
        .await
        .map_err(|e| IngestError::io("stat", &destination, e))?;

    let mut archived = false;
    if dest_exists {
        let dest_checksum = hash_file(&destination)
            .await
            .map_err(|e| IngestError::io("checksum", &destination, e))?;

        if dest_checksum == checksum {
            debug!(file = %relative.display(), "Already copied with no changes");
            return Ok(FileOutcome::Unchanged);
        }

        info!(file = %relative.display(), "File changed, moving previous version to archive");
        archive_existing(&destination, &roots.archive.join(relative)).await?;
        archived = true;
    }

    let size = tokio::fs::metadata(&source)
        .await
        .map_err(|e| IngestError::io("stat", &source, e))?
        .len();

    copy_stream(&source, &destination, size, progress).await?;
    preserve_metadata(&source, &destination);

    Ok(FileOutcome::Copied {
        size,
        checksum,
        archived,
    })
}

/// Move the current destination file to its archive path, replacing any
/// earlier archived version.
async fn archive_existing(destination: &Path, archive: &Path) -> Result<(), IngestError> {
    if let Some(parent) = archive.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::io("create directory", parent, e))?;
    }

    match tokio::fs::rename(destination, archive).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!(file = %destination.display(), "Archive on another filesystem, copying instead of renaming");
            tokio::fs::copy(destination, archive)
                .await
                .map_err(|e| IngestError::io("archive", destination, e))?;
            tokio::fs::remove_file(destination)
                .await
                .map_err(|e| IngestError::io("archive", destination, e))
        }
        Err(e) => Err(IngestError::io("archive", destination, e)),
    }
}

async fn copy_stream(
    source: &Path,
    destination: &Path,
    total_bytes: u64,
    progress: &ProgressReporter<'_>,
) -> Result<u64, IngestError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::io("create directory", parent, e))?;
    }

    let mut reader = tokio::fs::File::open(source)
        .await
        .map_err(|e| IngestError::io("open", source, e))?;
    let mut writer = tokio::fs::File::create(destination)
        .await
        .map_err(|e| IngestError::io("create", destination, e))?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_copied: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| IngestError::io("read", source, e))?;
        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .await
            .map_err(|e| IngestError::io("write", destination, e))?;

        bytes_copied += bytes_read as u64;
        progress.chunk(source, bytes_copied, total_bytes).await;
    }

    writer
        .flush()
        .await
        .map_err(|e| IngestError::io("flush", destination, e))?;
    writer
        .sync_all()
        .await
        .map_err(|e| IngestError::io("sync", destination, e))?;

    Ok(bytes_copied)
}

/// Carry permissions and timestamps over. Failures are logged, not fatal:
/// removable media filesystems often cannot represent them.
fn preserve_metadata(source: &Path, destination: &Path) {
    let metadata = match std::fs::metadata(source) {
        Ok(m) => m,
        Err(e) => {
            debug!(file = %source.display(), error = %e, "Failed to read source metadata");
            return;
        }
    };

    if let Err(e) = std::fs::set_permissions(destination, metadata.permissions()) {
        debug!(dest = %destination.display(), error = %e, "Failed to set file permissions");
    }

    let atime = filetime::FileTime::from_last_access_time(&metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_times(destination, atime, mtime) {
        debug!(dest = %destination.display(), error = %e, "Failed to preserve file timestamps");
    }
}
