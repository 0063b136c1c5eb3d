//! Depth-first traversal of a source tree.
//!
//! Entries come out in directory-listing order. A subdirectory is yielded and
//! then fully traversed before its later siblings, so every directory is
//! seen before anything inside it. The walk is lazy: each call to `next`
//! reads at most one directory entry, which lets the caller stop or resume
//! between files.
//!
//! A symlink to a regular file is yielded as a file, so its target's content
//! is ingested under the link's name. Symlinked directories are not entered,
//! which keeps the walk free of cycles.

use std::path::{Path, PathBuf};

use tokio::fs::ReadDir;
use tracing::debug;

use crate::core::error::IngestError;

/// A directory entry relative to the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    Dir(PathBuf),
    File(PathBuf),
}

pub struct TreeWalk {
    root: PathBuf,
    /// Open directories, innermost last, with their path relative to root.
    stack: Vec<(PathBuf, ReadDir)>,
    started: bool,
}

impl TreeWalk {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stack: Vec::new(),
            started: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn next(&mut self) -> Option<Result<WalkEntry, IngestError>> {
        if !self.started {
            self.started = true;
            match tokio::fs::read_dir(&self.root).await {
                Ok(dir) => self.stack.push((PathBuf::new(), dir)),
                Err(e) => return Some(Err(IngestError::io("read directory", &self.root, e))),
            }
        }

        loop {
            let (relative_dir, dir) = self.stack.last_mut()?;

            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    self.stack.pop();
                    continue;
                }
                Err(e) => {
                    let path = self.root.join(relative_dir.as_path());
                    return Some(Err(IngestError::io("read directory", path, e)));
                }
            };

            let relative = relative_dir.join(entry.file_name());
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) => return Some(Err(IngestError::io("stat", entry.path(), e))),
            };

            if file_type.is_dir() {
                match tokio::fs::read_dir(entry.path()).await {
                    Ok(child) => self.stack.push((relative.clone(), child)),
                    Err(e) => return Some(Err(IngestError::io("read directory", entry.path(), e))),
                }
                return Some(Ok(WalkEntry::Dir(relative)));
            }

            if file_type.is_file() {
                return Some(Ok(WalkEntry::File(relative)));
            }

            if file_type.is_symlink() {
                match tokio::fs::metadata(entry.path()).await {
                    Ok(target) if target.is_file() => return Some(Ok(WalkEntry::File(relative))),
                    Ok(_) => debug!(path = %entry.path().display(), "Skipping symlinked directory"),
                    Err(e) => debug!(path = %entry.path().display(), error = %e, "Skipping dangling symlink"),
                }
                continue;
            }

            debug!(path = %entry.path().display(), "Skipping special file");
        }
    }
}
