//! Crash-safe replacement of a file: write pending, then swap into place
//!
//! Lifecycle of one output:
//! ```text
//! Start ──write──▶ WrittenTemp ──commit──▶ Committed
//!   │                   │
//!   └──────────────▶ Failed ◀──────────┘
//! ```
//!
//! The pending file lives next to the target (`<dir>/<prefix><name>`) so the
//! final rename never crosses filesystems. The target is only touched during
//! `commit`, after the pending file is complete. Until the rename lands,
//! either the original or a complete replacement is on disk.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use zipvault_core::{ZipvaultError, ZipvaultResult};

pub const DEFAULT_PENDING_PREFIX: &str = ".zipvault-pending.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceState {
    Start,
    WrittenTemp,
    Committed,
    Failed,
}

/// Side-by-side pending file for a single in-flight output.
#[derive(Debug)]
pub struct PendingOutput {
    target: PathBuf,
    pending: PathBuf,
    state: ReplaceState,
    sync: bool,
}

impl PendingOutput {
    pub fn new(target: &Path, prefix: &str) -> ZipvaultResult<Self> {
        Ok(Self {
            target: target.to_path_buf(),
            pending: pending_path(target, prefix)?,
            state: ReplaceState::Start,
            sync: true,
        })
    }

    /// Whether to fsync the pending file before it can be committed.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn pending(&self) -> &Path {
        &self.pending
    }

    pub fn state(&self) -> ReplaceState {
        self.state
    }

    /// Write the full output to the pending file.
    ///
    /// A leftover pending file from an interrupted run is overwritten. On
    /// failure the partial pending file is removed; the target is never
    /// touched.
    pub fn write(&mut self, content: &[u8]) -> ZipvaultResult<()> {
        if self.state != ReplaceState::Start {
            return Err(ZipvaultError::Unsupported(format!(
                "pending output for {} already written",
                self.target.display()
            )));
        }

        match self.write_inner(content) {
            Ok(()) => {
                self.state = ReplaceState::WrittenTemp;
                tracing::debug!(
                    "pending output written: {} ({} bytes)",
                    self.pending.display(),
                    content.len()
                );
                Ok(())
            }
            Err(e) => {
                self.state = ReplaceState::Failed;
                let _ = std::fs::remove_file(&self.pending);
                Err(e)
            }
        }
    }

    fn write_inner(&self, content: &[u8]) -> ZipvaultResult<()> {
        let io_err = |e| ZipvaultError::io("writing pending file", &self.pending, e);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.pending)
            .map_err(io_err)?;
        file.write_all(content).map_err(io_err)?;
        if self.sync {
            file.sync_all().map_err(io_err)?;
        }
        Ok(())
    }

    /// Promote the pending file to the target path.
    ///
    /// On failure both files are left where they are and the error is
    /// returned; the pending file is not cleaned up because it may be the
    /// only complete copy left.
    pub fn commit(self) -> ZipvaultResult<PathBuf> {
        self.commit_with(replace_file)
    }

    /// [`commit`](Self::commit) with the swap step supplied by the caller.
    pub(crate) fn commit_with<F>(mut self, replace: F) -> ZipvaultResult<PathBuf>
    where
        F: FnOnce(&Path, &Path) -> ZipvaultResult<()>,
    {
        if self.state != ReplaceState::WrittenTemp {
            return Err(ZipvaultError::Unsupported(format!(
                "cannot commit {} from state {:?}",
                self.target.display(),
                self.state
            )));
        }

        match replace(self.pending.as_path(), self.target.as_path()) {
            Ok(()) => {
                self.state = ReplaceState::Committed;
                Ok(self.target.clone())
            }
            Err(e) => {
                self.state = ReplaceState::Failed;
                tracing::error!(
                    "replacing {} failed, pending output kept at {}: {e}",
                    self.target.display(),
                    self.pending.display()
                );
                Err(e)
            }
        }
    }
}

impl Drop for PendingOutput {
    fn drop(&mut self) {
        // Written but abandoned before commit: the target was never touched.
        if self.state == ReplaceState::WrittenTemp {
            let _ = std::fs::remove_file(&self.pending);
        }
    }
}

/// Remove `target` and move `pending` into its place.
///
/// A target that is already gone (a retry after a crash between delete and
/// rename) is fine. The pending file must exist before the target is
/// deleted.
pub fn replace_file(pending: &Path, target: &Path) -> ZipvaultResult<()> {
    let meta = std::fs::metadata(pending)
        .map_err(|e| ZipvaultError::io("checking pending file", pending, e))?;
    if !meta.is_file() {
        return Err(ZipvaultError::io(
            "checking pending file",
            pending,
            std::io::Error::other("not a regular file"),
        ));
    }

    match std::fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("{} already absent before replace", target.display());
        }
        Err(e) => return Err(ZipvaultError::io("removing original", target, e)),
    }

    std::fs::rename(pending, target)
        .map_err(|e| ZipvaultError::io("renaming pending file", pending, e))?;
    Ok(())
}

/// Pending file path for `target`: `<dir>/<prefix><file_name>`.
///
/// The prefix must be non-empty and free of path separators, so the pending
/// file is always a distinct sibling of the target.
pub fn pending_path(target: &Path, prefix: &str) -> ZipvaultResult<PathBuf> {
    if prefix.is_empty() || prefix.chars().any(std::path::is_separator) {
        return Err(ZipvaultError::Config(format!(
            "invalid pending file prefix {prefix:?}"
        )));
    }
    let name = target.file_name().ok_or_else(|| {
        ZipvaultError::Unsupported(format!("{} has no file name", target.display()))
    })?;
    let mut pending_name = std::ffi::OsString::from(prefix);
    pending_name.push(name);
    let pending = target.with_file_name(pending_name);
    if pending == target {
        return Err(ZipvaultError::Config(format!(
            "pending file for {} would overwrite it",
            target.display()
        )));
    }
    Ok(pending)
}

/// Delete a pending file orphaned by a crashed run. Returns whether one
/// existed. Orphans are always safe to discard: the target was either never
/// touched or already replaced.
pub fn discard_orphan(target: &Path, prefix: &str) -> ZipvaultResult<bool> {
    let pending = pending_path(target, prefix)?;
    match std::fs::remove_file(&pending) {
        Ok(()) => {
            tracing::info!("discarded orphaned pending file: {}", pending.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ZipvaultError::io("removing orphaned pending file", &pending, e)),
    }
}
