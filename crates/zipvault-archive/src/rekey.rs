//! Key rotation for an archive that is already encrypted
//!
//! The archive is opened with the current key and resealed with a fresh one
//! entirely in memory. Ordering on disk:
//!
//! 1. write the resealed archive to the pending file
//! 2. back up the current key file (`<key>.bak.<secs>`)
//! 3. write the new key
//! 4. commit the pending file over the archive
//!
//! A crash between 3 and 4 leaves the old archive next to the backup of the
//! key that opens it. When a step fails, the key file is rolled back to the
//! old key only while the old archive is still on disk. If the commit
//! removed the archive but could not move the resealed copy into place, the
//! new key stays, since it is the only key that opens the pending file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use zipvault_core::{Direction, Granularity, ZipvaultResult};
use zipvault_crypto::{
    backup_key, generate_key, load_key, resolve_key_path, save_key, ArchiveKey,
};

use crate::engine::{apply, read_payload, TransformOptions};
use crate::replace::{replace_file, PendingOutput};

#[derive(Debug)]
pub struct RekeyOutcome {
    pub archive: PathBuf,
    pub key_path: PathBuf,
    /// Copy of the key that opened the archive before rotation
    pub backup_path: PathBuf,
    pub elapsed: Duration,
}

/// Rotate the key of an encrypted archive in place.
///
/// `opts.placement` and `opts.rotate_key` are ignored: rekeying always
/// replaces the archive and always generates a new key.
pub fn rekey(
    archive: &Path,
    granularity: Granularity,
    opts: &TransformOptions,
) -> ZipvaultResult<RekeyOutcome> {
    rekey_with(archive, granularity, opts, save_key, replace_file)
}

/// [`rekey`] with the new-key write and the final swap supplied by the
/// caller.
pub(crate) fn rekey_with<S, R>(
    archive: &Path,
    granularity: Granularity,
    opts: &TransformOptions,
    save_new_key: S,
    replace: R,
) -> ZipvaultResult<RekeyOutcome>
where
    S: FnOnce(&Path, &ArchiveKey) -> ZipvaultResult<()>,
    R: FnOnce(&Path, &Path) -> ZipvaultResult<()>,
{
    let started = Instant::now();
    let key_path = resolve_key_path(archive, opts.key_path.as_deref());

    let old_key = load_key(&key_path)?;
    let sealed = read_payload(archive, granularity)?;
    let plain = apply(&old_key, Direction::Decrypt, sealed, archive)?;

    let new_key = generate_key();
    let resealed = apply(&new_key, Direction::Encrypt, plain, archive)?;
    let bytes = resealed.into_bytes(opts.compression)?;

    let mut pending = PendingOutput::new(archive, &opts.pending_prefix)?.with_sync(opts.sync);
    pending.write(&bytes)?;
    let pending_file = pending.pending().to_path_buf();

    let backup_path = backup_key(&key_path)?;
    if let Err(e) = save_new_key(&key_path, &new_key) {
        // The archive was never touched; dropping `pending` removes it.
        restore_key(&key_path, &old_key, &backup_path);
        return Err(e);
    }

    if let Err(e) = pending.commit_with(replace) {
        if std::fs::symlink_metadata(archive).is_ok() {
            restore_key(&key_path, &old_key, &backup_path);
            let _ = std::fs::remove_file(&pending_file);
        } else {
            tracing::error!(
                "{} was removed but the rekeyed copy is still at {}; it opens with the new key in {} (previous key at {})",
                archive.display(),
                pending_file.display(),
                key_path.display(),
                backup_path.display()
            );
        }
        return Err(e);
    }

    let elapsed = started.elapsed();
    tracing::info!(
        "rekey runs {:.2} seconds: {} (previous key kept at {})",
        elapsed.as_secs_f64(),
        archive.display(),
        backup_path.display()
    );

    Ok(RekeyOutcome {
        archive: archive.to_path_buf(),
        key_path,
        backup_path,
        elapsed,
    })
}

fn restore_key(key_path: &Path, old_key: &ArchiveKey, backup_path: &Path) {
    match save_key(key_path, old_key) {
        Ok(()) => tracing::warn!("rekey aborted, previous key restored to {}", key_path.display()),
        Err(e) => tracing::error!(
            "restoring previous key to {} failed ({e}); it is still in {}",
            key_path.display(),
            backup_path.display()
        ),
    }
}
