//! Key store: key file discovery, generation, persistence, and rotation

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use zeroize::Zeroize;
use zipvault_core::{ZipvaultError, ZipvaultResult};

use crate::KEY_SIZE;

/// Suffix appended to the archive filename to name its key file.
pub const KEY_SUFFIX: &str = ".key";

/// A 256-bit archive encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct ArchiveKey {
    bytes: [u8; KEY_SIZE],
}

impl ArchiveKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ArchiveKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A key together with where it lives and how it was obtained.
#[derive(Debug)]
pub struct KeyHandle {
    pub key: ArchiveKey,
    pub path: PathBuf,
    /// A new key was generated and written during this call
    pub created: bool,
}

/// Work out where the key file for `archive_path` lives.
///
/// - no override: `<archive_dir>/<archive_filename>.key`
/// - override is an existing directory: `<override>/<archive_filename>.key`
/// - any other override: used verbatim as the key file path
pub fn resolve_key_path(archive_path: &Path, key_override: Option<&Path>) -> PathBuf {
    let mut key_name: OsString = archive_path
        .file_name()
        .unwrap_or(archive_path.as_os_str())
        .to_os_string();
    key_name.push(KEY_SUFFIX);

    match key_override {
        None => archive_path.with_file_name(key_name),
        Some(dir) if dir.is_dir() => dir.join(key_name),
        Some(path) => path.to_path_buf(),
    }
}

/// Generate a random 256-bit archive key.
pub fn generate_key() -> ArchiveKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    ArchiveKey::from_bytes(bytes)
}

/// Write `key` as raw bytes to `path`, replacing any existing key file.
///
/// A previous key at the same path is destroyed; callers rotating keys must
/// back it up first (see [`backup_key`]).
pub fn save_key(path: &Path, key: &ArchiveKey) -> ZipvaultResult<()> {
    std::fs::write(path, key.as_bytes()).map_err(|e| ZipvaultError::io("writing key", path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| ZipvaultError::io("restricting key permissions", path, e))?;
    }

    tracing::debug!("key written: {}", path.display());
    Ok(())
}

/// Read a key file. A missing file is [`ZipvaultError::KeyNotFound`].
pub fn load_key(path: &Path) -> ZipvaultResult<ArchiveKey> {
    let mut raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ZipvaultError::KeyNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(ZipvaultError::io("reading key", path, e)),
    };

    if raw.len() != KEY_SIZE {
        let len = raw.len();
        raw.zeroize();
        return Err(ZipvaultError::InvalidKey {
            path: path.to_path_buf(),
            len,
            expected: KEY_SIZE,
        });
    }

    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&raw);
    raw.zeroize();
    Ok(ArchiveKey::from_bytes(bytes))
}

/// Load the key at `path`, or generate and save a new one.
///
/// A new key is generated when `rotate` is set or when no key file exists.
/// Rotation backs up the existing key file (see [`backup_key`]) before
/// overwriting it.
pub fn get_or_create_key(path: &Path, rotate: bool) -> ZipvaultResult<KeyHandle> {
    if !rotate {
        match load_key(path) {
            Ok(key) => {
                return Ok(KeyHandle {
                    key,
                    path: path.to_path_buf(),
                    created: false,
                })
            }
            Err(ZipvaultError::KeyNotFound { .. }) => {
                tracing::warn!("no key at {}, generating a new one", path.display());
            }
            Err(e) => return Err(e),
        }
    } else if path.exists() {
        let backup = backup_key(path)?;
        tracing::warn!(
            "rotating key at {}, previous key kept at {}",
            path.display(),
            backup.display()
        );
    }

    let key = generate_key();
    save_key(path, &key)?;
    Ok(KeyHandle {
        key,
        path: path.to_path_buf(),
        created: true,
    })
}

/// Copy an existing key file to `<path>.bak.<unix_secs>` and return the
/// backup path. An existing backup with the same name is never overwritten.
pub fn backup_key(path: &Path) -> ZipvaultResult<PathBuf> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut backup = suffixed(path, &format!(".bak.{now}"));
    let mut attempt = 1u32;
    while backup.exists() {
        backup = suffixed(path, &format!(".bak.{now}.{attempt}"));
        attempt += 1;
    }

    std::fs::copy(path, &backup).map_err(|e| ZipvaultError::io("backing up key", path, e))?;
    tracing::info!("key backup created: {}", backup.display());
    Ok(backup)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
