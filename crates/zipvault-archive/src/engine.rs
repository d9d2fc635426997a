//! Transformation engine: one routine for every encrypt/decrypt operation
//!
//! An operation is a [`Direction`] applied at a [`Granularity`]:
//!
//! | granularity | unit | output |
//! |-------------|------|--------|
//! | `WholeArchive` | raw archive bytes | opaque blob, not a zip |
//! | `PerEntry` | each entry payload | valid zip, names visible |
//!
//! Order of work: resolve key path → (decrypt) load key → read input →
//! (encrypt) load or create key → seal/open every unit → write pending →
//! commit. Nothing is written before every unit has been processed, so a
//! single failing entry aborts the whole operation with the original intact.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use zipvault_core::config::ZipvaultConfig;
use zipvault_core::types::operation_name;
use zipvault_core::{CompressionMode, Direction, Granularity, ZipvaultError, ZipvaultResult};
use zipvault_crypto::{get_or_create_key, load_key, resolve_key_path, ArchiveKey};

use crate::payload::{self, EntryMap};
use crate::replace::{PendingOutput, DEFAULT_PENDING_PREFIX};

/// Where the result of an operation goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    /// Replace the archive itself.
    #[default]
    InPlace,
    /// Write a separate artifact next to the archive: `cipher_<name>` when
    /// encrypting, `plain_<name>` when decrypting. The archive is untouched.
    Alongside,
    /// Return the result without writing anything. Lets a caller read or
    /// edit decrypted content without plaintext ever reaching disk.
    Memory,
}

#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Key file override: a directory or a full path. `None` puts the key
    /// next to the archive.
    pub key_path: Option<PathBuf>,
    pub placement: Placement,
    /// Encrypt only: always generate a new key, replacing the old key file.
    pub rotate_key: bool,
    /// Compression for archives rebuilt in per-entry mode.
    pub compression: CompressionMode,
    pub pending_prefix: String,
    /// fsync pending output before commit
    pub sync: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            key_path: None,
            placement: Placement::InPlace,
            rotate_key: false,
            compression: CompressionMode::default(),
            pending_prefix: DEFAULT_PENDING_PREFIX.into(),
            sync: true,
        }
    }
}

impl TransformOptions {
    pub fn from_config(config: &ZipvaultConfig) -> Self {
        Self {
            key_path: config.keys.key_dir.clone(),
            placement: Placement::InPlace,
            rotate_key: config.keys.rotate_on_encrypt,
            compression: config.archive.compression,
            pending_prefix: config.output.pending_prefix.clone(),
            sync: config.output.sync,
        }
    }

    pub fn key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn rotate_key(mut self, rotate: bool) -> Self {
        self.rotate_key = rotate;
        self
    }

    pub fn compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }
}

/// Content of an archive in one of the two granularities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw bytes of a whole archive file (or of the blob sealing it)
    Archive(Vec<u8>),
    Entries(EntryMap),
}

impl Payload {
    /// Serialize for writing to disk; entry maps are packed into a new zip.
    pub fn into_bytes(self, compression: CompressionMode) -> ZipvaultResult<Vec<u8>> {
        match self {
            Payload::Archive(bytes) => Ok(bytes),
            Payload::Entries(entries) => payload::pack_to_vec(&entries, compression),
        }
    }

    /// View the payload as entries, unpacking raw archive bytes if needed.
    pub fn into_entries(self) -> ZipvaultResult<EntryMap> {
        match self {
            Payload::Archive(bytes) => payload::unpack_bytes(&bytes),
            Payload::Entries(entries) => Ok(entries),
        }
    }
}

#[derive(Debug)]
pub enum Output {
    Written(PathBuf),
    Memory(Payload),
}

#[derive(Debug)]
pub struct TransformOutcome {
    pub operation: &'static str,
    pub output: Output,
    pub key_path: PathBuf,
    /// A new key file was generated by this operation
    pub key_created: bool,
    pub elapsed: Duration,
}

pub fn encrypt_archive(archive: &Path, opts: &TransformOptions) -> ZipvaultResult<TransformOutcome> {
    transform(archive, Granularity::WholeArchive, Direction::Encrypt, opts)
}

pub fn decrypt_archive(archive: &Path, opts: &TransformOptions) -> ZipvaultResult<TransformOutcome> {
    transform(archive, Granularity::WholeArchive, Direction::Decrypt, opts)
}

pub fn encrypt_entries(archive: &Path, opts: &TransformOptions) -> ZipvaultResult<TransformOutcome> {
    transform(archive, Granularity::PerEntry, Direction::Encrypt, opts)
}

pub fn decrypt_entries(archive: &Path, opts: &TransformOptions) -> ZipvaultResult<TransformOutcome> {
    transform(archive, Granularity::PerEntry, Direction::Decrypt, opts)
}

/// Run one operation end to end.
pub fn transform(
    archive: &Path,
    granularity: Granularity,
    direction: Direction,
    opts: &TransformOptions,
) -> ZipvaultResult<TransformOutcome> {
    let started = Instant::now();
    let operation = operation_name(direction, granularity);
    let key_path = resolve_key_path(archive, opts.key_path.as_deref());

    let (key, key_created, input) = match direction {
        Direction::Decrypt => {
            // A missing key must fail before the archive is even read.
            let key = load_key(&key_path)?;
            (key, false, read_payload(archive, granularity)?)
        }
        Direction::Encrypt => {
            let input = read_payload(archive, granularity)?;
            let handle = get_or_create_key(&key_path, opts.rotate_key)?;
            (handle.key, handle.created, input)
        }
    };

    let result = apply(&key, direction, input, archive)?;
    drop(key);

    let output = match opts.placement {
        Placement::Memory => Output::Memory(result),
        Placement::InPlace | Placement::Alongside => {
            let target = output_path(archive, direction, opts.placement);
            let bytes = result.into_bytes(opts.compression)?;
            let written = write_atomically(&target, &bytes, opts)?;
            Output::Written(written)
        }
    };

    let elapsed = started.elapsed();
    tracing::info!(
        "{operation} runs {:.2} seconds: {}",
        elapsed.as_secs_f64(),
        archive.display()
    );

    Ok(TransformOutcome {
        operation,
        output,
        key_path,
        key_created,
        elapsed,
    })
}

/// Path the result is written to for a given placement.
pub fn output_path(archive: &Path, direction: Direction, placement: Placement) -> PathBuf {
    match placement {
        Placement::Alongside => {
            let mut name = std::ffi::OsString::from(direction.artifact_prefix());
            name.push(archive.file_name().unwrap_or(archive.as_os_str()));
            archive.with_file_name(name)
        }
        Placement::InPlace | Placement::Memory => archive.to_path_buf(),
    }
}

pub(crate) fn read_payload(archive: &Path, granularity: Granularity) -> ZipvaultResult<Payload> {
    match granularity {
        Granularity::WholeArchive => std::fs::read(archive)
            .map(Payload::Archive)
            .map_err(|e| ZipvaultError::io("reading archive", archive, e)),
        Granularity::PerEntry => payload::unpack(archive).map(Payload::Entries),
    }
}

/// Seal or open every unit of `input`. Stops at the first failure.
pub(crate) fn apply(
    key: &ArchiveKey,
    direction: Direction,
    input: Payload,
    archive: &Path,
) -> ZipvaultResult<Payload> {
    let transform_unit = |data: &[u8]| match direction {
        Direction::Encrypt => zipvault_crypto::encrypt(key, data),
        Direction::Decrypt => zipvault_crypto::decrypt(key, data),
    };

    match input {
        Payload::Archive(bytes) => transform_unit(&bytes)
            .map(Payload::Archive)
            .map_err(|e| e.for_unit(archive.display().to_string())),
        Payload::Entries(entries) => {
            let count = entries.len();
            let out = entries
                .into_iter()
                .map(|(name, data)| match transform_unit(&data) {
                    Ok(out) => Ok((name, out)),
                    Err(e) => Err(e.for_unit(format!("{}!{name}", archive.display()))),
                })
                .collect::<ZipvaultResult<EntryMap>>()?;
            tracing::debug!("{direction}ed {count} entries of {}", archive.display());
            Ok(Payload::Entries(out))
        }
    }
}

pub(crate) fn write_atomically(
    target: &Path,
    bytes: &[u8],
    opts: &TransformOptions,
) -> ZipvaultResult<PathBuf> {
    let mut pending = PendingOutput::new(target, &opts.pending_prefix)?.with_sync(opts.sync);
    pending.write(bytes)?;
    pending.commit()
}
