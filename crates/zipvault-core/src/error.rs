use std::path::PathBuf;

use thiserror::Error;

pub type ZipvaultResult<T> = Result<T, ZipvaultError>;

#[derive(Debug, Error)]
pub enum ZipvaultError {
    #[error("key not found: {}", path.display())]
    KeyNotFound { path: PathBuf },

    #[error("invalid key file {}: {len} bytes (expected {expected})", path.display())]
    InvalidKey {
        path: PathBuf,
        len: usize,
        expected: usize,
    },

    /// Authentication failed: wrong key, corrupted or truncated data, or data
    /// that was never sealed by this tool.
    #[error("decryption failed for {unit}: invalid key or corrupted data")]
    DecryptionFailed { unit: String },

    #[error("encryption failed for {unit}")]
    EncryptionFailed { unit: String },

    #[error("cannot read archive {}: {reason}", path.display())]
    ArchiveRead { path: PathBuf, reason: String },

    #[error("cannot write archive {}: {reason}", path.display())]
    ArchiveWrite { path: PathBuf, reason: String },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ZipvaultError {
    /// Wrap an I/O error with the operation and path it came from.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Name a failing ciphertext unit in a `DecryptionFailed` error.
    ///
    /// Used when a low-level decrypt error surfaces inside a loop that knows
    /// which archive or entry it was working on.
    pub fn for_unit(self, unit: impl Into<String>) -> Self {
        match self {
            Self::DecryptionFailed { .. } => Self::DecryptionFailed { unit: unit.into() },
            Self::EncryptionFailed { .. } => Self::EncryptionFailed { unit: unit.into() },
            other => other,
        }
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    pub fn is_decryption_failed(&self) -> bool {
        matches!(self, Self::DecryptionFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_unit_renames_decrypt_failure() {
        let err = ZipvaultError::DecryptionFailed {
            unit: "ciphertext".into(),
        }
        .for_unit("docs/readme.txt");

        assert!(err.is_decryption_failed());
        assert!(err.to_string().contains("docs/readme.txt"));
    }

    #[test]
    fn test_for_unit_leaves_other_errors_alone() {
        let err = ZipvaultError::KeyNotFound {
            path: PathBuf::from("/tmp/data.zip.key"),
        }
        .for_unit("entry");

        assert!(err.is_key_not_found());
        assert_eq!(err.to_string(), "key not found: /tmp/data.zip.key");
    }

    #[test]
    fn test_io_error_carries_context() {
        let err = ZipvaultError::io(
            "reading archive",
            "/data/a.zip",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("reading archive /data/a.zip"), "{msg}");
    }
}
