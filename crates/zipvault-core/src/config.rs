use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ZipvaultError, ZipvaultResult};
use crate::types::CompressionMode;

/// Top-level configuration (loaded from zipvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipvaultConfig {
    pub log: LogConfig,
    pub archive: ArchiveConfig,
    pub keys: KeyConfig,
    pub output: OutputConfig,
}

impl ZipvaultConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> ZipvaultResult<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ZipvaultError::io("reading config", path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ZipvaultError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make writes unsafe.
    pub fn validate(&self) -> ZipvaultResult<()> {
        let prefix = &self.output.pending_prefix;
        if prefix.is_empty() {
            return Err(ZipvaultError::Config(
                "output.pending_prefix must not be empty".into(),
            ));
        }
        if prefix.chars().any(std::path::is_separator) {
            return Err(ZipvaultError::Config(format!(
                "output.pending_prefix must not contain a path separator: {prefix:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info). `RUST_LOG` takes precedence.
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Compression method for archives rebuilt in per-entry mode
    pub compression: CompressionMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Default key location: a directory (key file named `<archive>.key`
    /// inside it) or a full key file path. Unset: next to the archive.
    pub key_dir: Option<PathBuf>,
    /// Generate a fresh key on every encrypt; the previous key file is
    /// backed up first
    pub rotate_on_encrypt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Filename prefix of the side-by-side pending file
    pub pending_prefix: String,
    /// fsync the pending file before it replaces the target
    pub sync: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pending_prefix: ".zipvault-pending.".into(),
            sync: true,
        }
    }
}
