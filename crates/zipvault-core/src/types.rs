use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Compression method used for entries written into a new archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// No compression
    Stored,
    /// DEFLATE (the zip default)
    #[default]
    Deflated,
    Bzip2,
    Zstd,
}

impl CompressionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::Stored => "stored",
            CompressionMode::Deflated => "deflated",
            CompressionMode::Bzip2 => "bzip2",
            CompressionMode::Zstd => "zstd",
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stored" | "store" | "none" => Ok(CompressionMode::Stored),
            "deflated" | "deflate" => Ok(CompressionMode::Deflated),
            "bzip2" => Ok(CompressionMode::Bzip2),
            "zstd" => Ok(CompressionMode::Zstd),
            other => Err(format!(
                "unknown compression mode '{other}' (expected stored, deflated, bzip2 or zstd)"
            )),
        }
    }
}

/// What a single ciphertext unit covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// The raw bytes of the whole archive file are one opaque unit.
    /// Output is no longer a valid archive.
    WholeArchive,
    /// Each entry payload is its own unit. Archive structure (entry names,
    /// counts) stays readable.
    PerEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    /// Filename prefix of the separately named artifact written when the
    /// result does not replace the archive in place.
    pub fn artifact_prefix(&self) -> &'static str {
        match self {
            Direction::Encrypt => "cipher_",
            Direction::Decrypt => "plain_",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => f.write_str("encrypt"),
            Direction::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Operation name used in logs, e.g. `encrypt_archive` or `decrypt_entries`.
pub fn operation_name(direction: Direction, granularity: Granularity) -> &'static str {
    match (direction, granularity) {
        (Direction::Encrypt, Granularity::WholeArchive) => "encrypt_archive",
        (Direction::Decrypt, Granularity::WholeArchive) => "decrypt_archive",
        (Direction::Encrypt, Granularity::PerEntry) => "encrypt_entries",
        (Direction::Decrypt, Granularity::PerEntry) => "decrypt_entries",
    }
}
