//! zipvault-archive: encrypt and decrypt zip archives with crash-safe writes
//!
//! # Overview
//! - `payload`: zip file ⇄ `EntryMap` (entry name → bytes), directories skipped
//! - `engine`: whole-archive and per-entry encryption/decryption
//! - `replace`: pending-file-then-rename replacement of the output
//! - `rekey`: rotate the key of an already encrypted archive

pub mod engine;
pub mod payload;
pub mod rekey;
pub mod replace;

// Convenience re-exports for the most common operations
pub use engine::{
    decrypt_archive, decrypt_entries, encrypt_archive, encrypt_entries, transform, Output,
    Payload, Placement, TransformOptions, TransformOutcome,
};
pub use payload::{pack, pack_to_vec, unpack, unpack_bytes, EntryMap};
pub use rekey::{rekey, RekeyOutcome};
pub use replace::{discard_orphan, pending_path, replace_file, PendingOutput, ReplaceState};
