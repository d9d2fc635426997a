//! zipvault-crypto: keys and authenticated encryption for archive payloads
//!
//! A key is 32 random bytes stored raw in a file next to the archive
//! (`data.zip` → `data.zip.key`). Every ciphertext unit (a whole archive or a
//! single entry payload) is sealed independently:
//! ```text
//! [1 byte: version][24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```

pub mod cipher;
pub mod keys;

pub use cipher::{decrypt, encrypt, is_sealed, SEAL_OVERHEAD};
pub use keys::{
    backup_key, generate_key, get_or_create_key, load_key, resolve_key_path, save_key,
    ArchiveKey, KeyHandle,
};

/// Size of an archive key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
