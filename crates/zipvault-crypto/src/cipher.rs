//! XChaCha20-Poly1305 sealing of a single ciphertext unit
//!
//! Sealed format (binary):
//! ```text
//! [1 byte: version = 0x01][24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! The version byte is passed as AAD so a unit cannot be relabelled as a
//! different format without failing authentication. A sealed unit is exactly
//! [`SEAL_OVERHEAD`] bytes longer than its plaintext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zipvault_core::{ZipvaultError, ZipvaultResult};

use crate::keys::ArchiveKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Current sealed-unit format version.
pub const FORMAT_VERSION: u8 = 0x01;

/// Bytes added to every plaintext: version + nonce + tag.
pub const SEAL_OVERHEAD: usize = 1 + NONCE_SIZE + TAG_SIZE;

/// Seal `plaintext` under `key`.
///
/// Returns: `[version][24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(key: &ArchiveKey, plaintext: &[u8]) -> ZipvaultResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: &[FORMAT_VERSION],
            },
        )
        .map_err(|_| ZipvaultError::EncryptionFailed {
            unit: "payload".into(),
        })?;

    let mut result = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
    result.push(FORMAT_VERSION);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open a unit produced by [`encrypt`].
///
/// Any failure (short input, unknown version, wrong key, tampering) is
/// reported as [`ZipvaultError::DecryptionFailed`].
pub fn decrypt(key: &ArchiveKey, sealed: &[u8]) -> ZipvaultResult<Vec<u8>> {
    let failed = || ZipvaultError::DecryptionFailed {
        unit: "ciphertext".into(),
    };

    if !is_sealed(sealed) {
        return Err(failed());
    }

    let (nonce_bytes, ciphertext) = sealed[1..].split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: &[FORMAT_VERSION],
            },
        )
        .map_err(|_| failed())
}

/// Structural check: long enough and carrying a known version byte.
///
/// This does not authenticate anything; only [`decrypt`] does.
pub fn is_sealed(bytes: &[u8]) -> bool {
    bytes.len() >= SEAL_OVERHEAD && bytes[0] == FORMAT_VERSION
}
