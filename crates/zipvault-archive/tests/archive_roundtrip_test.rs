//! End-to-end encrypt/decrypt of real zip files in both granularities.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zipvault_archive::{
    decrypt_archive, decrypt_entries, encrypt_archive, encrypt_entries, unpack, Output, Payload,
    Placement, TransformOptions,
};
use zipvault_core::{CompressionMode, ZipvaultError};
use zipvault_crypto::SEAL_OVERHEAD;

/// `data.zip` with a single entry `test.txt` = "hello".
fn hello_archive(dir: &Path) -> PathBuf {
    write_zip(dir, "data.zip", &[("test.txt", Some(b"hello".as_slice()))])
}

/// Build a zip with the `zip` crate directly. `None` payload = directory.
fn write_zip(dir: &Path, name: &str, entries: &[(&str, Option<&[u8]>)]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    for (entry, payload) in entries {
        match payload {
            Some(bytes) => {
                zip.start_file(*entry, SimpleFileOptions::default())
                    .expect("start file");
                zip.write_all(bytes).expect("write entry");
            }
            None => {
                zip.add_directory(*entry, SimpleFileOptions::default())
                    .expect("add directory");
            }
        }
    }
    zip.finish().expect("finish zip");
    path
}

fn read_entry(archive: &Path, name: &str) -> Vec<u8> {
    let entries = unpack(archive).expect("unpack");
    entries.get(name).cloned().expect("entry present")
}

#[test]
fn whole_archive_scenario() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let original = std::fs::read(&archive).unwrap();
    let opts = TransformOptions::default();

    let outcome = encrypt_archive(&archive, &opts).expect("encrypt");
    assert!(tmp.path().join("data.zip.key").exists());
    assert!(outcome.key_created);

    // Opaque blob: no longer an archive
    let sealed = std::fs::read(&archive).unwrap();
    assert_eq!(sealed.len(), original.len() + SEAL_OVERHEAD);
    assert!(matches!(
        unpack(&archive).unwrap_err(),
        ZipvaultError::ArchiveRead { .. }
    ));

    decrypt_archive(&archive, &opts).expect("decrypt");
    assert_eq!(std::fs::read(&archive).unwrap(), original);
    assert_eq!(read_entry(&archive, "test.txt"), b"hello");
}

#[test]
fn per_entry_scenario() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let opts = TransformOptions::default();

    encrypt_entries(&archive, &opts).expect("encrypt entries");

    // Still a valid archive, payload is ciphertext
    let sealed = read_entry(&archive, "test.txt");
    assert_ne!(sealed, b"hello");
    assert_eq!(sealed.len(), b"hello".len() + SEAL_OVERHEAD);

    decrypt_entries(&archive, &opts).expect("decrypt entries");
    assert_eq!(read_entry(&archive, "test.txt"), b"hello");
}

#[test]
fn per_entry_preserves_names_and_drops_directories() {
    let tmp = TempDir::new().unwrap();
    let archive = write_zip(
        tmp.path(),
        "tree.zip",
        &[
            ("docs/", None),
            ("docs/a.txt", Some(b"alpha".as_slice())),
            ("docs/sub/", None),
            ("docs/sub/b.bin", Some([0u8, 1, 2, 3, 255].as_slice())),
            ("root.txt", Some(b"".as_slice())),
        ],
    );
    let opts = TransformOptions::default().compression(CompressionMode::Stored);

    encrypt_entries(&archive, &opts).unwrap();
    decrypt_entries(&archive, &opts).unwrap();

    let entries = unpack(&archive).unwrap();
    let names: Vec<&str> = entries.keys().map(String::as_str).collect();
    assert_eq!(names, ["docs/a.txt", "docs/sub/b.bin", "root.txt"]);
    assert_eq!(entries["docs/a.txt"], b"alpha");
    assert_eq!(entries["docs/sub/b.bin"], [0u8, 1, 2, 3, 255]);
    assert!(entries["root.txt"].is_empty());
}

#[test]
fn per_entry_roundtrip_every_compression_mode() {
    for mode in [
        CompressionMode::Stored,
        CompressionMode::Deflated,
        CompressionMode::Bzip2,
        CompressionMode::Zstd,
    ] {
        let tmp = TempDir::new().unwrap();
        let archive = hello_archive(tmp.path());
        let opts = TransformOptions::default().compression(mode);

        encrypt_entries(&archive, &opts).unwrap();
        decrypt_entries(&archive, &opts).unwrap();
        assert_eq!(read_entry(&archive, "test.txt"), b"hello", "mode {mode}");
    }
}

#[test]
fn alongside_writes_named_artifacts() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let original = std::fs::read(&archive).unwrap();
    let opts = TransformOptions::default().placement(Placement::Alongside);

    let enc = encrypt_archive(&archive, &opts).unwrap();
    let cipher_path = tmp.path().join("cipher_data.zip");
    assert!(matches!(&enc.output, Output::Written(p) if *p == cipher_path));
    // Source untouched
    assert_eq!(std::fs::read(&archive).unwrap(), original);

    // Decrypt the artifact using the key that belongs to data.zip
    let dec_opts = opts.clone().key_path(tmp.path().join("data.zip.key"));
    let dec = decrypt_archive(&cipher_path, &dec_opts).unwrap();
    let plain_path = tmp.path().join("plain_cipher_data.zip");
    assert!(matches!(&dec.output, Output::Written(p) if *p == plain_path));
    assert_eq!(std::fs::read(&plain_path).unwrap(), original);
}

#[test]
fn memory_decrypt_of_whole_archive() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let original = std::fs::read(&archive).unwrap();
    let opts = TransformOptions::default();

    encrypt_archive(&archive, &opts).unwrap();
    let sealed = std::fs::read(&archive).unwrap();

    let outcome = decrypt_archive(&archive, &opts.clone().placement(Placement::Memory)).unwrap();
    let Output::Memory(payload) = outcome.output else {
        panic!("expected in-memory output");
    };
    assert_eq!(payload, Payload::Archive(original));
    assert_eq!(payload.into_entries().unwrap()["test.txt"], b"hello");

    // Nothing written: archive still sealed, no pending file
    assert_eq!(std::fs::read(&archive).unwrap(), sealed);
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
}

#[test]
fn key_directory_override() {
    let tmp = TempDir::new().unwrap();
    let keys = tmp.path().join("keys");
    std::fs::create_dir(&keys).unwrap();
    let archive = hello_archive(tmp.path());
    let opts = TransformOptions::default().key_path(&keys);

    let outcome = encrypt_entries(&archive, &opts).unwrap();
    assert_eq!(outcome.key_path, keys.join("data.zip.key"));
    assert!(!tmp.path().join("data.zip.key").exists());

    decrypt_entries(&archive, &opts).unwrap();
    assert_eq!(read_entry(&archive, "test.txt"), b"hello");
}

#[test]
fn existing_key_is_reused_unless_rotated() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let key_path = tmp.path().join("data.zip.key");
    let opts = TransformOptions::default();

    encrypt_entries(&archive, &opts).unwrap();
    decrypt_entries(&archive, &opts).unwrap();
    let first_key = std::fs::read(&key_path).unwrap();

    let again = encrypt_entries(&archive, &opts).unwrap();
    assert!(!again.key_created);
    assert_eq!(std::fs::read(&key_path).unwrap(), first_key);
    decrypt_entries(&archive, &opts).unwrap();

    let rotated = encrypt_entries(&archive, &opts.clone().rotate_key(true)).unwrap();
    assert!(rotated.key_created);
    assert_ne!(std::fs::read(&key_path).unwrap(), first_key);
    decrypt_entries(&archive, &opts).unwrap();
    assert_eq!(read_entry(&archive, "test.txt"), b"hello");
}

#[test]
fn rotating_encrypt_on_sealed_archive_keeps_inner_key() {
    let tmp = TempDir::new().unwrap();
    let archive = hello_archive(tmp.path());
    let original = std::fs::read(&archive).unwrap();
    let opts = TransformOptions::default();

    encrypt_archive(&archive, &opts).unwrap();
    // Sealed a second time under a fresh key
    encrypt_archive(&archive, &opts.clone().rotate_key(true)).unwrap();

    let backup = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.to_string_lossy().contains("data.zip.key.bak."))
        .expect("previous key backed up");

    decrypt_archive(&archive, &opts).unwrap();
    decrypt_archive(&archive, &opts.clone().key_path(&backup)).unwrap();
    assert_eq!(std::fs::read(&archive).unwrap(), original);
}
