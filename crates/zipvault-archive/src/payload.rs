//! Archive payload extraction: zip file ⇄ in-memory entry map
//!
//! Directory entries carry no payload and are dropped on unpack; they are
//! not recreated on pack (entry names keep their full path, so the tree is
//! still implied).

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};
use zipvault_core::{CompressionMode, ZipvaultError, ZipvaultResult};

/// Entry name → full payload. Ordered so packing is deterministic.
pub type EntryMap = BTreeMap<String, Vec<u8>>;

/// Upper bound on buffer space reserved from an entry's declared size. The
/// header is untrusted; larger payloads grow the buffer as they are read.
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

/// Read every non-directory entry of the archive at `path`.
pub fn unpack(path: &Path) -> ZipvaultResult<EntryMap> {
    let file = File::open(path).map_err(|e| ZipvaultError::io("opening archive", path, e))?;
    unpack_reader(BufReader::new(file), path)
}

/// Read every non-directory entry of an archive held in memory.
pub fn unpack_bytes(bytes: &[u8]) -> ZipvaultResult<EntryMap> {
    unpack_reader(Cursor::new(bytes), Path::new("<memory>"))
}

fn unpack_reader<R: Read + Seek>(reader: R, path: &Path) -> ZipvaultResult<EntryMap> {
    let malformed = |reason: String| ZipvaultError::ArchiveRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut archive = ZipArchive::new(reader).map_err(|e| malformed(e.to_string()))?;
    let mut entries = EntryMap::new();

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| malformed(format!("entry #{index}: {e}")))?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut payload = Vec::with_capacity(file.size().min(PREALLOC_LIMIT) as usize);
        file.read_to_end(&mut payload)
            .map_err(|e| malformed(format!("entry '{name}': {e}")))?;

        if entries.insert(name.clone(), payload).is_some() {
            tracing::warn!("duplicate entry '{name}' in {}, keeping the last one", path.display());
        }
    }

    tracing::debug!("unpacked {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Write `entries` into a brand-new archive at `destination`.
///
/// `destination` must not exist yet; this never rewrites an archive that
/// may still be open for reading. A partially written file is removed on
/// failure.
pub fn pack(
    entries: &EntryMap,
    destination: &Path,
    compression: CompressionMode,
) -> ZipvaultResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| ZipvaultError::io("creating archive", destination, e))?;

    let result = write_entries(entries, file, compression, destination).and_then(|file| {
        file.sync_all()
            .map_err(|e| ZipvaultError::io("syncing archive", destination, e))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(destination);
    }
    result
}

/// Build a complete archive in memory.
pub fn pack_to_vec(entries: &EntryMap, compression: CompressionMode) -> ZipvaultResult<Vec<u8>> {
    let cursor = write_entries(
        entries,
        Cursor::new(Vec::new()),
        compression,
        Path::new("<memory>"),
    )?;
    Ok(cursor.into_inner())
}

fn write_entries<W: Write + Seek>(
    entries: &EntryMap,
    writer: W,
    compression: CompressionMode,
    path: &Path,
) -> ZipvaultResult<W> {
    let failed = |reason: String| ZipvaultError::ArchiveWrite {
        path: path.to_path_buf(),
        reason,
    };

    let method = compression_method(compression);
    let mut zip = ZipWriter::new(writer);

    for (name, payload) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .large_file(payload.len() as u64 >= u32::MAX as u64);
        zip.start_file(name.as_str(), options)
            .map_err(|e| failed(format!("entry '{name}': {e}")))?;
        zip.write_all(payload)
            .map_err(|e| failed(format!("entry '{name}': {e}")))?;
    }

    zip.finish().map_err(|e| failed(e.to_string()))
}

fn compression_method(mode: CompressionMode) -> CompressionMethod {
    match mode {
        CompressionMode::Stored => CompressionMethod::Stored,
        CompressionMode::Deflated => CompressionMethod::Deflated,
        CompressionMode::Bzip2 => CompressionMethod::Bzip2,
        CompressionMode::Zstd => CompressionMethod::Zstd,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> EntryMap {
        let mut entries = EntryMap::new();
        entries.insert("test.txt".into(), b"hello".to_vec());
        entries.insert("docs/readme.md".into(), b"# readme\n".repeat(50));
        entries.insert("empty.bin".into(), Vec::new());
        entries
    }

    #[test]
    fn test_pack_unpack_roundtrip_all_modes() {
        let tmp = TempDir::new().unwrap();
        for mode in [
            CompressionMode::Stored,
            CompressionMode::Deflated,
            CompressionMode::Bzip2,
            CompressionMode::Zstd,
        ] {
            let path = tmp.path().join(format!("{mode}.zip"));
            pack(&sample(), &path, mode).unwrap();
            assert_eq!(unpack(&path).unwrap(), sample(), "mode {mode}");
        }
    }

    #[test]
    fn test_pack_refuses_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("exists.zip");
        std::fs::write(&path, b"keep me").unwrap();

        let err = pack(&sample(), &path, CompressionMode::Deflated).unwrap_err();
        assert!(matches!(err, ZipvaultError::Io { .. }), "got: {err}");
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_unpack_skips_directories() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.add_directory("nested/", SimpleFileOptions::default())
            .unwrap();
        zip.start_file("nested/a.txt", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"a").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let entries = unpack_bytes(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries["nested/a.txt"], b"a");
    }

    #[test]
    fn test_unpack_malformed_is_archive_read() {
        let err = unpack_bytes(b"this is not a zip file").unwrap_err();
        assert!(matches!(err, ZipvaultError::ArchiveRead { .. }), "got: {err}");
    }

    #[test]
    fn test_unpack_oversized_declared_length_does_not_panic() {
        let payload = vec![0x5au8; 777];
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        zip.start_file("big.bin", options).unwrap();
        zip.write_all(&payload).unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();

        // Zip64 extra fields (tag 0x0001) open with the uncompressed size
        let declared = (payload.len() as u64).to_le_bytes();
        let mut patched = 0;
        for i in 0..bytes.len().saturating_sub(12) {
            if bytes[i..i + 2] == [0x01, 0x00] && bytes[i + 4..i + 12] == declared {
                bytes[i + 4..i + 12].copy_from_slice(&u64::MAX.to_le_bytes());
                patched += 1;
            }
        }
        assert!(patched > 0, "no zip64 size field found");

        match unpack_bytes(&bytes) {
            Ok(_) | Err(ZipvaultError::ArchiveRead { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_unpack_missing_file_is_io() {
        let tmp = TempDir::new().unwrap();
        let err = unpack(&tmp.path().join("nope.zip")).unwrap_err();
        assert!(matches!(err, ZipvaultError::Io { .. }));
    }

    #[test]
    fn test_pack_to_vec_empty_archive() {
        let bytes = pack_to_vec(&EntryMap::new(), CompressionMode::Deflated).unwrap();
        assert!(unpack_bytes(&bytes).unwrap().is_empty());
    }
}
