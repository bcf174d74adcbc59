//! Tests for BlobStore
//!
//! These tests verify:
//! - Round-trip of empty, binary and large payloads
//! - Content addressing and deduplication
//! - Missing and corrupt blob detection
//! - Digest validation before filesystem access

use std::fs;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use zealot::blob::{digest, BlobStore, DIGEST_HEX_LEN};
use zealot::ZealotError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, BlobStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path(), 6, true).unwrap();
    (temp_dir, store)
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn file_count(store: &BlobStore) -> usize {
    fs::read_dir(store.dir()).unwrap().count()
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_put_get_roundtrip() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"hello world").unwrap();

    assert_eq!(store.get(&d).unwrap(), b"hello world".to_vec());
}

#[test]
fn test_put_get_empty_value() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"").unwrap();

    assert_eq!(store.get(&d).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_put_get_binary_value() {
    let (_temp, store) = setup_temp_store();
    let value: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let d = store.put(&value).unwrap();

    assert_eq!(store.get(&d).unwrap(), value);
}

#[test]
fn test_put_get_large_value() {
    let (_temp, store) = setup_temp_store();
    let value: Vec<u8> = (0..4 * 1024 * 1024u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
        .collect();

    let d = store.put(&value).unwrap();

    assert_eq!(store.get(&d).unwrap(), value);
}

// =============================================================================
// Content Addressing Tests
// =============================================================================

#[test]
fn test_put_returns_sha512_hex() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"abc").unwrap();

    assert_eq!(d.len(), DIGEST_HEX_LEN);
    assert_eq!(d, digest(b"abc"));
    assert!(d.starts_with("ddaf35a193617aba"));
}

#[test]
fn test_blob_file_named_by_digest() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"abc").unwrap();

    assert!(store.dir().join(&d).is_file());
    assert!(store.contains(&d));
}

#[test]
fn test_blob_file_is_gzip() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"abc").unwrap();
    let raw = fs::read(store.path(&d).unwrap()).unwrap();

    assert_eq!(&raw[0..2], &[0x1f, 0x8b]);
}

#[test]
fn test_put_same_value_twice_is_noop() {
    let (_temp, store) = setup_temp_store();

    let d1 = store.put(b"same").unwrap();
    let d2 = store.put(b"same").unwrap();

    assert_eq!(d1, d2);
    assert_eq!(file_count(&store), 1);
    assert_eq!(store.digests().unwrap(), vec![d1]);
}

#[test]
fn test_no_temp_files_left_behind() {
    let (_temp, store) = setup_temp_store();

    store.put(b"one").unwrap();
    store.put(b"two").unwrap();

    for entry in fs::read_dir(store.dir()).unwrap() {
        let name = entry.unwrap().file_name().into_string().unwrap();
        assert!(!name.ends_with(".tmp"), "leftover temp file {}", name);
    }
}

#[test]
fn test_digests_ignores_foreign_files() {
    let (temp, store) = setup_temp_store();

    let d = store.put(b"v").unwrap();
    fs::write(temp.path().join("index.db"), b"not a blob").unwrap();
    fs::write(temp.path().join("README"), b"hi").unwrap();

    assert_eq!(store.digests().unwrap(), vec![d]);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_get_missing_blob() {
    let (_temp, store) = setup_temp_store();

    let result = store.get(&digest(b"never stored"));

    assert!(matches!(result, Err(ZealotError::BlobNotFound { .. })));
}

#[test]
fn test_get_not_gzip_is_corrupt() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"payload").unwrap();
    fs::write(store.path(&d).unwrap(), b"definitely not gzip").unwrap();

    assert!(matches!(store.get(&d), Err(ZealotError::CorruptBlob { .. })));
}

#[test]
fn test_get_digest_mismatch_is_corrupt() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"original").unwrap();
    fs::write(store.path(&d).unwrap(), gzip(b"tampered")).unwrap();

    assert!(matches!(store.get(&d), Err(ZealotError::CorruptBlob { .. })));
}

#[test]
fn test_get_digest_mismatch_allowed_without_verification() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path(), 6, false).unwrap();

    let d = store.put(b"original").unwrap();
    fs::write(store.path(&d).unwrap(), gzip(b"tampered")).unwrap();

    assert_eq!(store.get(&d).unwrap(), b"tampered".to_vec());
}

#[test]
fn test_put_repairs_damaged_blob() {
    let (_temp, store) = setup_temp_store();

    let d = store.put(b"payload").unwrap();
    fs::write(store.path(&d).unwrap(), b"garbage").unwrap();

    store.put(b"payload").unwrap();

    assert_eq!(store.get(&d).unwrap(), b"payload".to_vec());
}

#[test]
fn test_invalid_digest_rejected() {
    let (_temp, store) = setup_temp_store();

    let upper = digest(b"x").to_uppercase();

    for bad in ["", "abc", "../index.db", upper.as_str()] {
        assert!(
            matches!(store.get(bad), Err(ZealotError::InvalidDigest(_))),
            "accepted {:?}",
            bad
        );
        assert!(!store.contains(bad));
    }
}

#[test]
fn test_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a").join("b");

    let _store = BlobStore::open(&path, 6, true).unwrap();

    assert!(path.is_dir());
}

#[test]
fn test_put_overwrites_stale_temp_file() {
    let (temp, store) = setup_temp_store();
    let value = b"after a crash mid-write".to_vec();
    let d = digest(&value);
    let tmp = temp.path().join(format!(".{}.tmp", d));
    fs::write(&tmp, vec![0xEE; 4096]).unwrap();

    assert_eq!(store.put(&value).unwrap(), d);

    assert_eq!(store.get(&d).unwrap(), value);
    assert!(!tmp.exists());
}
