//! Hasher verification against the published Tiger Tree test vectors
//! and the file hashing pipeline

use shareindex::cancel::{CancellationToken, GenerationCounter};
use shareindex::error::HashError;
use shareindex::hasher::hash_file;
use shareindex::tth::{block_count, block_size, hash_bytes, TigerTree};
use shareindex::types::Tth;
use std::fs;
use tempfile::TempDir;

fn tth(text: &str) -> Tth {
    Tth::from_base32(text).unwrap()
}

#[test]
fn test_known_vectors() {
    assert_eq!(
        hash_bytes(b"").root,
        tth("LWPNACQDBZRYXW3VHJVCJ64QBZNGHOHHHZWCLNQ")
    );
    assert_eq!(
        hash_bytes(b"\0").root,
        tth("VK54ZIEEVTWNAUI5D5RDFIL37LX2IQNSTAXFKSA")
    );
    assert_eq!(
        hash_bytes(&[b'A'; 1024]).root,
        tth("L66Q4YVNAFWVS23X2HJIRA5ZJ7WXR3F26RSASFA")
    );
    assert_eq!(
        hash_bytes(&[b'A'; 1025]).root,
        tth("PZMRYHGY6LTBEH63ZWAHDORHSYTLO4LEFUIKHWY")
    );
}

#[test]
fn test_incremental_matches_one_shot() {
    let data: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let mut tree = TigerTree::new(data.len() as u64);
    for chunk in data.chunks(999) {
        tree.update(chunk);
    }
    let streamed = tree.finish();
    assert_eq!(streamed, hash_bytes(&data));
    assert_eq!(
        streamed.blocks.len() as u64,
        block_count(data.len() as u64, block_size(data.len() as u64))
    );
}

#[test]
fn test_block_size_rule() {
    assert_eq!(block_size(0), 1024);
    assert_eq!(block_size(512 * 1024), 1024);
    assert_eq!(block_size(512 * 1024 + 1), 2048);
    assert_eq!(block_size(1024 * 1024 * 1024), 2 * 1024 * 1024);
}

#[test]
fn test_hash_file_matches_in_memory_hash() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bin");
    let data: Vec<u8> = (0..70_000u32).map(|i| (i % 97) as u8).collect();
    fs::write(&path, &data).unwrap();

    let output = hash_file(&path, data.len() as u64, &CancellationToken::noop()).unwrap();
    let expected = hash_bytes(&data);
    assert_eq!(output.tth, expected.root);
    assert_eq!(output.blocks, expected.blocks);
    assert_eq!(output.size, 70_000);
    assert!(output.last_modified > 0);
}

#[test]
fn test_hash_file_detects_size_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bin");
    fs::write(&path, b"12345").unwrap();

    assert!(matches!(
        hash_file(&path, 4, &CancellationToken::noop()),
        Err(HashError::Grew { expected: 4, .. })
    ));
    assert!(matches!(
        hash_file(&path, 6, &CancellationToken::noop()),
        Err(HashError::SizeMismatch { expected: 6, read: 5 })
    ));
    assert!(matches!(
        hash_file(&dir.path().join("missing"), 0, &CancellationToken::noop()),
        Err(HashError::Open { .. })
    ));
}

#[test]
fn test_superseded_job_is_cancelled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.bin");
    fs::write(&path, vec![0u8; 4096]).unwrap();

    let counter = GenerationCounter::new();
    let generation = counter.next_generation();
    let token = counter.token(generation);
    counter.next_generation();
    assert!(matches!(
        hash_file(&path, 4096, &token),
        Err(HashError::Cancelled)
    ));
}
