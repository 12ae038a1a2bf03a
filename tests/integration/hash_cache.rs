//! Hash cache persistence through the public store interface

use shareindex::error::StorageError;
use shareindex::store::{HashInfo, HashStore, SledHashCache};
use shareindex::tth::{block_size, hash_bytes};
use tempfile::TempDir;

fn record(data: &[u8], mtime: u64) -> (shareindex::types::Tth, HashInfo, Vec<shareindex::types::Tth>) {
    let hashed = hash_bytes(data);
    let info = HashInfo {
        last_modified: mtime,
        size: data.len() as u64,
        block_size: hashed.block_size,
    };
    (hashed.root, info, hashed.blocks)
}

#[test]
fn test_multi_block_record_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hashdata.sled");
    let data = vec![0x5Au8; 3000];
    let (tth, info, blocks) = record(&data, 1_700_000_000);
    assert_eq!(info.block_size, block_size(3000));
    assert_eq!(blocks.len(), 3);

    {
        let cache = SledHashCache::open(&path).unwrap();
        cache.store(&tth, &info, &blocks).unwrap();
        cache.flush().unwrap();
    }

    let cache = SledHashCache::open(&path).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_info(&tth).unwrap(), Some(info));
    assert_eq!(cache.get_blocks(&tth).unwrap(), Some(blocks));
}

#[test]
fn test_store_rejects_inconsistent_blocks() {
    let dir = TempDir::new().unwrap();
    let cache = SledHashCache::open(dir.path().join("cache")).unwrap();
    let (tth, info, mut blocks) = record(&[1u8; 2048], 1);
    blocks.pop();
    assert!(matches!(
        cache.store(&tth, &info, &blocks),
        Err(StorageError::Corrupt(_))
    ));
    assert!(cache.is_empty());
    assert_eq!(cache.get_info(&tth).unwrap(), None);
}

#[test]
fn test_delete_and_recreate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache");
    let (a, a_info, a_blocks) = record(b"first", 5);
    let (b, b_info, b_blocks) = record(b"second", 6);

    {
        let cache = SledHashCache::open(&path).unwrap();
        cache.store(&a, &a_info, &a_blocks).unwrap();
        cache.store(&b, &b_info, &b_blocks).unwrap();
        cache.delete(&a).unwrap();
        // Deleting twice is fine
        cache.delete(&a).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_blocks(&a).unwrap(), None);
    }

    let cache = SledHashCache::recreate(&path).unwrap();
    assert!(cache.is_empty());
    assert_eq!(cache.get_info(&b).unwrap(), None);
}
