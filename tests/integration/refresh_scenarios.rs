//! End-to-end refresh scenarios against real directories

use crate::integration::test_utils::{
    drain, failed_paths, finished_generations, hashed_paths, test_config, write_file, WAIT,
};
use shareindex::refresh::{RefreshCoordinator, RefreshState, RefreshTarget};
use shareindex::store::{HashStore, SledHashCache};
use shareindex::tth::hash_bytes;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn child_names(coordinator: &RefreshCoordinator, path: &str) -> Vec<String> {
    let tree = coordinator.tree();
    let dir = tree.find_by_path(path).unwrap();
    tree.children(dir)
        .iter()
        .map(|id| tree.get(*id).unwrap().name().to_string())
        .collect()
}

fn refresh_all(coordinator: &mut RefreshCoordinator) -> u64 {
    let generation = coordinator.refresh(RefreshTarget::All).unwrap();
    assert!(coordinator.wait_idle(WAIT), "refresh did not finish in time");
    generation
}

#[test]
fn test_first_refresh_hashes_everything() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "a.txt", b"abc");
    write_file(share.path(), "b.txt", b"");

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);

    let tree = coordinator.tree();
    let root = tree.find_by_path("/s").unwrap();
    let root_node = tree.get(root).unwrap();
    assert_eq!(root_node.size(), 3);
    assert_eq!(root_node.has_hash(), 2);
    assert!(root_node.is_complete());

    let a = tree.get(tree.find_by_path("/s/a.txt").unwrap()).unwrap();
    assert_eq!(a.tth(), Some(hash_bytes(b"abc").root));
    let b = tree.get(tree.find_by_path("/s/b.txt").unwrap()).unwrap();
    assert_eq!(b.tth(), Some(hash_bytes(b"").root));

    let events = drain(&notifications);
    assert_eq!(hashed_paths(&events), vec!["/s/a.txt", "/s/b.txt"]);
    assert_eq!(coordinator.cache_len(), 2);
    assert!(data.path().join("files.xml").exists());
    assert!(tree.validate().is_empty());
}

#[test]
fn test_rescan_merges_added_and_removed_files() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    for name in ["a", "b", "d", "f"] {
        write_file(share.path(), name, format!("contents of {}", name).as_bytes());
    }

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    refresh_all(&mut coordinator);
    let old_a = coordinator
        .node(coordinator.lookup_path("/s/a").unwrap())
        .unwrap()
        .tth()
        .unwrap();
    let b_before = coordinator.lookup_path("/s/b").unwrap();

    fs::remove_file(share.path().join("a")).unwrap();
    fs::remove_file(share.path().join("f")).unwrap();
    write_file(share.path(), "c", b"contents of c");
    write_file(share.path(), "e", b"contents of e");

    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);

    assert_eq!(child_names(&coordinator, "/s"), vec!["b", "c", "d", "e"]);
    assert_eq!(hashed_paths(&drain(&notifications)), vec!["/s/c", "/s/e"]);
    // Unchanged files keep their node
    assert_eq!(coordinator.lookup_path("/s/b"), Some(b_before));
    assert!(coordinator.lookup_tth(&old_a).is_empty());
    assert_eq!(coordinator.hash_tree(&old_a).unwrap(), None);
    assert_eq!(coordinator.cache_len(), 4);
    assert!(coordinator.tree().validate().is_empty());
}

#[test]
fn test_changed_file_is_rehashed() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "dir/song.flac", b"first version");

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    refresh_all(&mut coordinator);
    let old = hash_bytes(b"first version").root;
    assert_eq!(coordinator.lookup_tth(&old).len(), 1);

    write_file(share.path(), "dir/song.flac", b"second, longer version");
    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);

    assert_eq!(hashed_paths(&drain(&notifications)), vec!["/s/dir/song.flac"]);
    let new = hash_bytes(b"second, longer version").root;
    assert_eq!(coordinator.lookup_tth(&new).len(), 1);
    assert!(coordinator.lookup_tth(&old).is_empty());
    assert_eq!(coordinator.hash_tree(&old).unwrap(), None);
    let dir = coordinator.lookup_path("/s/dir").unwrap();
    assert_eq!(coordinator.node(dir).unwrap().size(), 22);
}

#[test]
fn test_file_deleted_before_hashing_fails_and_refresh_completes() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "keep.txt", b"keep");
    let doomed = write_file(share.path(), "gone.txt", b"gone soon");

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    let notifications = coordinator.subscribe();
    coordinator.refresh(RefreshTarget::All).unwrap();

    // The scan result waits in the channel until the control thread handles it
    std::thread::sleep(Duration::from_secs(1));
    fs::remove_file(&doomed).unwrap();
    assert!(coordinator.wait_idle(WAIT));

    let events = drain(&notifications);
    assert_eq!(failed_paths(&events), vec!["/s/gone.txt"]);
    assert_eq!(hashed_paths(&events), vec!["/s/keep.txt"]);
    assert_eq!(coordinator.status().failed, 1);
    assert_eq!(coordinator.status().state, RefreshState::Idle);

    // The stale entry disappears on the next scan
    refresh_all(&mut coordinator);
    assert_eq!(child_names(&coordinator, "/s"), vec!["keep.txt"]);
}

#[test]
fn test_new_refresh_discards_stale_hash_results() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    let big: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    write_file(share.path(), "big.bin", &big);

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    let notifications = coordinator.subscribe();
    let first = coordinator.refresh(RefreshTarget::All).unwrap();

    let deadline = Instant::now() + WAIT;
    while coordinator.status().state != RefreshState::Hashing {
        assert!(Instant::now() < deadline, "scan never finished");
        coordinator.process_pending();
        std::thread::sleep(Duration::from_millis(5));
    }

    let second = coordinator.refresh(RefreshTarget::All).unwrap();
    assert!(second > first);
    assert!(coordinator.wait_idle(WAIT));

    let events = drain(&notifications);
    assert_eq!(finished_generations(&events), vec![second]);
    let id = coordinator.lookup_path("/s/big.bin").unwrap();
    assert_eq!(coordinator.node(id).unwrap().tth(), Some(hash_bytes(&big).root));
    assert_eq!(coordinator.cache_len(), 1);
}

#[test]
fn test_refresh_without_changes_queues_nothing() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "one.txt", b"1");
    write_file(share.path(), "sub/two.txt", b"22");

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    refresh_all(&mut coordinator);
    let before = coordinator.lookup_path("/s/sub/two.txt");

    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);
    let events = drain(&notifications);
    assert!(hashed_paths(&events).is_empty());
    assert_eq!(coordinator.status().hashed, 0);
    assert_eq!(coordinator.lookup_path("/s/sub/two.txt"), before);
}

#[test]
fn test_refresh_single_directory() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "top.txt", b"top");
    write_file(share.path(), "sub/inner.txt", b"inner");

    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("s", share.path())])).unwrap();
    refresh_all(&mut coordinator);

    write_file(share.path(), "sub/new.txt", b"new");
    write_file(share.path(), "also-new.txt", b"not picked up");
    let notifications = coordinator.subscribe();
    coordinator
        .refresh(RefreshTarget::Path("/s/sub".to_string()))
        .unwrap();
    assert!(coordinator.wait_idle(WAIT));

    assert_eq!(hashed_paths(&drain(&notifications)), vec!["/s/sub/new.txt"]);
    assert!(coordinator.lookup_path("/s/also-new.txt").is_none());
    assert_eq!(child_names(&coordinator, "/s/sub"), vec!["inner.txt", "new.txt"]);
    let root = coordinator.lookup_path("/s").unwrap();
    assert_eq!(coordinator.node(root).unwrap().size(), 11);
}

#[test]
fn test_restart_restores_tree_and_skips_rehash() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "x/y.dat", b"payload");
    let config = test_config(data.path(), &[("s", share.path())]);

    {
        let mut coordinator = RefreshCoordinator::open(config.clone()).unwrap();
        refresh_all(&mut coordinator);
        coordinator.flush().unwrap();
    }

    let mut coordinator = RefreshCoordinator::open(config).unwrap();
    assert!(!coordinator.needs_full_refresh());
    let id = coordinator.lookup_path("/s/x/y.dat").unwrap();
    assert_eq!(
        coordinator.node(id).unwrap().tth(),
        Some(hash_bytes(b"payload").root)
    );
    assert_eq!(coordinator.cache_len(), 1);

    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);
    assert!(hashed_paths(&drain(&notifications)).is_empty());
}

#[test]
fn test_restart_with_compressed_file_lists_keeps_hashes() {
    for file_list in ["files.xml.bz2", "files.xml.zst"] {
        let data = TempDir::new().unwrap();
        let share = TempDir::new().unwrap();
        write_file(share.path(), "docs/readme.txt", b"read me");
        let mut config = test_config(data.path(), &[("s", share.path())]);
        config.storage.file_list = PathBuf::from(file_list);

        {
            let mut coordinator = RefreshCoordinator::open(config.clone()).unwrap();
            refresh_all(&mut coordinator);
            assert_eq!(coordinator.cache_len(), 1);
        }

        let mut coordinator = RefreshCoordinator::open(config).unwrap();
        assert!(!coordinator.needs_full_refresh(), "{} was not reloaded", file_list);
        assert_eq!(coordinator.cache_len(), 1);
        let id = coordinator.lookup_path("/s/docs/readme.txt").unwrap();
        assert_eq!(
            coordinator.node(id).unwrap().tth(),
            Some(hash_bytes(b"read me").root)
        );

        let notifications = coordinator.subscribe();
        refresh_all(&mut coordinator);
        assert!(hashed_paths(&drain(&notifications)).is_empty());
    }
}

#[test]
fn test_restart_clears_hashes_missing_from_cache() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "a.txt", b"aaa");
    write_file(share.path(), "b.txt", b"bbbb");
    let config = test_config(data.path(), &[("s", share.path())]);

    {
        let mut coordinator = RefreshCoordinator::open(config.clone()).unwrap();
        refresh_all(&mut coordinator);
    }
    {
        let cache = SledHashCache::open(config.storage.hash_cache_path()).unwrap();
        cache.delete(&hash_bytes(b"aaa").root).unwrap();
        cache.flush().unwrap();
    }

    let mut coordinator = RefreshCoordinator::open(config).unwrap();
    let a = coordinator.lookup_path("/s/a.txt").unwrap();
    let b = coordinator.lookup_path("/s/b.txt").unwrap();
    assert_eq!(coordinator.node(a).unwrap().tth(), None);
    assert!(coordinator.node(b).unwrap().tth().is_some());
    assert!(!coordinator.node(coordinator.lookup_path("/s").unwrap()).unwrap().is_complete());

    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);
    assert_eq!(hashed_paths(&drain(&notifications)), vec!["/s/a.txt"]);
}

#[test]
fn test_unconfigured_share_is_dropped_on_restart() {
    let data = TempDir::new().unwrap();
    let keep = TempDir::new().unwrap();
    let old = TempDir::new().unwrap();
    write_file(keep.path(), "k", b"k");
    write_file(old.path(), "o", b"o");

    {
        let config = test_config(data.path(), &[("keep", keep.path()), ("old", old.path())]);
        let mut coordinator = RefreshCoordinator::open(config).unwrap();
        refresh_all(&mut coordinator);
        assert_eq!(coordinator.cache_len(), 2);
    }

    let coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("keep", keep.path())])).unwrap();
    assert_eq!(child_names(&coordinator, "/"), vec!["keep"]);
    assert!(coordinator.lookup_tth(&hash_bytes(b"o").root).is_empty());
    assert_eq!(coordinator.cache_len(), 1);
}

#[test]
fn test_corrupt_file_list_resets_index() {
    let data = TempDir::new().unwrap();
    let share = TempDir::new().unwrap();
    write_file(share.path(), "a.txt", b"abc");
    let config = test_config(data.path(), &[("s", share.path())]);

    {
        let mut coordinator = RefreshCoordinator::open(config.clone()).unwrap();
        refresh_all(&mut coordinator);
    }
    fs::write(data.path().join("files.xml"), "<FileListing Version=\"1\"><Directory").unwrap();

    let mut coordinator = RefreshCoordinator::open(config).unwrap();
    assert!(coordinator.needs_full_refresh());
    assert!(coordinator.tree().is_empty());
    assert_eq!(coordinator.cache_len(), 0);

    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);
    assert!(!coordinator.needs_full_refresh());
    assert_eq!(hashed_paths(&drain(&notifications)), vec!["/s/a.txt"]);
}

#[test]
fn test_missing_share_directory_reports_scan_failure() {
    let data = TempDir::new().unwrap();
    let missing = data.path().join("does-not-exist");
    let mut coordinator =
        RefreshCoordinator::open(test_config(data.path(), &[("gone", &missing)])).unwrap();
    let notifications = coordinator.subscribe();
    refresh_all(&mut coordinator);

    let events = drain(&notifications);
    assert!(events.iter().any(|n| matches!(
        n,
        shareindex::refresh::Notification::ScanFailed { path, .. } if path == "/gone"
    )));
    assert!(coordinator.share_root("gone").is_none());
}
