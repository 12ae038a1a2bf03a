//! File list save/load through every supported compression

use shareindex::error::{FileListError, FormatError};
use shareindex::filelist;
use shareindex::tree::{FileTree, Node, NodeKind};
use shareindex::tth::hash_bytes;
use tempfile::TempDir;

fn sample_tree() -> FileTree {
    let mut tree = FileTree::new();
    let music = tree.insert(tree.root(), Node::directory("music")).unwrap();
    let album = tree.insert(music, Node::directory("Album & Co")).unwrap();
    tree.insert(
        album,
        Node::hashed_file("01 <intro>.flac", 3, 10, hash_bytes(b"abc").root),
    )
    .unwrap();
    tree.insert(album, Node::hashed_file("empty", 0, 10, hash_bytes(b"").root))
        .unwrap();
    // Not hashed yet: dropped from the document, parent flagged incomplete
    tree.insert(music, Node::file("pending.wav", 100, 10)).unwrap();
    tree.insert(tree.root(), Node::directory("docs")).unwrap();
    tree
}

fn describe(tree: &FileTree) -> Vec<(String, u64, bool)> {
    tree.walk(tree.root())
        .into_iter()
        .map(|id| {
            let node = tree.get(id).unwrap();
            let incomplete = matches!(node.kind(), NodeKind::Directory(dir) if dir.incomplete);
            (tree.path_of(id).unwrap(), node.size(), incomplete)
        })
        .collect()
}

#[test]
fn test_roundtrip_all_compressions() {
    let dir = TempDir::new().unwrap();
    let tree = sample_tree();
    for name in ["files.xml", "files.xml.bz2", "files.xml.zst"] {
        let path = dir.path().join(name);
        filelist::save(&tree, &path).unwrap();
        let loaded = filelist::load(&path).unwrap();

        assert_eq!(
            describe(&loaded),
            vec![
                ("/".to_string(), 3, false),
                ("/docs".to_string(), 0, false),
                ("/music".to_string(), 3, true),
                ("/music/Album & Co".to_string(), 3, false),
                ("/music/Album & Co/01 <intro>.flac".to_string(), 3, false),
                ("/music/Album & Co/empty".to_string(), 0, false),
            ],
            "{}",
            name
        );
        let intro = loaded
            .find_by_path("/music/Album & Co/01 <intro>.flac")
            .unwrap();
        assert_eq!(loaded.get(intro).unwrap().tth(), Some(hash_bytes(b"abc").root));
        assert!(loaded.validate().is_empty());
        assert!(!dir.path().join(format!("{}.tmp", name)).exists());
    }
}

#[test]
fn test_compressed_lists_are_not_plain_xml() {
    let dir = TempDir::new().unwrap();
    let tree = sample_tree();
    let bz2 = dir.path().join("files.xml.bz2");
    let zst = dir.path().join("files.xml.zst");
    filelist::save(&tree, &bz2).unwrap();
    filelist::save(&tree, &zst).unwrap();
    assert!(std::fs::read(&bz2).unwrap().starts_with(b"BZh"));
    assert!(std::fs::read(&zst).unwrap().starts_with(&[0x28, 0xB5, 0x2F, 0xFD]));
}

#[test]
fn test_plain_document_shape() {
    let mut out = Vec::new();
    filelist::write_to(&sample_tree(), &mut out).unwrap();
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>"));
    assert!(xml.contains("<FileListing Version=\"1\""));
    assert!(xml.contains(&format!("TTH=\"{}\"", hash_bytes(b"abc").root.to_base32())));
    assert!(xml.contains("Name=\"01 &lt;intro&gt;.flac\""));
    assert!(xml.contains("<Directory Name=\"music\" Incomplete=\"1\">"));
    assert!(!xml.contains("pending.wav"));
}

#[test]
fn test_load_rejects_unknown_elements() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("files.xml");
    std::fs::write(
        &path,
        r#"<?xml version="1.0" encoding="utf-8"?>
<FileListing Version="1"><Folder Name="x"/></FileListing>"#,
    )
    .unwrap();
    match filelist::load(&path) {
        Err(FileListError::Format { source, .. }) => {
            assert_eq!(source, FormatError::UnexpectedElement("Folder".to_string()));
        }
        other => panic!("expected format error, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_missing_list_is_io_not_found() {
    let dir = TempDir::new().unwrap();
    match filelist::load(&dir.path().join("missing.xml.bz2")) {
        Err(FileListError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected not found, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_load_accepts_tth_with_nonzero_padding_bits() {
    let xml = format!(
        r#"<FileListing Version="1"><Directory Name="s"><File Name="f" Size="1" TTH="{}B"/></Directory></FileListing>"#,
        "A".repeat(38)
    );
    let tree = filelist::read_from(xml.as_bytes()).unwrap();
    let id = tree.find_by_path("/s/f").unwrap();
    assert_eq!(tree.get(id).unwrap().tth().unwrap().as_bytes(), &[0u8; 24]);
}
