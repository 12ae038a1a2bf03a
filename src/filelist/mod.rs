//! File list serialization
//!
//! The share tree is published as an XML document:
//!
//! ```xml
//! <FileListing Version="1" Generator="shareindex 0.3.0" Base="/">
//!     <Directory Name="music" Incomplete="1">
//!         <File Name="a.flac" Size="1024" TTH="..."/>
//!     </Directory>
//! </FileListing>
//! ```
//!
//! Files without a hash cannot be represented and are left out; their
//! directory is marked `Incomplete="1"` instead. Loading is strict: any
//! element, attribute or value outside this grammar fails the whole load.

pub mod codec;

use self::codec::Compression;
use crate::error::{FileListError, FormatError, TreeError};
use crate::tree::node::is_valid_name;
use crate::tree::{FileTree, Node, NodeId, NodeKind};
use crate::types::Tth;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const FORMAT_VERSION: &str = "1";

/// Generator tag written into every saved list
pub const GENERATOR: &str = concat!("shareindex ", env!("CARGO_PKG_VERSION"));

const FILE_LISTING: &str = "FileListing";
const DIRECTORY: &str = "Directory";
const FILE: &str = "File";

/// Save `tree` to `path`, compressed according to the extension.
///
/// The document is written to a sibling temp file and renamed over `path`,
/// so readers never observe a partially written list.
#[instrument(skip(tree), fields(path = %path.display()))]
pub fn save(tree: &FileTree, path: &Path) -> Result<(), FileListError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_path(path);
    let result = (|| -> Result<(), FileListError> {
        let mut writer = codec::create(&tmp_path, Compression::from_path(path))?;
        write_to(tree, &mut writer)?;
        let inner = writer.finish()?;
        let file = inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)?;
    info!(nodes = tree.len(), "Saved file list");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `tree` as uncompressed XML into `out`
pub fn write_to<W: Write>(tree: &FileTree, out: W) -> Result<(), FileListError> {
    let mut writer = Writer::new_with_indent(out, b'\t', 1);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))
        .map_err(xml_error)?;

    let listing = BytesStart::new(FILE_LISTING).with_attributes([
        ("Version", FORMAT_VERSION),
        ("Generator", GENERATOR),
        ("Base", "/"),
    ]);
    let root = tree.root();
    if tree.children(root).is_empty() {
        writer.write_event(Event::Empty(listing)).map_err(xml_error)?;
    } else {
        writer.write_event(Event::Start(listing.borrow())).map_err(xml_error)?;
        for &child in tree.children(root) {
            write_node(tree, child, &mut writer)?;
        }
        writer
            .write_event(Event::End(listing.to_end()))
            .map_err(xml_error)?;
    }
    writer.into_inner().flush()?;
    Ok(())
}

fn write_node<W: Write>(
    tree: &FileTree,
    id: NodeId,
    writer: &mut Writer<W>,
) -> Result<(), FileListError> {
    let Some(node) = tree.get(id) else {
        return Ok(());
    };
    match node.kind() {
        NodeKind::File(file) => {
            // Hashless files are not representable
            let Some(tth) = file.tth else {
                return Ok(());
            };
            let size = node.size().to_string();
            let tth = tth.to_base32();
            let element = BytesStart::new(FILE).with_attributes([
                ("Name", node.name()),
                ("Size", size.as_str()),
                ("TTH", tth.as_str()),
            ]);
            writer.write_event(Event::Empty(element)).map_err(xml_error)?;
        }
        NodeKind::Directory(_) => {
            let mut element = BytesStart::new(DIRECTORY);
            element.push_attribute(("Name", node.name()));
            if !node.is_complete() {
                element.push_attribute(("Incomplete", "1"));
            }
            if node.children().is_empty() {
                writer.write_event(Event::Empty(element)).map_err(xml_error)?;
            } else {
                writer
                    .write_event(Event::Start(element.borrow()))
                    .map_err(xml_error)?;
                for &child in node.children() {
                    write_node(tree, child, writer)?;
                }
                writer
                    .write_event(Event::End(element.to_end()))
                    .map_err(xml_error)?;
            }
        }
    }
    Ok(())
}

/// Load a file list, decompressing according to the extension
#[instrument(fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<FileTree, FileListError> {
    let input = codec::open(path)?;
    let tree = read_from(input)?;
    info!(nodes = tree.len(), "Loaded file list");
    Ok(tree)
}

enum Frame {
    Listing,
    Directory(NodeId),
    /// `<File ...>` written with a separate end tag; nothing may nest inside
    File,
}

/// Parse an uncompressed XML file list
pub fn read_from<R: BufRead>(input: R) -> Result<FileTree, FileListError> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);

    let mut tree = FileTree::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_listing = false;
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position();
        let at = |source: FormatError| FileListError::Format { position, source };
        let event = reader.read_event_into(&mut buf).map_err(|e| match e {
            quick_xml::Error::Io(io) => {
                FileListError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => at(FormatError::Xml(other.to_string())),
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = element_name(e);
                match stack.last() {
                    None => {
                        if seen_listing || name != FILE_LISTING {
                            return Err(at(FormatError::UnexpectedElement(name)));
                        }
                        read_listing(e).map_err(at)?;
                        seen_listing = true;
                        if !is_empty {
                            stack.push(Frame::Listing);
                        }
                    }
                    Some(Frame::File) => return Err(at(FormatError::UnexpectedElement(name))),
                    Some(Frame::Listing) | Some(Frame::Directory(_)) => {
                        let parent = match stack.last() {
                            Some(Frame::Directory(id)) => *id,
                            _ => tree.root(),
                        };
                        match name.as_str() {
                            DIRECTORY => {
                                let (dir_name, incomplete) = read_directory(e).map_err(at)?;
                                let id = insert(&mut tree, parent, Node::directory(dir_name))
                                    .map_err(at)?;
                                if incomplete {
                                    tree.set_incomplete(id, true)
                                        .map_err(|e| at(FormatError::Xml(e.to_string())))?;
                                }
                                if !is_empty {
                                    stack.push(Frame::Directory(id));
                                }
                            }
                            FILE => {
                                let (file_name, size, tth) = read_file(e).map_err(at)?;
                                insert(&mut tree, parent, Node::hashed_file(file_name, size, 0, tth))
                                    .map_err(at)?;
                                if !is_empty {
                                    stack.push(Frame::File);
                                }
                            }
                            _ => return Err(at(FormatError::UnexpectedElement(name))),
                        }
                    }
                }
            }
            Event::End(_) => {
                // quick-xml already rejects mismatched end tags
                stack.pop();
            }
            Event::Text(ref t) => {
                if !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(at(FormatError::UnexpectedText));
                }
            }
            Event::CData(_) => return Err(at(FormatError::UnexpectedText)),
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => {
                if !seen_listing || !stack.is_empty() {
                    return Err(at(FormatError::Truncated));
                }
                break;
            }
        }
        buf.clear();
    }

    debug!(nodes = tree.len(), "Parsed file list");
    Ok(tree)
}

fn insert(tree: &mut FileTree, parent: NodeId, node: Node) -> Result<NodeId, FormatError> {
    tree.insert(parent, node).map_err(|e| match e {
        TreeError::DuplicateName(name) => FormatError::DuplicateName(name),
        TreeError::InvalidName(name) => FormatError::InvalidName(name),
        other => FormatError::Xml(other.to_string()),
    })
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Collect `(key, value)` pairs, rejecting keys outside `allowed`
fn attributes(
    e: &BytesStart,
    element: &str,
    allowed: &[&'static str],
) -> Result<Vec<(&'static str, String)>, FormatError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FormatError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let Some(known) = allowed.iter().find(|k| **k == key) else {
            return Err(FormatError::UnexpectedAttribute {
                element: element.to_string(),
                attribute: key,
            });
        };
        let value = attr
            .unescape_value()
            .map_err(|err| FormatError::Xml(err.to_string()))?
            .into_owned();
        out.push((*known, value));
    }
    Ok(out)
}

fn take(
    attrs: &mut Vec<(&'static str, String)>,
    element: &'static str,
    key: &'static str,
) -> Result<String, FormatError> {
    take_optional(attrs, key).ok_or(FormatError::MissingAttribute {
        element,
        attribute: key,
    })
}

fn take_optional(attrs: &mut Vec<(&'static str, String)>, key: &'static str) -> Option<String> {
    let pos = attrs.iter().position(|(k, _)| *k == key)?;
    Some(attrs.swap_remove(pos).1)
}

fn read_listing(e: &BytesStart) -> Result<(), FormatError> {
    let mut attrs = attributes(e, FILE_LISTING, &["Version", "Generator", "Base", "CID"])?;
    let version = take(&mut attrs, "FileListing", "Version")?;
    if version != FORMAT_VERSION {
        return Err(FormatError::Version(version));
    }
    if let Some(base) = take_optional(&mut attrs, "Base") {
        if !base.starts_with('/') {
            return Err(FormatError::UnexpectedAttribute {
                element: FILE_LISTING.to_string(),
                attribute: format!("Base={}", base),
            });
        }
    }
    Ok(())
}

fn read_directory(e: &BytesStart) -> Result<(String, bool), FormatError> {
    let mut attrs = attributes(e, DIRECTORY, &["Name", "Incomplete"])?;
    let name = take(&mut attrs, "Directory", "Name")?;
    if !is_valid_name(&name) {
        return Err(FormatError::InvalidName(name));
    }
    let incomplete = match take_optional(&mut attrs, "Incomplete").as_deref() {
        None | Some("0") => false,
        Some("1") => true,
        Some(other) => return Err(FormatError::InvalidFlag(other.to_string())),
    };
    Ok((name, incomplete))
}

fn read_file(e: &BytesStart) -> Result<(String, u64, Tth), FormatError> {
    let mut attrs = attributes(e, FILE, &["Name", "Size", "TTH"])?;
    let name = take(&mut attrs, "File", "Name")?;
    if !is_valid_name(&name) {
        return Err(FormatError::InvalidName(name));
    }
    let size_text = take(&mut attrs, "File", "Size")?;
    let size = parse_size(&size_text).ok_or(FormatError::InvalidSize(size_text))?;
    let tth_text = take(&mut attrs, "File", "TTH")?;
    let tth = Tth::from_base32(&tth_text).map_err(|_| FormatError::InvalidTth(tth_text))?;
    Ok((name, size, tth))
}

fn parse_size(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn xml_error(err: quick_xml::Error) -> FileListError {
    match err {
        quick_xml::Error::Io(io) => {
            FileListError::Io(std::io::Error::new(io.kind(), io.to_string()))
        }
        other => FileListError::Format {
            position: 0,
            source: FormatError::Xml(other.to_string()),
        },
    }
}
