use std::error::Error as StdError;
use std::fs;
use std::path::{Component, Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::addon::{AddonRecord, UNMANAGED};

pub const COMPENDIUM_EXTENSION: &str = "plugincompendium";
pub const MANIFEST_EXTENSION: &str = "plugin";

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    XmlError(quick_xml::Error),
    Malformed(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Error {
        Error::XmlError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "{}", e),
            Error::XmlError(e) => write!(f, "invalid xml: {}", e),
            Error::Malformed(reason) => write!(f, "malformed descriptor: {}", reason),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::XmlError(e) => Some(e),
            Error::Malformed(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Kind {
    Compendium,
    Manifest,
}

pub fn classify(path: &Path) -> Option<Kind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();

    match extension.as_str() {
        COMPENDIUM_EXTENSION => Some(Kind::Compendium),
        MANIFEST_EXTENSION => Some(Kind::Manifest),
        _ => None,
    }
}

/// A managed addon: its record plus the raw manifests it owns, relative to
/// the plugins root.
#[derive(Debug, Clone)]
pub struct Compendium {
    pub record: AddonRecord,
    pub descriptors: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub record: AddonRecord,
    pub package: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    children: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    fn new(name: &[u8]) -> Element {
        Element {
            name: String::from_utf8_lossy(name).into_owned(),
            children: Vec::new(),
        }
    }

    /// First element named `name` in document order, self included.
    fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }

        self.elements().find_map(|e| e.find(name))
    }

    fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    fn text(&self) -> String {
        let mut text = String::new();

        for child in &self.children {
            if let Node::Text(t) = child {
                text.push_str(t);
            }
        }

        text.trim().to_string()
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.children_named(name).next().map(Element::text)
    }
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_some() {
        return Err(Error::Malformed(format!(
            "second root element '{}'",
            element.name
        )));
    } else {
        *root = Some(element);
    }

    Ok(())
}

fn push_text(stack: &mut Vec<Element>, text: String) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(Error::Malformed("text outside root element".to_string())),
    }
}

fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(Element::new(e.name().as_ref())),
            Event::Empty(e) => attach(&mut stack, &mut root, Element::new(e.name().as_ref()))?,
            Event::End(e) => {
                let element = stack.pop().ok_or_else(|| {
                    Error::Malformed(format!(
                        "unexpected end tag '{}'",
                        String::from_utf8_lossy(e.name().as_ref())
                    ))
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::Malformed(e.to_string()))?
                    .into_owned();
                push_text(&mut stack, text)?;
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                push_text(&mut stack, text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::Malformed(format!("unclosed element '{}'", open.name)));
    }

    root.ok_or_else(|| Error::Malformed("no root element".to_string()))
}

/// Fills name, author, version and id from the first block found among
/// `blocks`.
fn read_information(doc: &Element, blocks: &[&str], record: &mut AddonRecord) {
    let block = match blocks.iter().find_map(|b| doc.find(b)) {
        Some(b) => b,
        None => {
            trace!("no information block among {:?}", blocks);
            return;
        }
    };

    for child in block.elements() {
        match child.name.as_str() {
            "Name" => record.name = child.text(),
            "Author" => record.author = child.text(),
            "Version" => record.version = child.text(),
            "Id" => record.interface_id = child.text(),
            _ => {}
        }
    }
}

/// Converts a descriptor entry like `Foo\Bar.plugin` to a relative path
/// using the host separator.
pub fn normalize_descriptor(entry: &str) -> PathBuf {
    entry
        .split(|c| c == '\\' || c == '/')
        .filter(|part| !part.is_empty())
        .collect()
}

pub fn parse_compendium(xml: &str, path: &Path) -> Result<Compendium> {
    let doc = parse_document(xml)?;

    let mut record = AddonRecord {
        file_path: path.to_path_buf(),
        ..Default::default()
    };

    read_information(&doc, &["PluginConfig", "Information"], &mut record);

    let descriptors = match doc.find("Descriptors") {
        Some(list) => list
            .children_named("descriptor")
            .map(|d| normalize_descriptor(&d.text()))
            .filter(|p| !p.as_os_str().is_empty())
            .collect(),
        None => Vec::new(),
    };

    if let Some(list) = doc.find("Dependencies") {
        record.dependencies = list
            .children_named("dependency")
            .map(Element::text)
            .filter(|d| !d.is_empty())
            .collect();
    }

    Ok(Compendium {
        record,
        descriptors,
    })
}

pub fn parse_manifest(xml: &str, path: &Path) -> Result<Manifest> {
    let doc = parse_document(xml)?;

    let mut record = AddonRecord {
        category: UNMANAGED.to_string(),
        file_path: path.to_path_buf(),
        ..Default::default()
    };

    read_information(&doc, &["Information", "PluginConfig"], &mut record);

    let package = doc
        .find("Plugin")
        .and_then(|p| p.child_text("Package"))
        .or_else(|| doc.find("Package").map(Element::text))
        .filter(|p| !p.is_empty());

    Ok(Manifest { record, package })
}

/// Encoding named by the XML declaration, if the document starts with one.
/// Only ASCII-compatible encodings can be declared this way, so a UTF-16
/// label without a byte order mark falls back to UTF-8.
fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let mut reader = Reader::from_reader(bytes);

    match reader.read_event() {
        Ok(Event::Decl(decl)) => {
            let label = decl.encoding()?.ok()?;
            Encoding::for_label(&label).map(Encoding::output_encoding)
        }
        _ => None,
    }
}

/// Decodes a descriptor to text. A byte order mark wins over the declared
/// encoding; with neither the document is UTF-8.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let (encoding, bom) = match Encoding::for_bom(bytes) {
        Some(found) => found,
        None => (declared_encoding(bytes).unwrap_or(UTF_8), 0),
    };

    let (text, malformed) = encoding.decode_without_bom_handling(&bytes[bom..]);
    if malformed {
        return Err(Error::Malformed(format!("not valid {}", encoding.name())));
    }

    trace!("decoded {} bytes as {}", bytes.len(), encoding.name());

    Ok(text.into_owned())
}

pub fn read_compendium(path: &Path) -> Result<Compendium> {
    debug!("compendium '{}'", path.display());
    parse_compendium(&decode(&fs::read(path)?)?, path)
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    debug!("manifest '{}'", path.display());
    parse_manifest(&decode(&fs::read(path)?)?, path)
}

/// Maps a package id to the directory holding its code, relative to the
/// plugins root: `Foo.Bar.Main` lives in `Foo/Bar`. Returns `None` when the
/// package has no directory part or contains empty segments.
pub fn package_dir(package: &str) -> Option<PathBuf> {
    let segments: Vec<&str> = package.trim().split('.').collect();

    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    let dir: PathBuf = segments[..segments.len() - 1].iter().collect();

    if stays_inside(&dir) {
        Some(dir)
    } else {
        None
    }
}

/// True for a non-empty relative path made only of plain names, so joining
/// it onto a root can never leave that root.
pub fn stays_inside(relative: &Path) -> bool {
    let mut components = relative.components().peekable();

    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}
