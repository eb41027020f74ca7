//! Core data models used throughout trawl.
//!
//! These types represent the parse jobs, documents, and metadata entries that
//! flow through the scan pipeline, from the directory walker to the sink.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::mime::MimeCode;
use crate::vfile::Vfile;

/// Length of a document identity in bytes.
pub const DOC_ID_LEN: usize = 16;

/// Deterministic, path-derived document identity.
///
/// Derived from the file's path relative to the scan root, never from its
/// content: the same relative path yields the same identity across scans,
/// which is what makes incremental matching and deletion diffing work.
/// The identity is opaque and not reversible to the path.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocId([u8; DOC_ID_LEN]);

impl DocId {
    /// Derive an identity from a scan-root-relative path.
    pub fn from_rel_path(rel_path: &str) -> Self {
        let digest = Sha256::digest(rel_path.as_bytes());
        let mut id = [0u8; DOC_ID_LEN];
        id.copy_from_slice(&digest[..DOC_ID_LEN]);
        DocId(id)
    }

    /// Render as a fixed-width lowercase hex string (32 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex string previously produced by [`DocId::to_hex`].
    pub fn parse_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let id: [u8; DOC_ID_LEN] = bytes.try_into().ok()?;
        Some(DocId(id))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Typed key of a metadata entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaKey {
    Parent,
    Checksum,
    Content,
    Title,
    Author,
    Pages,
    Width,
    Height,
    Duration,
    Artist,
    Album,
    Genre,
    FontName,
    ArchiveEntry,
    Structured,
}

impl MetaKey {
    /// Wire name used by sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::Parent => "parent",
            MetaKey::Checksum => "checksum",
            MetaKey::Content => "content",
            MetaKey::Title => "title",
            MetaKey::Author => "author",
            MetaKey::Pages => "pages",
            MetaKey::Width => "width",
            MetaKey::Height => "height",
            MetaKey::Duration => "duration",
            MetaKey::Artist => "artist",
            MetaKey::Album => "album",
            MetaKey::Genre => "genre",
            MetaKey::FontName => "font_name",
            MetaKey::ArchiveEntry => "archive_entry",
            MetaKey::Structured => "structured",
        }
    }
}

/// Value payload of a metadata entry. Varies by key.
#[derive(Clone, Debug, PartialEq)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Json(serde_json::Value),
}

/// One typed key/value node in a document's append-only metadata sequence.
///
/// Entries are owned exclusively by their document and never mutated after
/// append. Duplicate keys are allowed and preserved.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaEntry {
    pub key: MetaKey,
    pub value: MetaValue,
}

/// One indexable unit, built by a single worker for the duration of a parse
/// job and handed to the sink at completion.
#[derive(Debug)]
pub struct Document {
    /// Path-derived identity.
    pub id: DocId,
    /// Absolute path (or virtual path for archive entries).
    pub path: String,
    /// Byte offset of the basename within `path`.
    pub base: usize,
    /// Byte offset of the extension within `path` (`path.len()` when none).
    pub ext: usize,
    /// Resolved mime-type code.
    pub mime: MimeCode,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, integer seconds.
    pub mtime: i64,
    /// Identity of the enclosing archive's document, if any.
    pub parent: Option<DocId>,
    meta: Vec<MetaEntry>,
}

impl Document {
    pub fn new(
        id: DocId,
        path: String,
        base: usize,
        ext: usize,
        size: u64,
        mtime: i64,
        parent: Option<DocId>,
    ) -> Self {
        Document {
            id,
            path,
            base,
            ext,
            mime: MimeCode::UNKNOWN,
            size,
            mtime,
            parent,
            meta: Vec::new(),
        }
    }

    /// Basename portion of the path.
    pub fn name(&self) -> &str {
        &self.path[self.base..]
    }

    /// Extension portion of the path (empty when none).
    pub fn ext_str(&self) -> &str {
        &self.path[self.ext.min(self.path.len())..]
    }

    /// Append a metadata entry at the tail. Order is preserved.
    pub fn add_meta(&mut self, key: MetaKey, value: MetaValue) {
        self.meta.push(MetaEntry { key, value });
    }

    pub fn add_meta_str(&mut self, key: MetaKey, value: impl Into<String>) {
        self.add_meta(key, MetaValue::Str(value.into()));
    }

    pub fn add_meta_int(&mut self, key: MetaKey, value: i64) {
        self.add_meta(key, MetaValue::Int(value));
    }

    /// Metadata entries in insertion order.
    pub fn meta(&self) -> &[MetaEntry] {
        &self.meta
    }
}

/// The unit of work submitted to a worker: one file (or archive entry) to
/// classify and decode. Consumed exactly once by exactly one worker.
#[derive(Debug)]
pub struct ParseJob {
    pub path: String,
    pub base: usize,
    pub ext: usize,
    pub size: u64,
    pub mtime: i64,
    /// Non-empty when the file is an entry inside an already-opened archive.
    pub parent: Option<DocId>,
    pub vfile: Vfile,
}
