//! Output sinks for finished documents.
//!
//! A [`Sink`] is a record-oriented bulk writer: one logical operation is
//! either "index", "delete", or an out-of-band sidecar "merge" for a given
//! document identity. Sinks are **not** thread-safe; exactly one emitter
//! thread drives a sink, fed by a channel (see the scan orchestrator).
//!
//! The search-engine sink is usable only when the server's reported version
//! `v` satisfies `6.8 <= v < 9.0`. Versions below `7.14` use the legacy
//! document-mapping mode; versions `8.0` and above unlock nearest-neighbor
//! indexing features.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::config::SinkConfig;
use crate::models::{DocId, Document, MetaEntry, MetaValue};

/// One operation handed from a worker to the emitter thread.
#[derive(Debug)]
pub enum SinkMessage {
    Index(Document),
    Delete(DocId),
    Merge(DocId, Vec<MetaEntry>),
}

/// Record-oriented bulk writer. Exactly one emit or delete per finished
/// document identity; merge is the sidecar path.
pub trait Sink: Send {
    fn emit(&mut self, doc: Document) -> Result<()>;
    fn delete(&mut self, id: DocId) -> Result<()>;
    fn merge(&mut self, id: DocId, meta: Vec<MetaEntry>) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

fn meta_value_json(value: &MetaValue) -> serde_json::Value {
    match value {
        MetaValue::Str(s) => json!(s),
        MetaValue::Int(i) => json!(i),
        MetaValue::Json(v) => v.clone(),
    }
}

/// Render a document as the JSON body submitted to sinks. Metadata is an
/// ordered array so duplicate keys and insertion order survive the wire.
pub fn document_json(doc: &Document) -> serde_json::Value {
    let meta: Vec<serde_json::Value> = doc
        .meta()
        .iter()
        .map(|m| json!({ "key": m.key.as_str(), "value": meta_value_json(&m.value) }))
        .collect();

    json!({
        "path": doc.path,
        "name": doc.name(),
        "ext": doc.ext_str(),
        "mime": doc.mime.essence(),
        "size": doc.size,
        "mtime": doc.mtime,
        "meta": meta,
    })
}

/// Parsed search-engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl EsVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(EsVersion {
            major,
            minor,
            patch,
        })
    }

    fn ge(&self, major: u32, minor: u32) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }

    /// Accepted window: `6.8 <= v < 9.0`.
    pub fn supported(&self) -> bool {
        self.ge(6, 8) && !self.ge(9, 0)
    }

    /// Versions below 7.14 use the legacy document-mapping mode.
    pub fn legacy(&self) -> bool {
        !self.ge(7, 14)
    }

    /// Versions 8.0 and above support nearest-neighbor indexing.
    pub fn has_knn(&self) -> bool {
        self.ge(8, 0)
    }
}

impl fmt::Display for EsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// HTTP bulk sink for an Elasticsearch-compatible search engine.
pub struct EsSink {
    client: reqwest::blocking::Client,
    url: String,
    index: String,
    version: EsVersion,
    bulk_size: usize,
    lines: Vec<String>,
    ops: usize,
}

impl EsSink {
    /// Connect, query the server version, and reject unsupported servers
    /// before any documents are emitted.
    pub fn connect(config: &SinkConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let version = Self::fetch_version(&client, &config.url)?;
        if !version.supported() {
            bail!(
                "Search engine version {} is not supported (requires >= 6.8, < 9.0)",
                version
            );
        }
        if version.legacy() {
            tracing::info!(%version, "sink running in legacy mapping mode");
        }

        Ok(EsSink {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            version,
            bulk_size: config.bulk_size,
            lines: Vec::new(),
            ops: 0,
        })
    }

    fn fetch_version(client: &reqwest::blocking::Client, url: &str) -> Result<EsVersion> {
        let body: serde_json::Value = client
            .get(url)
            .send()
            .with_context(|| format!("Failed to reach search engine at {}", url))?
            .error_for_status()?
            .json()?;
        let number = body["version"]["number"]
            .as_str()
            .context("Search engine status response has no version.number")?;
        EsVersion::parse(number)
            .with_context(|| format!("Unparseable search engine version: {}", number))
    }

    pub fn version(&self) -> EsVersion {
        self.version
    }

    fn action(&self, op: &str, id: DocId) -> serde_json::Value {
        let mut action = json!({ "_index": self.index, "_id": id.to_hex() });
        // Mapping types were still mandatory before 7.x removed them.
        if self.version.legacy() {
            action["_type"] = json!("_doc");
        }
        json!({ op: action })
    }

    fn push_op(&mut self, lines: Vec<String>) -> Result<()> {
        self.lines.extend(lines);
        self.ops += 1;
        if self.ops >= self.bulk_size {
            self.flush()?;
        }
        Ok(())
    }
}

impl Sink for EsSink {
    fn emit(&mut self, doc: Document) -> Result<()> {
        let mut body = document_json(&doc);
        if let Some(parent) = doc.parent {
            body["parent"] = json!(parent.to_hex());
        }
        self.push_op(vec![
            self.action("index", doc.id).to_string(),
            body.to_string(),
        ])
    }

    fn delete(&mut self, id: DocId) -> Result<()> {
        let line = self.action("delete", id).to_string();
        self.push_op(vec![line])
    }

    fn merge(&mut self, id: DocId, meta: Vec<MetaEntry>) -> Result<()> {
        let patch: Vec<serde_json::Value> = meta
            .iter()
            .map(|m| json!({ "key": m.key.as_str(), "value": meta_value_json(&m.value) }))
            .collect();
        self.push_op(vec![
            self.action("update", id).to_string(),
            json!({ "doc": { "sidecar": patch } }).to_string(),
        ])
    }

    fn flush(&mut self) -> Result<()> {
        if self.lines.is_empty() {
            return Ok(());
        }
        let mut body = self.lines.join("\n");
        body.push('\n');
        self.lines.clear();
        self.ops = 0;

        let response = self
            .client
            .post(format!("{}/_bulk", self.url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .context("Bulk submission failed")?;
        response.error_for_status().context("Bulk submission rejected")?;
        Ok(())
    }
}

/// Line-oriented file sink: one JSON operation per line. Useful offline and
/// in tests.
pub struct JsonlSink {
    writer: std::io::BufWriter<std::fs::File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create sink output: {}", path.display()))?;
        Ok(JsonlSink {
            writer: std::io::BufWriter::new(file),
        })
    }

    fn write_line(&mut self, value: serde_json::Value) -> Result<()> {
        writeln!(self.writer, "{}", value)?;
        Ok(())
    }
}

impl Sink for JsonlSink {
    fn emit(&mut self, doc: Document) -> Result<()> {
        let mut body = document_json(&doc);
        if let Some(parent) = doc.parent {
            body["parent"] = json!(parent.to_hex());
        }
        self.write_line(json!({ "op": "index", "id": doc.id.to_hex(), "doc": body }))
    }

    fn delete(&mut self, id: DocId) -> Result<()> {
        self.write_line(json!({ "op": "delete", "id": id.to_hex() }))
    }

    fn merge(&mut self, id: DocId, meta: Vec<MetaEntry>) -> Result<()> {
        let patch: Vec<serde_json::Value> = meta
            .iter()
            .map(|m| json!({ "key": m.key.as_str(), "value": meta_value_json(&m.value) }))
            .collect();
        self.write_line(json!({ "op": "merge", "id": id.to_hex(), "meta": patch }))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory sink for embedders and tests.
#[derive(Default)]
pub struct MemorySink {
    pub emitted: Vec<Document>,
    pub deleted: Vec<DocId>,
    pub merged: Vec<(DocId, Vec<MetaEntry>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn emit(&mut self, doc: Document) -> Result<()> {
        self.emitted.push(doc);
        Ok(())
    }

    fn delete(&mut self, id: DocId) -> Result<()> {
        self.deleted.push(id);
        Ok(())
    }

    fn merge(&mut self, id: DocId, meta: Vec<MetaEntry>) -> Result<()> {
        self.merged.push((id, meta));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetaKey;

    #[test]
    fn version_window() {
        assert!(EsVersion::parse("6.8.0").unwrap().supported());
        assert!(EsVersion::parse("7.10.2").unwrap().supported());
        assert!(EsVersion::parse("8.17.1").unwrap().supported());
        assert!(!EsVersion::parse("6.7.9").unwrap().supported());
        assert!(!EsVersion::parse("9.0.0").unwrap().supported());
        assert!(!EsVersion::parse("5.6.0").unwrap().supported());
    }

    #[test]
    fn version_thresholds() {
        let v710 = EsVersion::parse("7.10.2").unwrap();
        assert!(v710.supported());
        assert!(v710.legacy());
        assert!(!v710.has_knn());

        let v714 = EsVersion::parse("7.14.0").unwrap();
        assert!(!v714.legacy());
        assert!(!v714.has_knn());

        let v8 = EsVersion::parse("8.0.0").unwrap();
        assert!(!v8.legacy());
        assert!(v8.has_knn());
    }

    #[test]
    fn version_parse_two_components() {
        assert_eq!(
            EsVersion::parse("7.14"),
            Some(EsVersion {
                major: 7,
                minor: 14,
                patch: 0
            })
        );
        assert_eq!(EsVersion::parse("nonsense"), None);
    }

    #[test]
    fn document_json_preserves_meta_order() {
        let id = DocId::from_rel_path("a.txt");
        let mut doc = Document::new(id, "/r/a.txt".to_string(), 3, 5, 4, 100, None);
        doc.add_meta_str(MetaKey::Content, "hello");
        doc.add_meta_int(MetaKey::Pages, 3);
        doc.add_meta_str(MetaKey::Content, "again");

        let body = document_json(&doc);
        let meta = body["meta"].as_array().unwrap();
        assert_eq!(meta.len(), 3);
        assert_eq!(meta[0]["key"], "content");
        assert_eq!(meta[0]["value"], "hello");
        assert_eq!(meta[1]["key"], "pages");
        assert_eq!(meta[1]["value"], 3);
        assert_eq!(meta[2]["value"], "again");
    }

    #[test]
    fn memory_sink_records_operations() {
        let mut sink = MemorySink::new();
        let id = DocId::from_rel_path("x");
        let doc = Document::new(id, "/r/x".to_string(), 3, 4, 0, 0, None);
        sink.emit(doc).unwrap();
        sink.delete(id).unwrap();
        assert_eq!(sink.emitted.len(), 1);
        assert_eq!(sink.deleted, vec![id]);
    }
}
