//! Sidecar metadata decoder.
//!
//! A sidecar file carries metadata meant for another, already-identified
//! document: `photo.jpg.sidecar` attaches to `photo.jpg`. The decoder turns
//! the sidecar's JSON object into metadata entries; applying them is an
//! out-of-band merge at the sink, and the sidecar itself is never emitted as
//! a normal document.

use serde_json::Value;

use crate::models::{Document, MetaEntry, MetaKey, MetaValue};
use crate::vfile::Vfile;

use super::read_bounded;

const SIDECAR_MAX: usize = 1024 * 1024;

/// File extension that marks a sidecar.
pub const SIDECAR_SUFFIX: &str = ".sidecar";

/// Parse the sidecar body into metadata entries for the target document.
/// Returns `None` when the body is unreadable or not a JSON object.
pub fn decode_sidecar(f: &mut Vfile, doc: &Document) -> Option<Vec<MetaEntry>> {
    let bytes = read_bounded(f, SIDECAR_MAX)?;
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "invalid sidecar JSON");
            return None;
        }
    };
    let object = match value {
        Value::Object(object) => object,
        _ => {
            tracing::warn!(path = doc.path, "sidecar body is not a JSON object");
            return None;
        }
    };

    let mut entries = Vec::with_capacity(object.len());
    for (key, value) in object {
        entries.push(map_entry(&key, value));
    }
    Some(entries)
}

fn map_entry(key: &str, value: Value) -> MetaEntry {
    let known = match key {
        "title" => Some(MetaKey::Title),
        "author" => Some(MetaKey::Author),
        "content" => Some(MetaKey::Content),
        "artist" => Some(MetaKey::Artist),
        "album" => Some(MetaKey::Album),
        "genre" => Some(MetaKey::Genre),
        "pages" => Some(MetaKey::Pages),
        "width" => Some(MetaKey::Width),
        "height" => Some(MetaKey::Height),
        "duration" => Some(MetaKey::Duration),
        _ => None,
    };

    match known {
        Some(meta_key) => {
            let meta_value = match value {
                Value::String(s) => MetaValue::Str(s),
                Value::Number(n) if n.is_i64() => MetaValue::Int(n.as_i64().unwrap_or(0)),
                other => MetaValue::Json(other),
            };
            MetaEntry {
                key: meta_key,
                value: meta_value,
            }
        }
        None => MetaEntry {
            key: MetaKey::Structured,
            value: MetaValue::Json(serde_json::json!({ key: value })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocId;

    fn sidecar_doc() -> Document {
        let id = DocId::from_rel_path("photo.jpg.sidecar");
        Document::new(
            id,
            "/r/photo.jpg.sidecar".to_string(),
            3,
            13,
            0,
            0,
            None,
        )
    }

    #[test]
    fn maps_known_and_unknown_keys() {
        let body = br#"{"title": "Sunset", "pages": 1, "camera": "X100V"}"#;
        let mut f = Vfile::from_buffer("mem", body.to_vec(), true);
        let doc = sidecar_doc();
        let entries = decode_sidecar(&mut f, &doc).unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries
            .iter()
            .any(|e| e.key == MetaKey::Title && e.value == MetaValue::Str("Sunset".into())));
        assert!(entries
            .iter()
            .any(|e| e.key == MetaKey::Pages && e.value == MetaValue::Int(1)));
        assert!(entries.iter().any(|e| e.key == MetaKey::Structured));
    }

    #[test]
    fn rejects_non_object_bodies() {
        let mut f = Vfile::from_buffer("mem", b"[1, 2, 3]".to_vec(), true);
        let doc = sidecar_doc();
        assert!(decode_sidecar(&mut f, &doc).is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        let mut f = Vfile::from_buffer("mem", b"{broken".to_vec(), true);
        let doc = sidecar_doc();
        assert!(decode_sidecar(&mut f, &doc).is_none());
    }
}
