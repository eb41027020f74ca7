//! JSON and newline-delimited-JSON decoders.

use serde_json::Value;

use crate::models::{Document, MetaKey, MetaValue};
use crate::vfile::Vfile;

use super::read_bounded;

/// Upper bound on raw bytes considered for structured parsing.
const STRUCTURED_MAX: usize = 4 * 1024 * 1024;
/// Lines examined in an NDJSON stream.
const NDJSON_MAX_LINES: usize = 1000;

/// Parse a JSON document: the value is stored as structured metadata, and a
/// top-level string `title` is promoted to the title entry.
pub fn decode_json(f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, STRUCTURED_MAX) else {
        return;
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => {
            if let Some(title) = value.get("title").and_then(Value::as_str) {
                doc.add_meta_str(MetaKey::Title, title);
            }
            doc.add_meta(MetaKey::Structured, MetaValue::Json(value));
        }
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "invalid JSON, skipping structured metadata");
        }
    }
}

/// Parse an NDJSON stream: counts valid records and keeps the first one as a
/// structured sample.
pub fn decode_ndjson(f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, STRUCTURED_MAX) else {
        return;
    };
    let text = String::from_utf8_lossy(&bytes);

    let mut records = 0i64;
    let mut sample: Option<Value> = None;
    for line in text.lines().take(NDJSON_MAX_LINES) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                records += 1;
                if sample.is_none() {
                    sample = Some(value);
                }
            }
            Err(err) => {
                tracing::debug!(path = doc.path, error = %err, "skipping malformed NDJSON line");
            }
        }
    }

    if let Some(first) = sample {
        doc.add_meta(
            MetaKey::Structured,
            MetaValue::Json(serde_json::json!({ "records": records, "sample": first })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocId;

    fn doc() -> Document {
        let id = DocId::from_rel_path("j");
        Document::new(id, "/r/j".to_string(), 3, 4, 0, 0, None)
    }

    #[test]
    fn json_title_promoted() {
        let body = br#"{"title": "Release notes", "version": 3}"#;
        let mut f = Vfile::from_buffer("mem", body.to_vec(), true);
        let mut d = doc();
        decode_json(&mut f, &mut d);
        assert_eq!(d.meta()[0].key, MetaKey::Title);
        assert_eq!(d.meta()[1].key, MetaKey::Structured);
    }

    #[test]
    fn invalid_json_is_absorbed() {
        let mut f = Vfile::from_buffer("mem", b"{not json".to_vec(), true);
        let mut d = doc();
        decode_json(&mut f, &mut d);
        assert!(d.meta().is_empty());
    }

    #[test]
    fn ndjson_counts_records() {
        let body = b"{\"a\":1}\n\n{\"a\":2}\nnot json\n{\"a\":3}\n";
        let mut f = Vfile::from_buffer("mem", body.to_vec(), true);
        let mut d = doc();
        decode_ndjson(&mut f, &mut d);
        assert_eq!(d.meta().len(), 1);
        match &d.meta()[0].value {
            MetaValue::Json(v) => {
                assert_eq!(v["records"], 3);
                assert_eq!(v["sample"]["a"], 1);
            }
            other => panic!("unexpected value {:?}", other),
        }
    }
}
