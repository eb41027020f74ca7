//! Plain-text and markup decoders.

use quick_xml::events::Event;

use crate::models::{Document, MetaKey};
use crate::vfile::Vfile;

use super::read_bounded;

/// Markup is read past the text budget because tags are discarded; this
/// bounds how much raw input is consumed to fill the budget.
const MARKUP_READ_FACTOR: usize = 8;

/// Extract plain text: a bounded read, lossy UTF-8, control characters
/// dropped, appended as one `content` entry when non-empty.
pub fn decode_text(content_size: usize, f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, content_size) else {
        return;
    };
    let text = sanitize(&String::from_utf8_lossy(&bytes));
    if !text.is_empty() {
        doc.add_meta_str(MetaKey::Content, text);
    }
}

/// Extract text from markup by discarding tags, keeping character data up to
/// the budget.
pub fn decode_markup(content_size: usize, f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, content_size.saturating_mul(MARKUP_READ_FACTOR)) else {
        return;
    };
    let text = strip_tags(&bytes, content_size);
    if !text.is_empty() {
        doc.add_meta_str(MetaKey::Content, text);
    }
}

/// Collect character data from an XML-ish byte stream, tolerating the kind
/// of tag soup real HTML is made of. Parse errors end collection instead of
/// failing the job.
pub(crate) fn strip_tags(xml: &[u8], budget: usize) -> String {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().check_end_names = false;
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                let piece = t.unescape().unwrap_or_default();
                let piece = piece.trim();
                if !piece.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(piece);
                    if out.len() >= budget {
                        out.truncate(budget);
                        break;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(error = %err, "markup parse stopped early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    sanitize(&out)
}

/// Drop control characters, collapse runs of whitespace, trim.
pub(crate) fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_control() && c != '\n' && c != '\t' {
            continue;
        }
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocId, MetaValue};

    fn doc() -> Document {
        let id = DocId::from_rel_path("t");
        Document::new(id, "/r/t".to_string(), 3, 4, 0, 0, None)
    }

    #[test]
    fn text_is_bounded_and_sanitized() {
        let mut f = Vfile::from_buffer("mem", b"hello\x00\x01  world\n\n".to_vec(), true);
        let mut d = doc();
        decode_text(1024, &mut f, &mut d);
        assert_eq!(d.meta().len(), 1);
        assert_eq!(d.meta()[0].key, MetaKey::Content);
        assert_eq!(d.meta()[0].value, MetaValue::Str("hello world".to_string()));
    }

    #[test]
    fn text_respects_budget() {
        let mut f = Vfile::from_buffer("mem", vec![b'a'; 100], true);
        let mut d = doc();
        decode_text(10, &mut f, &mut d);
        match &d.meta()[0].value {
            MetaValue::Str(s) => assert_eq!(s.len(), 10),
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn empty_text_adds_nothing() {
        let mut f = Vfile::from_buffer("mem", b"  \n \x02 ".to_vec(), true);
        let mut d = doc();
        decode_text(1024, &mut f, &mut d);
        assert!(d.meta().is_empty());
    }

    #[test]
    fn markup_strips_tags() {
        let html = b"<html><head><title>T</title></head><body><p>one</p><p>two</p></body></html>";
        let mut f = Vfile::from_buffer("mem", html.to_vec(), true);
        let mut d = doc();
        decode_markup(1024, &mut f, &mut d);
        assert_eq!(d.meta()[0].value, MetaValue::Str("T one two".to_string()));
    }

    #[test]
    fn malformed_markup_does_not_panic() {
        let html = b"<p>ok <b>broken <i>deep</p> text";
        let text = strip_tags(html, 1024);
        assert!(text.contains("ok"));
    }
}
