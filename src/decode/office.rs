//! Office / structured-document decoder (OOXML and OpenDocument).
//!
//! These containers are zips of XML parts. Word bodies and slides carry
//! their visible text in `t` elements; spreadsheets keep shared strings in
//! `si`/`t` pairs; OpenDocument keeps everything under `content.xml`.

use std::io::{Cursor, Read};

use quick_xml::events::Event;

use crate::models::{Document, MetaKey};
use crate::vfile::Vfile;

use super::read_bounded;
use super::text::sanitize;

/// Upper bound on the raw container read into memory.
const OFFICE_MAX: usize = 64 * 1024 * 1024;
/// Decompressed bytes read from a single XML part (zip-bomb protection).
const PART_MAX: u64 = 50 * 1024 * 1024;

/// Extract visible text from an office container. Malformed containers are
/// absorbed: warning logged, no content entry appended.
pub fn decode_office(content_size: usize, f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, OFFICE_MAX) else {
        return;
    };

    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes.as_slice())) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "office container is not a readable zip");
            return;
        }
    };

    let mut parts: Vec<String> = archive
        .file_names()
        .filter(|n| {
            *n == "word/document.xml"
                || *n == "xl/sharedStrings.xml"
                || *n == "content.xml"
                || (n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        })
        .map(|s| s.to_string())
        .collect();
    parts.sort();

    let mut out = String::new();
    for name in parts {
        let Ok(entry) = archive.by_name(&name) else {
            continue;
        };
        let mut xml = Vec::new();
        if entry.take(PART_MAX).read_to_end(&mut xml).is_err() {
            continue;
        }

        // content.xml carries prose in ordinary elements; OOXML parts keep
        // visible text inside `t` elements only.
        let piece = if name == "content.xml" {
            collect_all_text(&xml, content_size.saturating_sub(out.len()))
        } else {
            collect_t_elements(&xml, content_size.saturating_sub(out.len()))
        };

        if !piece.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&piece);
        }
        if out.len() >= content_size {
            break;
        }
    }

    let out = sanitize(&out);
    if !out.is_empty() {
        doc.add_meta_str(MetaKey::Content, out);
    }
}

fn collect_t_elements(xml: &[u8], budget: usize) -> String {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(Event::Text(t)) if in_t => {
                let piece = t.unescape().unwrap_or_default();
                if !piece.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&piece);
                    if out.len() >= budget {
                        break;
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(error = %err, "office XML parse stopped early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    out
}

fn collect_all_text(xml: &[u8], budget: usize) -> String {
    super::text::strip_tags(xml, budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocId, MetaValue};
    use std::io::Write;

    fn doc() -> Document {
        let id = DocId::from_rel_path("o");
        Document::new(id, "/r/o".to_string(), 3, 4, 0, 0, None)
    }

    fn zip_of(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut bytes));
            let options: zip::write::SimpleFileOptions = Default::default();
            for (name, body) in parts {
                writer.start_file(*name, options).unwrap();
                writer.write_all(body).unwrap();
            }
            writer.finish().unwrap();
        }
        bytes
    }

    #[test]
    fn docx_body_text() {
        let xml = br#"<?xml version="1.0"?><w:document xmlns:w="ns"><w:body><w:p><w:r><w:t>quarterly report</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = zip_of(&[("word/document.xml", xml.as_slice())]);
        let mut f = Vfile::from_buffer("mem", bytes, true);
        let mut d = doc();
        decode_office(4096, &mut f, &mut d);
        assert_eq!(
            d.meta()[0].value,
            MetaValue::Str("quarterly report".to_string())
        );
    }

    #[test]
    fn xlsx_shared_strings() {
        let xml = br#"<sst><si><t>alpha</t></si><si><t>beta</t></si></sst>"#;
        let bytes = zip_of(&[("xl/sharedStrings.xml", xml.as_slice())]);
        let mut f = Vfile::from_buffer("mem", bytes, true);
        let mut d = doc();
        decode_office(4096, &mut f, &mut d);
        assert_eq!(d.meta()[0].value, MetaValue::Str("alpha beta".to_string()));
    }

    #[test]
    fn odt_content() {
        let xml = br#"<office:document-content xmlns:office="ns"><office:body><text:p xmlns:text="ns2">open document text</text:p></office:body></office:document-content>"#;
        let bytes = zip_of(&[("content.xml", xml.as_slice())]);
        let mut f = Vfile::from_buffer("mem", bytes, true);
        let mut d = doc();
        decode_office(4096, &mut f, &mut d);
        assert_eq!(
            d.meta()[0].value,
            MetaValue::Str("open document text".to_string())
        );
    }

    #[test]
    fn malformed_container_is_absorbed() {
        let mut f = Vfile::from_buffer("mem", b"not a zip at all".to_vec(), true);
        let mut d = doc();
        decode_office(4096, &mut f, &mut d);
        assert!(d.meta().is_empty());
    }
}
