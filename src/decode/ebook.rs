//! PDF-like document-container decoder (PDF and EPUB).

use std::io::{Cursor, Read};

use crate::models::{Document, MetaKey};
use crate::vfile::Vfile;

use super::read_bounded;
use super::text::{sanitize, strip_tags};

/// Upper bound on the raw container read into memory.
const EBOOK_MAX: usize = 64 * 1024 * 1024;
/// Decompressed bytes read from a single EPUB chapter.
const CHAPTER_MAX: u64 = 8 * 1024 * 1024;

/// Extract text from a PDF-like container. Failures are absorbed: a broken
/// file yields a warning and no content entry.
pub fn decode_ebook(content_size: usize, f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, EBOOK_MAX) else {
        return;
    };

    let text = if doc.mime.essence() == "application/pdf" {
        extract_pdf(&bytes, doc)
    } else {
        extract_epub(&bytes, content_size, doc)
    };

    if let Some(text) = text {
        let mut text = sanitize(&text);
        text.truncate(content_size);
        if !text.is_empty() {
            doc.add_meta_str(MetaKey::Content, text);
        }
    }
}

fn extract_pdf(bytes: &[u8], doc: &Document) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "PDF extraction failed");
            None
        }
    }
}

/// EPUB is a zip of XHTML chapters; tag-strip each chapter in archive order
/// until the budget is filled.
fn extract_epub(bytes: &[u8], content_size: usize, doc: &Document) -> Option<String> {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "EPUB container is not a readable zip");
            return None;
        }
    };

    let mut chapter_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.ends_with(".xhtml") || n.ends_with(".html") || n.ends_with(".htm"))
        .map(|s| s.to_string())
        .collect();
    chapter_names.sort();

    let mut out = String::new();
    for name in chapter_names {
        let Ok(entry) = archive.by_name(&name) else {
            continue;
        };
        let mut xml = Vec::new();
        if entry.take(CHAPTER_MAX).read_to_end(&mut xml).is_err() {
            continue;
        }
        let piece = strip_tags(&xml, content_size.saturating_sub(out.len()));
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

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::MimeTables;
    use crate::models::DocId;
    use std::io::Write;

    fn doc_with_mime(essence: &str) -> Document {
        let id = DocId::from_rel_path("b");
        let mut doc = Document::new(id, "/r/b".to_string(), 3, 4, 0, 0, None);
        doc.mime = MimeTables::new().by_essence(essence).unwrap();
        doc
    }

    #[test]
    fn broken_pdf_is_absorbed() {
        let mut f = Vfile::from_buffer("mem", b"%PDF-1.4 truncated garbage".to_vec(), true);
        let mut d = doc_with_mime("application/pdf");
        decode_ebook(4096, &mut f, &mut d);
        assert!(d.meta().is_empty());
    }

    #[test]
    fn epub_chapters_are_extracted() {
        let mut zip_bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut zip_bytes));
            let options: zip::write::SimpleFileOptions = Default::default();
            writer.start_file("ch1.xhtml", options).unwrap();
            writer
                .write_all(b"<html><body><p>chapter one</p></body></html>")
                .unwrap();
            writer.start_file("ch2.xhtml", options).unwrap();
            writer
                .write_all(b"<html><body><p>chapter two</p></body></html>")
                .unwrap();
            writer.finish().unwrap();
        }

        let mut f = Vfile::from_buffer("mem", zip_bytes, true);
        let mut d = doc_with_mime("application/epub+zip");
        decode_ebook(4096, &mut f, &mut d);
        assert_eq!(d.meta().len(), 1);
        match &d.meta()[0].value {
            crate::models::MetaValue::Str(s) => {
                assert!(s.contains("chapter one"));
                assert!(s.contains("chapter two"));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn not_a_container_is_absorbed() {
        let mut f = Vfile::from_buffer("mem", b"plainly not an epub".to_vec(), true);
        let mut d = doc_with_mime("application/epub+zip");
        decode_ebook(4096, &mut f, &mut d);
        assert!(d.meta().is_empty());
    }
}
