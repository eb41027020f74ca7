//! Content sniffing through a compiled signature database.
//!
//! Used by the classifier when extension lookup yields nothing: a bounded
//! prefix of the stream is matched against byte signatures, most specific
//! first. Each signature is a set of (offset, bytes) parts that must all
//! match. A printable-text heuristic runs last so extensionless scripts and
//! notes still classify as plain text.

/// Size of the prefix read for sniffing.
pub const SNIFF_BUF_SIZE: usize = 4096;

struct Part {
    offset: usize,
    bytes: &'static [u8],
}

struct Signature {
    parts: &'static [Part],
    essence: &'static str,
}

macro_rules! sig {
    ($essence:expr, $([$offset:expr, $bytes:expr]),+) => {
        Signature {
            parts: &[$(Part { offset: $offset, bytes: $bytes }),+],
            essence: $essence,
        }
    };
}

/// Signature database, ordered most specific first. Multi-part signatures
/// (RIFF containers) come before their generic prefixes would ever match.
static SIGNATURES: &[Signature] = &[
    sig!("image/png", [0, b"\x89PNG\r\n\x1a\n"]),
    sig!("image/gif", [0, b"GIF87a"]),
    sig!("image/gif", [0, b"GIF89a"]),
    sig!("image/jpeg", [0, b"\xff\xd8\xff"]),
    sig!("image/tiff", [0, b"II*\x00"]),
    sig!("image/tiff", [0, b"MM\x00*"]),
    sig!("image/webp", [0, b"RIFF"], [8, b"WEBP"]),
    sig!("audio/x-wav", [0, b"RIFF"], [8, b"WAVE"]),
    sig!("video/x-msvideo", [0, b"RIFF"], [8, b"AVI "]),
    sig!("audio/flac", [0, b"fLaC"]),
    sig!("audio/ogg", [0, b"OggS"]),
    sig!("audio/mpeg", [0, b"ID3"]),
    sig!("video/mp4", [4, b"ftyp"]),
    sig!("video/x-matroska", [0, b"\x1aE\xdf\xa3"]),
    sig!("application/pdf", [0, b"%PDF-"]),
    sig!("application/x-mobipocket-ebook", [60, b"BOOKMOBI"]),
    sig!("application/gzip", [0, b"\x1f\x8b"]),
    sig!("application/x-bzip2", [0, b"BZh"]),
    sig!("application/x-xz", [0, b"\xfd7zXZ\x00"]),
    sig!("application/zstd", [0, b"\x28\xb5\x2f\xfd"]),
    sig!("application/x-7z-compressed", [0, b"7z\xbc\xaf\x27\x1c"]),
    sig!("application/vnd.rar", [0, b"Rar!\x1a\x07"]),
    sig!("application/zip", [0, b"PK\x03\x04"]),
    sig!("application/x-tar", [257, b"ustar"]),
    sig!("application/msword", [0, b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1"]),
    sig!("application/x-sqlite3", [0, b"SQLite format 3\x00"]),
    sig!("font/woff", [0, b"wOFF"]),
    sig!("font/woff2", [0, b"wOF2"]),
    sig!("font/ttf", [0, b"\x00\x01\x00\x00"]),
    sig!("font/otf", [0, b"OTTO"]),
    sig!("text/html", [0, b"<!DOCTYPE html"]),
    sig!("text/html", [0, b"<html"]),
    sig!("text/xml", [0, b"<?xml"]),
    sig!("image/bmp", [0, b"BM"]),
];

fn matches(sig: &Signature, buf: &[u8]) -> bool {
    sig.parts.iter().all(|p| {
        let end = p.offset + p.bytes.len();
        buf.len() >= end && &buf[p.offset..end] == p.bytes
    })
}

/// Match a byte prefix against the signature database.
///
/// Returns the canonical mime string of the first matching signature, or
/// `text/plain` when the prefix looks like printable text, or `None` when
/// the content cannot be identified.
pub fn sniff(buf: &[u8]) -> Option<&'static str> {
    if buf.is_empty() {
        return None;
    }
    for sig in SIGNATURES {
        if matches(sig, buf) {
            return Some(sig.essence);
        }
    }
    if looks_textual(buf) {
        return Some("text/plain");
    }
    None
}

/// Printable-text heuristic: no NUL bytes and a low proportion of control
/// characters other than whitespace.
fn looks_textual(buf: &[u8]) -> bool {
    let mut control = 0usize;
    for &b in buf {
        if b == 0 {
            return false;
        }
        if b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t' && b != 0x0c {
            control += 1;
        }
    }
    control * 32 < buf.len().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png() {
        let buf = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        assert_eq!(sniff(buf), Some("image/png"));
    }

    #[test]
    fn sniffs_pdf() {
        assert_eq!(sniff(b"%PDF-1.7 rest of header"), Some("application/pdf"));
    }

    #[test]
    fn sniffs_zip() {
        assert_eq!(sniff(b"PK\x03\x04\x14\x00"), Some("application/zip"));
    }

    #[test]
    fn riff_variants_disambiguated() {
        assert_eq!(sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some("audio/x-wav"));
        assert_eq!(sniff(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some("image/webp"));
    }

    #[test]
    fn mp4_at_offset() {
        assert_eq!(sniff(b"\x00\x00\x00\x20ftypisom"), Some("video/mp4"));
    }

    #[test]
    fn plain_text_fallback() {
        assert_eq!(sniff(b"#!/bin/sh\necho hello\n"), Some("text/plain"));
    }

    #[test]
    fn binary_garbage_is_unknown() {
        let buf: Vec<u8> = (0u16..64).map(|i| (i % 7) as u8).collect();
        assert_eq!(sniff(&buf), None);
    }

    #[test]
    fn empty_buffer_is_unknown() {
        assert_eq!(sniff(b""), None);
    }
}
