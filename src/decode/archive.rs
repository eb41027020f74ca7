//! Archive decoder: zip containers, ustar archives, and filtered compressed
//! single streams.
//!
//! In recurse mode every regular entry becomes a nested parse job carrying
//! this document's identity as its parent; recursion happens through the job
//! queue, never the call stack. In list mode entry names are recorded as
//! metadata without decoding contents.

use std::io::{Cursor, Read};

use flate2::read::GzDecoder;

use crate::config::ArchiveMode;
use crate::mime::MimeTables;
use crate::models::{Document, MetaKey, ParseJob};
use crate::vfile::Vfile;
use crate::walk::path_offsets;

use super::read_bounded;

/// Upper bound on the raw archive read into memory.
const ARCHIVE_MAX: usize = 256 * 1024 * 1024;
/// Decompressed bytes read from a single entry.
const ENTRY_MAX: u64 = 64 * 1024 * 1024;
/// Entries recorded in list mode.
const LIST_MAX: usize = 1000;
/// Entries recursed into per archive.
const RECURSE_MAX: usize = 10_000;

/// Inclusion policy for compressed single streams: parse when the name minus
/// its compression suffix is a tarball or still carries a known extension.
pub fn filtered_name_included(tables: &MimeTables, name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tgz") || lower.ends_with(".tar.gz") {
        return true;
    }
    let stripped = match lower.rsplit_once('.') {
        Some((head, "gz" | "bz2" | "xz" | "zst")) => head,
        _ => return false,
    };
    match stripped.rsplit_once('.') {
        Some((_, inner_ext)) => tables.by_extension(inner_ext).is_some(),
        None => false,
    }
}

/// Decode one archive, spawning nested jobs through `spawn` in recurse mode.
pub fn decode_archive(
    mode: ArchiveMode,
    checksums: bool,
    f: &mut Vfile,
    doc: &mut Document,
    spawn: &mut dyn FnMut(ParseJob),
) {
    if doc.size > ARCHIVE_MAX as u64 {
        tracing::warn!(path = doc.path, size = doc.size, "archive exceeds in-memory bound, skipping");
        return;
    }
    let Some(bytes) = read_bounded(f, ARCHIVE_MAX) else {
        return;
    };

    match doc.mime.essence() {
        "application/zip" | "application/java-archive" => {
            decode_zip(&bytes, mode, checksums, doc, spawn)
        }
        "application/x-tar" => decode_tar(&bytes, mode, checksums, doc, spawn),
        "application/gzip" => decode_gzip(&bytes, mode, checksums, doc, spawn),
        other => {
            tracing::debug!(path = doc.path, mime = other, "no built-in decoder for this archive format");
        }
    }
}

fn child_job(
    parent: &Document,
    entry_name: &str,
    data: Vec<u8>,
    checksums: bool,
) -> ParseJob {
    let path = format!("{}#{}", parent.path, entry_name);
    let (base, ext) = path_offsets(&path);
    let size = data.len() as u64;
    let mut vfile = Vfile::from_buffer(path.clone(), data, true);
    vfile.set_checksum(checksums);
    ParseJob {
        path,
        base,
        ext,
        size,
        mtime: parent.mtime,
        parent: Some(parent.id),
        vfile,
    }
}

fn decode_zip(
    bytes: &[u8],
    mode: ArchiveMode,
    checksums: bool,
    doc: &mut Document,
    spawn: &mut dyn FnMut(ParseJob),
) {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::warn!(path = doc.path, error = %err, "unreadable zip archive");
            return;
        }
    };

    for i in 0..archive.len() {
        let Ok(mut entry) = archive.by_index(i) else {
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();

        match mode {
            ArchiveMode::List => {
                if i >= LIST_MAX {
                    break;
                }
                doc.add_meta_str(MetaKey::ArchiveEntry, name);
            }
            ArchiveMode::Recurse => {
                if i >= RECURSE_MAX {
                    tracing::warn!(path = doc.path, "archive entry limit reached");
                    break;
                }
                let mut data = Vec::new();
                if let Err(err) = entry.by_ref().take(ENTRY_MAX).read_to_end(&mut data) {
                    tracing::warn!(path = doc.path, entry = name, error = %err, "failed to read archive entry");
                    continue;
                }
                spawn(child_job(doc, &name, data, checksums));
            }
            ArchiveMode::Skip => unreachable!("skip mode never reaches the archive decoder"),
        }
    }
}

/// Minimal ustar walk: 512-byte headers, octal sizes, data padded to block
/// size, terminated by a zero block.
fn decode_tar(
    bytes: &[u8],
    mode: ArchiveMode,
    checksums: bool,
    doc: &mut Document,
    spawn: &mut dyn FnMut(ParseJob),
) {
    let mut offset = 0usize;
    let mut seen = 0usize;

    while offset + 512 <= bytes.len() {
        let header = &bytes[offset..offset + 512];
        if header.iter().all(|&b| b == 0) {
            break;
        }

        let name = trimmed_field(&header[0..100]);
        let size = octal_field(&header[124..136]);
        let typeflag = header[156];
        let data_start = offset + 512;
        let data_end = data_start.saturating_add(size);
        if name.is_empty() || data_end > bytes.len() {
            tracing::warn!(path = doc.path, "truncated tar archive");
            break;
        }

        // '0' and NUL both mark regular files.
        if typeflag == b'0' || typeflag == 0 {
            seen += 1;
            match mode {
                ArchiveMode::List => {
                    if seen > LIST_MAX {
                        break;
                    }
                    doc.add_meta_str(MetaKey::ArchiveEntry, name.clone());
                }
                ArchiveMode::Recurse => {
                    if seen > RECURSE_MAX {
                        tracing::warn!(path = doc.path, "archive entry limit reached");
                        break;
                    }
                    let capped = size.min(ENTRY_MAX as usize);
                    let data = bytes[data_start..data_start + capped].to_vec();
                    spawn(child_job(doc, &name, data, checksums));
                }
                ArchiveMode::Skip => unreachable!("skip mode never reaches the archive decoder"),
            }
        }

        offset = data_start + size.div_ceil(512) * 512;
    }
}

fn decode_gzip(
    bytes: &[u8],
    mode: ArchiveMode,
    checksums: bool,
    doc: &mut Document,
    spawn: &mut dyn FnMut(ParseJob),
) {
    let mut decoder = GzDecoder::new(Cursor::new(bytes));
    let mut inner = Vec::new();
    if let Err(err) = decoder.by_ref().take(ENTRY_MAX).read_to_end(&mut inner) {
        tracing::warn!(path = doc.path, error = %err, "gzip decompression failed");
        return;
    }

    let name = doc.name().to_ascii_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        decode_tar(&inner, mode, checksums, doc, spawn);
        return;
    }

    // A single compressed file: the inner entry keeps the name minus the
    // compression suffix.
    let inner_name = doc.name().rsplit_once('.').map(|(head, _)| head.to_string());
    let Some(inner_name) = inner_name else {
        return;
    };
    match mode {
        ArchiveMode::List => doc.add_meta_str(MetaKey::ArchiveEntry, inner_name),
        ArchiveMode::Recurse => spawn(child_job(doc, &inner_name, inner, checksums)),
        ArchiveMode::Skip => unreachable!("skip mode never reaches the archive decoder"),
    }
}

fn trimmed_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).to_string()
}

fn octal_field(bytes: &[u8]) -> usize {
    let text = trimmed_field(bytes);
    usize::from_str_radix(text.trim(), 8).unwrap_or(0)
}
