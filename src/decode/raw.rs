//! Raw camera image decoder.
//!
//! Most raw formats (CR2, NEF, ARW, DNG) are TIFF containers; the probe
//! reads the first image directory for pixel dimensions. Formats with
//! vendor-specific headers simply yield no metadata.

use crate::models::{Document, MetaKey};
use crate::vfile::Vfile;

use super::read_bounded;

/// Enough for the header and a first IFD in practice.
const PROBE_MAX: usize = 64 * 1024;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;

pub fn decode_raw(f: &mut Vfile, doc: &mut Document) {
    let Some(bytes) = read_bounded(f, PROBE_MAX) else {
        return;
    };
    match probe_tiff_dimensions(&bytes) {
        Some((width, height)) => {
            doc.add_meta_int(MetaKey::Width, width as i64);
            doc.add_meta_int(MetaKey::Height, height as i64);
        }
        None => {
            tracing::debug!(path = doc.path, "raw image has no readable TIFF directory");
        }
    }
}

fn probe_tiff_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 8 {
        return None;
    }
    let little = match &bytes[0..2] {
        b"II" => true,
        b"MM" => false,
        _ => return None,
    };
    if read_u16(bytes, 2, little)? != 42 {
        return None;
    }

    let ifd_offset = read_u32(bytes, 4, little)? as usize;
    let count = read_u16(bytes, ifd_offset, little)? as usize;

    let mut width = None;
    let mut height = None;
    for i in 0..count {
        let entry = ifd_offset + 2 + i * 12;
        let tag = read_u16(bytes, entry, little)?;
        if tag != TAG_IMAGE_WIDTH && tag != TAG_IMAGE_LENGTH {
            continue;
        }
        let field_type = read_u16(bytes, entry + 2, little)?;
        // SHORT (3) values sit left-justified in the value field; LONG (4)
        // fills it.
        let value = match field_type {
            3 => read_u16(bytes, entry + 8, little)? as u32,
            4 => read_u32(bytes, entry + 8, little)?,
            _ => continue,
        };
        if tag == TAG_IMAGE_WIDTH {
            width = Some(value);
        } else {
            height = Some(value);
        }
    }
    Some((width?, height?))
}

fn read_u16(bytes: &[u8], offset: usize, little: bool) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(offset..offset + 2)?.try_into().ok()?;
    Some(if little {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    })
}

fn read_u32(bytes: &[u8], offset: usize, little: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(if little {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocId, MetaValue};

    /// Little-endian TIFF with one IFD holding width/height SHORT entries.
    fn tiff_fixture(width: u16, height: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"II");
        out.extend_from_slice(&42u16.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        for (tag, value) in [(TAG_IMAGE_WIDTH, width), (TAG_IMAGE_LENGTH, height)] {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&3u16.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    #[test]
    fn probes_dimensions() {
        let bytes = tiff_fixture(4000, 3000);
        assert_eq!(probe_tiff_dimensions(&bytes), Some((4000, 3000)));
    }

    #[test]
    fn appends_dimension_meta() {
        let id = DocId::from_rel_path("r");
        let mut doc = Document::new(id, "/r/shot.cr2".to_string(), 3, 8, 0, 0, None);
        let mut f = Vfile::from_buffer("mem", tiff_fixture(100, 50), true);
        decode_raw(&mut f, &mut doc);
        assert_eq!(doc.meta()[0].key, MetaKey::Width);
        assert_eq!(doc.meta()[0].value, MetaValue::Int(100));
        assert_eq!(doc.meta()[1].value, MetaValue::Int(50));
    }

    #[test]
    fn non_tiff_yields_nothing() {
        let id = DocId::from_rel_path("r");
        let mut doc = Document::new(id, "/r/shot.raf".to_string(), 3, 8, 0, 0, None);
        let mut f = Vfile::from_buffer("mem", b"FUJIFILM-RAW".to_vec(), true);
        decode_raw(&mut f, &mut doc);
        assert!(doc.meta().is_empty());
    }
}
