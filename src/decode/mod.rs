//! Decoder families invoked by the parse dispatcher.
//!
//! Each family is a capability of shape "read the stream, append zero or
//! more metadata entries to the document". Decoders absorb malformed-input
//! failures internally — a broken file surfaces as reduced metadata plus a
//! logged warning, never as a worker fault. Families whose codecs live
//! outside this crate (media, fonts, comics, legacy formats) are seams the
//! embedder can install through [`DecoderSet`].

pub mod archive;
pub mod ebook;
pub mod office;
pub mod raw;
pub mod sidecar;
pub mod structured;
pub mod text;

use crate::models::Document;
use crate::vfile::Vfile;

/// Type-specific extraction capability. Implementations must leave the
/// stream in a closed-or-closable state and must not panic on malformed
/// input.
pub trait Decoder: Send + Sync {
    fn decode(&self, f: &mut Vfile, doc: &mut Document);
}

/// Externally installable decoders for families this crate has no built-in
/// codec for. A selected family with no installed decoder leaves the
/// document with basic fields only.
#[derive(Default)]
pub struct DecoderSet {
    pub media: Option<Box<dyn Decoder>>,
    pub font: Option<Box<dyn Decoder>>,
    pub comic: Option<Box<dyn Decoder>>,
    pub mobi: Option<Box<dyn Decoder>>,
    pub msdoc: Option<Box<dyn Decoder>>,
}

impl DecoderSet {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Read at most `limit` bytes from the stream, absorbing read failures.
/// Returns `None` when the stream errored (the caller logs nothing extra;
/// the warning is emitted here with the stream's label).
pub(crate) fn read_bounded(f: &mut Vfile, limit: usize) -> Option<Vec<u8>> {
    use std::io::Read;
    let mut out = Vec::new();
    match f.by_ref().take(limit as u64).read_to_end(&mut out) {
        Ok(_) => Some(out),
        Err(err) => {
            tracing::warn!(error = %err, "read failed during decode");
            None
        }
    }
}
