//! The per-file parse pipeline and its shared scan state.
//!
//! One call to [`parse`] takes a job from classification through dispatch to
//! the finished document: incremental short-circuit, mime resolution
//! (extension first, content sniff second), exactly one decoder family, then
//! finalize (parent entry, checksum entry, handoff to the emitter).
//!
//! [`ScanCtx`] is the scan-wide shared context: configuration, mime tables,
//! tracking tables, counters, and the per-worker current-file slots used by
//! diagnostics. It is built once before workers start and shared by `Arc`.

use crossbeam_channel::Sender;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::{ArchiveMode, ScanConfig};
use crate::decode::archive::filtered_name_included;
use crate::decode::sidecar::SIDECAR_SUFFIX;
use crate::decode::{self, DecoderSet};
use crate::mime::{Major, MimeCode, MimeTables};
use crate::models::{DocId, Document, MetaKey, ParseJob};
use crate::sink::SinkMessage;
use crate::sniff;
use crate::tracker::ScanTracker;

/// Videos smaller than this carry no useful frames for the media decoder.
pub const MIN_VIDEO_SIZE: u64 = 1024 * 64;
/// Images smaller than this are icons and decoration.
pub const MIN_IMAGE_SIZE: u64 = 512;

/// Scan-wide shared context. Initialized once, read/written concurrently
/// during the scan, torn down after all workers finish.
pub struct ScanCtx {
    pub config: ScanConfig,
    pub mimes: MimeTables,
    pub tracker: ScanTracker,
    pub decoders: DecoderSet,
    /// Files short-circuited by the incremental check.
    pub skipped: AtomicU64,
    /// Jobs abandoned on I/O failure.
    pub failed: AtomicU64,
    /// Documents handed to the emitter.
    pub parsed: AtomicU64,
    root_prefix: String,
    current_files: Vec<Mutex<Option<String>>>,
}

impl ScanCtx {
    pub fn new(
        config: ScanConfig,
        root: &Path,
        tracker: ScanTracker,
        decoders: DecoderSet,
        workers: usize,
    ) -> Self {
        let mut root_prefix = root.to_string_lossy().to_string();
        if !root_prefix.ends_with('/') {
            root_prefix.push('/');
        }
        ScanCtx {
            config,
            mimes: MimeTables::new(),
            tracker,
            decoders,
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            parsed: AtomicU64::new(0),
            root_prefix,
            current_files: (0..workers).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Path relative to the scan root; identities derive from this.
    pub fn rel_path<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix(&self.root_prefix).unwrap_or(path)
    }

    fn set_current(&self, worker: usize, path: &str) {
        if let Some(slot) = self.current_files.get(worker) {
            *slot.lock().unwrap() = Some(path.to_string());
        }
    }

    /// The file a worker is currently processing. Diagnostics only, never
    /// control flow.
    pub fn current_file(&self, worker: usize) -> Option<String> {
        self.current_files
            .get(worker)
            .and_then(|slot| slot.lock().unwrap().clone())
    }

    pub fn worker_count(&self) -> usize {
        self.current_files.len()
    }
}

/// Resolve a mime code for the job, in strict order: empty-file sentinel,
/// extension lookup, then content sniffing.
///
/// `Ok(code)` may still be unknown (classification exhausted); `Err(())`
/// means the job must be abandoned (sniff read failure, already counted).
fn classify(ctx: &ScanCtx, job: &mut ParseJob) -> Result<MimeCode, ()> {
    if job.size == 0 {
        return Ok(MimeCode::EMPTY);
    }

    let mut mime = MimeCode::UNKNOWN;
    let has_real_ext = job.ext < job.path.len() && job.ext - job.base != 1;
    if has_real_ext {
        if let Some(code) = ctx.mimes.by_extension(&job.path[job.ext..]) {
            mime = code;
        }
    }

    if mime.is_unknown() && !ctx.config.fast {
        if !job.vfile.rewindable() {
            tracing::warn!(
                path = job.path,
                "stream does not support rewindable reads, cannot sniff content type"
            );
            return Ok(MimeCode::UNKNOWN);
        }

        let mut buf = vec![0u8; sniff::SNIFF_BUF_SIZE];
        let read = match job.vfile.read_some(&mut buf) {
            Ok(read) => read,
            Err(err) => {
                if job.vfile.is_real_fs() {
                    tracing::error!(path = job.path, error = %err, "read failed during sniff");
                } else {
                    tracing::error!(path = job.path, error = %err, "virtual read failed during sniff");
                }
                ctx.failed.fetch_add(1, Ordering::Relaxed);
                return Err(());
            }
        };

        if let Some(essence) = sniff::sniff(&buf[..read]) {
            tracing::debug!(path = job.path, essence, "content sniff");
            match ctx.mimes.by_essence(essence) {
                Some(code) => mime = code,
                None => {
                    tracing::warn!(path = job.path, essence, "sniffed mime has no code mapping");
                }
            }
        }

        // Rewind so the decoder stage re-reads from the start.
        if let Err(err) = job.vfile.rewind() {
            tracing::warn!(path = job.path, error = %err, "rewind after sniff failed");
        }
    }

    Ok(mime)
}

/// Run one parse job to completion. Nested archive entries are re-enqueued
/// through `spawn`; finished work reaches the emitter through `out`.
pub fn parse(
    ctx: &ScanCtx,
    worker: usize,
    mut job: ParseJob,
    spawn: &mut dyn FnMut(ParseJob),
    out: &Sender<SinkMessage>,
) {
    ctx.set_current(worker, &job.path);

    let rel = ctx.rel_path(&job.path).to_string();
    let id = DocId::from_rel_path(&rel);

    // Incremental short-circuit: unchanged files are carried over into the
    // new table but never re-parsed.
    if ctx.tracker.is_unchanged(id, job.mtime) {
        ctx.tracker.mark_unchanged(id);
        ctx.skipped.fetch_add(1, Ordering::Relaxed);
        job.vfile.close();
        return;
    }
    ctx.tracker.mark_current(id, job.mtime, job.parent);

    let mut doc = Document::new(
        id,
        job.path.clone(),
        job.base,
        job.ext,
        job.size,
        job.mtime,
        job.parent,
    );

    tracing::debug!(path = job.path, id = %id, "starting parse job");

    doc.mime = match classify(ctx, &mut job) {
        Ok(mime) => mime,
        Err(()) => {
            job.vfile.close();
            return;
        }
    };

    let mime = doc.mime;
    let major = mime.major();
    let content_size = ctx.config.content_size;

    if !mime.should_parse() {
        // Excluded from parsing: metadata limited to basic fields.
    } else if mime.is_raw() {
        decode::raw::decode_raw(&mut job.vfile, &mut doc);
    } else if (major == Major::Video && doc.size >= MIN_VIDEO_SIZE)
        || (major == Major::Image && doc.size >= MIN_IMAGE_SIZE)
        || major == Major::Audio
    {
        if let Some(media) = &ctx.decoders.media {
            media.decode(&mut job.vfile, &mut doc);
        }
    } else if mime.is_pdf() {
        decode::ebook::decode_ebook(content_size, &mut job.vfile, &mut doc);
    } else if major == Major::Text && content_size > 0 {
        if mime.is_markup() {
            decode::text::decode_markup(content_size, &mut job.vfile, &mut doc);
        } else {
            decode::text::decode_text(content_size, &mut job.vfile, &mut doc);
        }
    } else if major == Major::Font {
        if let Some(font) = &ctx.decoders.font {
            font.decode(&mut job.vfile, &mut doc);
        }
    } else if ctx.config.archive_mode != ArchiveMode::Skip
        && (mime.is_archive()
            || (mime.is_archive_filter() && filtered_name_included(&ctx.mimes, doc.name())))
    {
        decode::archive::decode_archive(
            ctx.config.archive_mode,
            ctx.config.checksums,
            &mut job.vfile,
            &mut doc,
            spawn,
        );
    } else if ((ctx.config.office_content && content_size > 0) || ctx.config.thumbnails)
        && mime.is_office()
    {
        decode::office::decode_office(content_size, &mut job.vfile, &mut doc);
    } else if mime.is_comic() {
        if let Some(comic) = &ctx.decoders.comic {
            comic.decode(&mut job.vfile, &mut doc);
        }
    } else if mime.is_mobi() {
        if let Some(mobi) = &ctx.decoders.mobi {
            mobi.decode(&mut job.vfile, &mut doc);
        }
    } else if mime.is_sidecar() {
        // A sidecar attaches metadata to another document and terminates
        // here: no checksum, no parent entry, no emit for this job.
        if let Some(entries) = decode::sidecar::decode_sidecar(&mut job.vfile, &doc) {
            match rel.strip_suffix(SIDECAR_SUFFIX) {
                Some(target_rel) => {
                    let target = DocId::from_rel_path(target_rel);
                    let _ = out.send(SinkMessage::Merge(target, entries));
                }
                None => {
                    tracing::warn!(path = job.path, "sidecar without a target filename");
                }
            }
        }
        job.vfile.close();
        return;
    } else if mime.is_msdoc() {
        if let Some(msdoc) = &ctx.decoders.msdoc {
            msdoc.decode(&mut job.vfile, &mut doc);
        }
    } else if mime.is_json() {
        decode::structured::decode_json(&mut job.vfile, &mut doc);
    } else if mime.is_ndjson() {
        decode::structured::decode_ndjson(&mut job.vfile, &mut doc);
    }

    if let Some(parent) = job.parent {
        doc.add_meta_str(MetaKey::Parent, parent.to_hex());
    }

    job.vfile.close();
    if let Some(checksum) = job.vfile.checksum_hex() {
        doc.add_meta_str(MetaKey::Checksum, checksum);
    }

    ctx.parsed.fetch_add(1, Ordering::Relaxed);
    let _ = out.send(SinkMessage::Index(doc));
}
