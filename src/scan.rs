//! Scan orchestration: walker, worker pool, and the emitter thread.
//!
//! A scan wires the pieces together: the walker produces parse jobs onto a
//! shared MPMC channel, a fixed pool of worker threads runs each job through
//! [`crate::parse::parse`], and a single emitter thread drains finished
//! documents into the sink (which is not thread-safe, so exactly one thread
//! drives it). Archive recursion re-enqueues nested jobs on the same channel;
//! an in-flight counter keeps the scan alive until every spawned job has
//! drained.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Config;
use crate::decode::DecoderSet;
use crate::models::{DocId, ParseJob};
use crate::parse::{parse, ScanCtx};
use crate::progress::{ScanProgressEvent, ScanProgressReporter};
use crate::sink::{Sink, SinkMessage};
use crate::tracker::ScanTracker;
use crate::walk::{run_walk, WalkStats};

const PROGRESS_TICK: Duration = Duration::from_millis(200);

/// Counters for one completed scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanReport {
    pub discovered: u64,
    pub walk_errors: u64,
    pub parsed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub deleted: u64,
}

/// Job queue shared by the walker and the workers. Tracks in-flight jobs so
/// archive-spawned children keep the channel open until everything drains:
/// the channel closes only when the walk has finished AND the last job
/// completed.
struct JobQueue {
    tx: Mutex<Option<Sender<ParseJob>>>,
    pending: AtomicUsize,
    walking: AtomicBool,
}

impl JobQueue {
    fn new(tx: Sender<ParseJob>) -> Self {
        JobQueue {
            tx: Mutex::new(Some(tx)),
            pending: AtomicUsize::new(0),
            walking: AtomicBool::new(true),
        }
    }

    fn submit(&self, job: ParseJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = &*self.tx.lock().unwrap() {
            let _ = tx.send(job);
        }
    }

    fn job_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 && !self.walking.load(Ordering::SeqCst)
        {
            self.close();
        }
    }

    fn walk_finished(&self) {
        self.walking.store(false, Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) == 0 {
            self.close();
        }
    }

    fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}

/// Snapshot file for a scan root, keyed by the root's own identity so
/// distinct roots never share incremental state.
pub fn snapshot_path(config: &Config, root: &Path) -> PathBuf {
    let key = DocId::from_rel_path(&root.to_string_lossy()).to_hex();
    config.scan.state_dir.join(format!("{}.json", key))
}

/// Run one full scan of `root`, emitting into `sink`. Returns the report and
/// the sink (so callers can inspect or reuse it).
///
/// `full` ignores the previous snapshot and re-parses everything. The
/// snapshot of this scan is persisted either way, so the next run is
/// incremental again.
pub fn run_scan<S: Sink>(
    config: &Config,
    root: &Path,
    full: bool,
    decoders: DecoderSet,
    reporter: &dyn ScanProgressReporter,
    sink: S,
) -> Result<(ScanReport, S)> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Scan root does not exist: {}", root.display()))?;

    let snapshot = snapshot_path(config, &root);
    let tracker = if full {
        ScanTracker::empty()
    } else {
        ScanTracker::load(&snapshot)?
    };

    let workers = config.scan.worker_count();
    let ctx = ScanCtx::new(config.scan.clone(), &root, tracker, decoders, workers);

    let (job_tx, job_rx) = unbounded::<ParseJob>();
    let (out_tx, out_rx) = unbounded::<SinkMessage>();
    let queue = JobQueue::new(job_tx);

    let scope_result: Result<(WalkStats, Vec<DocId>, S)> = std::thread::scope(|scope| {
        let emitter = std::thread::Builder::new()
            .name("trawl-emitter".to_string())
            .spawn_scoped(scope, || drive_sink(sink, out_rx))?;

        let handles = (0..workers)
            .map(|worker| {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                let ctx = &ctx;
                let queue = &queue;
                std::thread::Builder::new()
                    .name(format!("trawl-worker-{}", worker))
                    .spawn_scoped(scope, move || {
                        while let Ok(job) = job_rx.recv() {
                            parse(ctx, worker, job, &mut |child| queue.submit(child), &out_tx);
                            queue.job_done();
                        }
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        drop(job_rx);

        // The walker runs on this thread while workers consume. The queue is
        // closed even when the walk errors out, so workers never hang.
        let mut found = 0u64;
        let walk_result = run_walk(&root, &config.scan, |job| {
            found += 1;
            if found % 1000 == 0 {
                reporter.report(ScanProgressEvent::Discovering { found });
            }
            queue.submit(job);
        });
        queue.walk_finished();
        let walk_stats = walk_result?;

        let mut remaining = handles;
        loop {
            remaining.retain(|handle| !handle.is_finished());
            if remaining.is_empty() {
                break;
            }
            std::thread::sleep(PROGRESS_TICK);
            reporter.report(ScanProgressEvent::Parsing {
                parsed: ctx.parsed.load(Ordering::Relaxed),
                skipped: ctx.skipped.load(Ordering::Relaxed),
                failed: ctx.failed.load(Ordering::Relaxed),
            });
            if tracing::enabled!(tracing::Level::TRACE) {
                for worker in 0..ctx.worker_count() {
                    if let Some(path) = ctx.current_file(worker) {
                        tracing::trace!(worker, path, "in flight");
                    }
                }
            }
        }

        // Deletion diff: identities in the previous snapshot never observed
        // this scan left the filesystem since the last run.
        let deleted = ctx.tracker.deleted();
        for id in &deleted {
            let _ = out_tx.send(SinkMessage::Delete(*id));
        }
        drop(out_tx);

        let sink = emitter
            .join()
            .map_err(|_| anyhow::anyhow!("Emitter thread panicked"))?;
        Ok((walk_stats, deleted, sink))
    });
    let (walk_stats, deleted, sink) = scope_result?;

    ctx.tracker.save(&snapshot)?;

    let report = ScanReport {
        discovered: walk_stats.discovered,
        walk_errors: walk_stats.walk_errors,
        parsed: ctx.parsed.load(Ordering::Relaxed),
        skipped: ctx.skipped.load(Ordering::Relaxed),
        failed: ctx.failed.load(Ordering::Relaxed),
        deleted: deleted.len() as u64,
    };
    reporter.report(ScanProgressEvent::Parsing {
        parsed: report.parsed,
        skipped: report.skipped,
        failed: report.failed,
    });
    Ok((report, sink))
}

/// The emitter owns the sink for the scan's duration; sink errors are logged
/// and the scan continues (the affected documents are simply absent from the
/// index until the next run retries them).
fn drive_sink<S: Sink>(mut sink: S, out_rx: Receiver<SinkMessage>) -> S {
    for message in out_rx {
        let result = match message {
            SinkMessage::Index(doc) => {
                let path = doc.path.clone();
                sink.emit(doc)
                    .with_context(|| format!("Failed to index {}", path))
            }
            SinkMessage::Delete(id) => sink
                .delete(id)
                .with_context(|| format!("Failed to delete {}", id)),
            SinkMessage::Merge(id, meta) => sink
                .merge(id, meta)
                .with_context(|| format!("Failed to merge sidecar into {}", id)),
        };
        if let Err(err) = result {
            tracing::error!(error = %err, "sink operation failed");
        }
    }
    if let Err(err) = sink.flush() {
        tracing::error!(error = %err, "sink flush failed");
    }
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetaKey;
    use crate::progress::NoProgress;
    use crate::sink::MemorySink;
    use std::io::Write;

    fn scan(config: &Config, root: &Path) -> (ScanReport, MemorySink) {
        run_scan(
            config,
            root,
            false,
            DecoderSet::new(),
            &NoProgress,
            MemorySink::new(),
        )
        .unwrap()
    }

    fn config_for(dir: &Path) -> Config {
        let mut config = Config::default();
        config.scan.threads = 2;
        config.scan.state_dir = dir.join(".trawl");
        config
    }

    #[test]
    fn scan_emits_documents_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"scanned body").unwrap();
        std::fs::write(dir.path().join("empty.dat"), b"").unwrap();

        let config = config_for(dir.path());
        let (report, sink) = scan(&config, dir.path());

        assert_eq!(report.discovered, 2);
        assert_eq!(report.parsed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(sink.emitted.len(), 2);

        let notes = sink
            .emitted
            .iter()
            .find(|d| d.path.ends_with("notes.txt"))
            .unwrap();
        assert!(notes.meta().iter().any(|m| m.key == MetaKey::Checksum));

        let empty = sink
            .emitted
            .iter()
            .find(|d| d.path.ends_with("empty.dat"))
            .unwrap();
        assert!(empty.meta().is_empty());
    }

    #[test]
    fn second_scan_skips_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stable.txt"), b"unchanging").unwrap();

        let config = config_for(dir.path());
        let (first, _) = scan(&config, dir.path());
        assert_eq!(first.parsed, 1);

        let (second, sink) = scan(&config, dir.path());
        assert_eq!(second.skipped, 1);
        assert_eq!(second.parsed, 0);
        assert!(sink.emitted.is_empty());
        assert!(sink.deleted.is_empty());
    }

    #[test]
    fn full_scan_ignores_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stable.txt"), b"unchanging").unwrap();

        let config = config_for(dir.path());
        scan(&config, dir.path());
        let (report, _) = run_scan(
            &config,
            dir.path(),
            true,
            DecoderSet::new(),
            &NoProgress,
            MemorySink::new(),
        )
        .unwrap();
        assert_eq!(report.parsed, 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn deleted_files_are_removed_from_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let doomed = dir.path().join("doomed.txt");
        std::fs::write(&doomed, b"short-lived").unwrap();

        let config = config_for(dir.path());
        let (_, first_sink) = scan(&config, dir.path());
        let doomed_id = first_sink.emitted[0].id;

        std::fs::remove_file(&doomed).unwrap();
        let (report, sink) = scan(&config, dir.path());
        assert_eq!(report.deleted, 1);
        assert_eq!(sink.deleted, vec![doomed_id]);
    }

    #[test]
    fn archive_children_drain_before_the_scan_ends() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut bytes));
            let options: zip::write::SimpleFileOptions = Default::default();
            writer.start_file("inner/one.txt", options).unwrap();
            writer.write_all(b"first entry").unwrap();
            writer.start_file("two.md", options).unwrap();
            writer.write_all(b"second entry").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(dir.path().join("bundle.zip"), &bytes).unwrap();

        let config = config_for(dir.path());
        let (report, sink) = scan(&config, dir.path());

        // One real file plus two nested entries.
        assert_eq!(report.discovered, 1);
        assert_eq!(report.parsed, 3);

        let parent = sink
            .emitted
            .iter()
            .find(|d| d.path.ends_with("bundle.zip"))
            .unwrap();
        let children: Vec<_> = sink
            .emitted
            .iter()
            .filter(|d| d.parent == Some(parent.id))
            .collect();
        assert_eq!(children.len(), 2);
        assert!(children
            .iter()
            .all(|d| d.meta().iter().any(|m| m.key == MetaKey::Parent)));
    }

    #[test]
    fn unchanged_archive_keeps_its_children_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut bytes));
            let options: zip::write::SimpleFileOptions = Default::default();
            writer.start_file("inner.txt", options).unwrap();
            writer.write_all(b"entry body").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(dir.path().join("bundle.zip"), &bytes).unwrap();

        let config = config_for(dir.path());
        let (first, _) = scan(&config, dir.path());
        assert_eq!(first.parsed, 2);

        // The archive is unchanged, so it is never reopened; its entry must
        // still not diff as deleted.
        let (second, sink) = scan(&config, dir.path());
        assert_eq!(second.skipped, 1);
        assert_eq!(second.parsed, 0);
        assert_eq!(second.deleted, 0);
        assert!(sink.deleted.is_empty());
    }

    #[test]
    fn sidecar_reaches_the_sink_as_a_merge() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.txt"), b"the photo notes").unwrap();
        std::fs::write(
            dir.path().join("photo.txt.sidecar"),
            br#"{"title": "Holiday"}"#,
        )
        .unwrap();

        let config = config_for(dir.path());
        let (report, sink) = scan(&config, dir.path());

        // The sidecar itself is never emitted as a document.
        assert_eq!(report.discovered, 2);
        assert_eq!(sink.emitted.len(), 1);
        assert_eq!(sink.merged.len(), 1);
        assert_eq!(sink.merged[0].0, sink.emitted[0].id);
    }

    #[test]
    fn distinct_roots_have_distinct_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let a = snapshot_path(&config, Path::new("/data/a"));
        let b = snapshot_path(&config, Path::new("/data/b"));
        assert_ne!(a, b);
    }
}
