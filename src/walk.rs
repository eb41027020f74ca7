//! Directory walk: produces one parse job per regular file.
//!
//! The walker guarantees the job-producer contract: valid path and offset
//! fields, an empty parent identity, and a lazily-opened stream bound to the
//! file. Walk errors are logged and counted, never fatal.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::models::ParseJob;
use crate::vfile::Vfile;

/// Counters for one walk.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    pub discovered: u64,
    pub walk_errors: u64,
}

/// Compute the basename-start and extension-start byte offsets for a path.
///
/// The extension offset points just past the last dot of the basename and
/// equals `path.len()` when there is none. A bare leading dot (`.gitignore`)
/// is not an extension; the classifier checks `ext - base != 1` for that.
pub fn path_offsets(path: &str) -> (usize, usize) {
    let base = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &path[base..];
    let ext = match name.rfind('.') {
        Some(i) => base + i + 1,
        None => path.len(),
    };
    (base, ext)
}

/// Walk `root` and hand every regular file to `submit` as a parse job.
pub fn run_walk(
    root: &Path,
    config: &ScanConfig,
    mut submit: impl FnMut(ParseJob),
) -> Result<WalkStats> {
    let mut patterns = vec!["**/.trawl/**".to_string()];
    patterns.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&patterns)?;

    let mut stats = WalkStats::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "walk error");
                stats.walk_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "stat failed");
                stats.walk_errors += 1;
                continue;
            }
        };
        let mtime = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let path_str = path.to_string_lossy().to_string();
        let (base, ext) = path_offsets(&path_str);
        let mut vfile = Vfile::from_path(path);
        vfile.set_checksum(config.checksums);

        submit(ParseJob {
            path: path_str,
            base,
            ext,
            size: metadata.len(),
            mtime,
            parent: None,
            vfile,
        });
        stats.discovered += 1;
    }

    Ok(stats)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
