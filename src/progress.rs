//! Scan progress reporting.
//!
//! Reports observable progress during a scan so users see what is being
//! walked, parsed, skipped, and failed. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts. The reporter reads the scan-wide
//! counters and the per-worker current-file slots; it never influences
//! control flow.

use std::io::Write;

/// A single progress event for a scan.
#[derive(Clone, Debug)]
pub enum ScanProgressEvent {
    /// The walker is still producing jobs; counts are partial.
    Discovering { found: u64 },
    /// Workers are parsing. Counts are cumulative for this scan.
    Parsing {
        parsed: u64,
        skipped: u64,
        failed: u64,
    },
}

/// Reports scan progress. Implementations write to stderr (human or JSON).
pub trait ScanProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the scan orchestrator.
    fn report(&self, event: ScanProgressEvent);
}

/// Human-friendly progress on stderr: "scan  parsing  1,204 parsed / 310 skipped".
pub struct StderrProgress;

impl ScanProgressReporter for StderrProgress {
    fn report(&self, event: ScanProgressEvent) {
        let line = match &event {
            ScanProgressEvent::Discovering { found } => {
                format!("scan  discovering  {} files\n", format_number(*found))
            }
            ScanProgressEvent::Parsing {
                parsed,
                skipped,
                failed,
            } => {
                format!(
                    "scan  parsing  {} parsed / {} skipped / {} failed\n",
                    format_number(*parsed),
                    format_number(*skipped),
                    format_number(*failed)
                )
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ScanProgressReporter for JsonProgress {
    fn report(&self, event: ScanProgressEvent) {
        let obj = match &event {
            ScanProgressEvent::Discovering { found } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "found": found
            }),
            ScanProgressEvent::Parsing {
                parsed,
                skipped,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "phase": "parsing",
                "parsed": parsed,
                "skipped": skipped,
                "failed": failed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ScanProgressReporter for NoProgress {
    fn report(&self, _event: ScanProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller can pass it to the scan.
    pub fn reporter(&self) -> Box<dyn ScanProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
