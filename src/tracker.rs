//! Incremental scan tracking.
//!
//! Two tables per scan: an immutable snapshot of the previous scan's
//! `(identity, mtime)` pairs, and a concurrently built table of identities
//! observed in the current scan. The snapshot is read without locking (it is
//! read-only for the scan's duration); all mutation goes through one
//! table-wide lock. After the scan, diffing the two yields deletions, and the
//! current table becomes the next scan's snapshot.
//!
//! Entries remember their parent identity so that skipping an unchanged
//! archive carries its nested entries over too: they were not re-observed
//! (the archive was never reopened) but they still exist.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::models::DocId;

#[derive(Clone, Copy)]
struct Entry {
    mtime: i64,
    parent: Option<DocId>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    mtime: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

/// Thread-safe mapping from document identity to last-seen mtime.
pub struct ScanTracker {
    previous: HashMap<DocId, Entry>,
    /// Parent → children index over the previous snapshot, for carry-over.
    children: HashMap<DocId, Vec<DocId>>,
    current: Mutex<HashMap<DocId, Entry>>,
}

impl ScanTracker {
    /// Start with an empty previous snapshot (first scan of a root).
    pub fn empty() -> Self {
        ScanTracker {
            previous: HashMap::new(),
            children: HashMap::new(),
            current: Mutex::new(HashMap::new()),
        }
    }

    /// Load the previous scan's snapshot. A missing file is a first scan,
    /// not an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scan snapshot: {}", path.display()))?;
        let raw: HashMap<String, SnapshotEntry> =
            serde_json::from_str(&content).with_context(|| "Failed to parse scan snapshot")?;

        let mut previous = HashMap::with_capacity(raw.len());
        let mut children: HashMap<DocId, Vec<DocId>> = HashMap::new();
        for (key, entry) in raw {
            let Some(id) = DocId::parse_hex(&key) else {
                continue;
            };
            let parent = entry.parent.as_deref().and_then(DocId::parse_hex);
            previous.insert(
                id,
                Entry {
                    mtime: entry.mtime,
                    parent,
                },
            );
            if let Some(parent) = parent {
                children.entry(parent).or_default().push(id);
            }
        }
        Ok(ScanTracker {
            previous,
            children,
            current: Mutex::new(HashMap::new()),
        })
    }

    /// Mtime recorded for this identity in the previous scan, if any.
    /// Unsynchronized: the snapshot is read-only while workers run.
    pub fn previous_mtime(&self, id: DocId) -> Option<i64> {
        self.previous.get(&id).map(|e| e.mtime)
    }

    /// Decision rule for the dispatcher: unchanged iff the previous snapshot
    /// has this identity and its mtime equals the current one.
    pub fn is_unchanged(&self, id: DocId, mtime: i64) -> bool {
        self.previous_mtime(id) == Some(mtime)
    }

    /// Record that this identity was observed (and parsed) in the current
    /// scan.
    pub fn mark_current(&self, id: DocId, mtime: i64, parent: Option<DocId>) {
        let mut table = self.current.lock().unwrap();
        table.insert(id, Entry { mtime, parent });
    }

    /// Carry an unchanged identity over into the current table, together
    /// with every descendant recorded for it in the previous snapshot: an
    /// unchanged archive is never reopened, so its entries are not
    /// re-observed, yet they still exist and must not diff as deleted.
    pub fn mark_unchanged(&self, id: DocId) {
        let mut table = self.current.lock().unwrap();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(entry) = self.previous.get(&id) {
                table.insert(id, *entry);
            }
            if let Some(kids) = self.children.get(&id) {
                stack.extend(kids.iter().copied());
            }
        }
    }

    /// Identities present in the previous snapshot but never observed this
    /// scan: the files deleted since the last run.
    pub fn deleted(&self) -> Vec<DocId> {
        let current = self.current.lock().unwrap();
        self.previous
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect()
    }

    /// Number of identities observed this scan.
    pub fn current_len(&self) -> usize {
        self.current.lock().unwrap().len()
    }

    /// Persist the current table as the next scan's snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let current = self.current.lock().unwrap();
        let raw: HashMap<String, SnapshotEntry> = current
            .iter()
            .map(|(id, entry)| {
                (
                    id.to_hex(),
                    SnapshotEntry {
                        mtime: entry.mtime,
                        parent: entry.parent.map(|p| p.to_hex()),
                    },
                )
            })
            .collect();
        let content = serde_json::to_string(&raw)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write scan snapshot: {}", path.display()))?;
        Ok(())
    }
}
