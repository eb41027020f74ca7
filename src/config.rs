use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// How archive contents are handled by the dispatcher.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    /// Archives are classified but never opened.
    Skip,
    /// Entry names are recorded as metadata; contents are not parsed.
    List,
    /// Entries are re-enqueued as nested parse jobs.
    Recurse,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Worker threads. 0 means one per available CPU.
    #[serde(default)]
    pub threads: usize,

    /// Skip content sniffing for files whose extension resolves nothing.
    #[serde(default)]
    pub fast: bool,

    /// Accumulate a SHA-256 checksum while each file is decoded.
    #[serde(default = "default_checksums")]
    pub checksums: bool,

    /// Glob patterns excluded from the walk, relative to the scan root.
    #[serde(default)]
    pub exclude_globs: Vec<String>,

    /// Text-extraction budget in bytes. 0 disables text extraction.
    #[serde(default = "default_content_size")]
    pub content_size: usize,

    #[serde(default = "default_archive_mode")]
    pub archive_mode: ArchiveMode,

    /// Extract text from office documents.
    #[serde(default = "default_office_content")]
    pub office_content: bool,

    /// Generate thumbnails (gates the office branch alongside text
    /// extraction; actual rendering lives in the media decoder seam).
    #[serde(default)]
    pub thumbnails: bool,

    /// Directory holding scan snapshots for incremental re-scans.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_checksums() -> bool {
    true
}
fn default_content_size() -> usize {
    32768
}
fn default_archive_mode() -> ArchiveMode {
    ArchiveMode::Recurse
}
fn default_office_content() -> bool {
    true
}
fn default_state_dir() -> PathBuf {
    PathBuf::from("./.trawl")
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            threads: 0,
            fast: false,
            checksums: default_checksums(),
            exclude_globs: Vec::new(),
            content_size: default_content_size(),
            archive_mode: default_archive_mode(),
            office_content: default_office_content(),
            thumbnails: false,
            state_dir: default_state_dir(),
        }
    }
}

impl ScanConfig {
    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    /// Sink backend: `elasticsearch` or `jsonl`.
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,

    /// Search-engine base URL.
    #[serde(default = "default_sink_url")]
    pub url: String,

    /// Index name documents are written to.
    #[serde(default = "default_sink_index")]
    pub index: String,

    /// Output path for the `jsonl` sink.
    #[serde(default = "default_sink_output")]
    pub output: PathBuf,

    /// Bulk operations buffered before a flush.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Elasticsearch,
    Jsonl,
}

fn default_sink_kind() -> SinkKind {
    SinkKind::Elasticsearch
}
fn default_sink_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_sink_index() -> String {
    "trawl".to_string()
}
fn default_sink_output() -> PathBuf {
    PathBuf::from("./trawl.ndjson")
}
fn default_bulk_size() -> usize {
    100
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            kind: default_sink_kind(),
            url: default_sink_url(),
            index: default_sink_index(),
            output: default_sink_output(),
            bulk_size: default_bulk_size(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file when it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.scan.threads > 512 {
        anyhow::bail!("scan.threads must be <= 512");
    }
    if config.sink.bulk_size == 0 {
        anyhow::bail!("sink.bulk_size must be > 0");
    }
    if config.sink.kind == SinkKind::Elasticsearch && config.sink.url.is_empty() {
        anyhow::bail!("sink.url must be set for the elasticsearch sink");
    }
    if config.sink.index.is_empty() {
        anyhow::bail!("sink.index must not be empty");
    }
    Ok(())
}
