//! Uniform byte-stream abstraction over real files and archive entries.
//!
//! A [`Vfile`] opens lazily on first read, optionally accumulates a SHA-256
//! checksum over everything read through it, and finalizes that checksum
//! exactly once on close. Open failures surface as the first read's error
//! rather than a separate error path, so callers distinguish "stream ended"
//! (`Ok(0)`) from "open/read error" (`Err`).

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Length of a finalized checksum in bytes.
pub const CHECKSUM_LEN: usize = 32;

enum Source {
    Fs(PathBuf),
    Buffer(Vec<u8>),
}

enum Backing {
    File(File),
    Cursor(Cursor<Vec<u8>>),
}

enum State {
    Unopened(Source),
    Open(Backing),
    Closed,
}

/// A virtual file stream. See the module docs for the contract.
pub struct Vfile {
    label: String,
    state: State,
    rewindable: bool,
    real_fs: bool,
    calculate_checksum: bool,
    hasher: Option<Sha256>,
    checksum: Option<[u8; CHECKSUM_LEN]>,
}

impl Vfile {
    /// Stream backed by a real filesystem path. Always rewindable.
    pub fn from_path(path: &Path) -> Self {
        Vfile {
            label: path.display().to_string(),
            state: State::Unopened(Source::Fs(path.to_path_buf())),
            rewindable: true,
            real_fs: true,
            calculate_checksum: false,
            hasher: None,
            checksum: None,
        }
    }

    /// Stream backed by an in-memory buffer (an archive entry, usually).
    /// Some virtual sources cannot be re-read, hence the `rewindable` flag.
    pub fn from_buffer(label: impl Into<String>, data: Vec<u8>, rewindable: bool) -> Self {
        Vfile {
            label: label.into(),
            state: State::Unopened(Source::Buffer(data)),
            rewindable,
            real_fs: false,
            calculate_checksum: false,
            hasher: None,
            checksum: None,
        }
    }

    /// Enable checksum accumulation. Must be set before the first read.
    pub fn set_checksum(&mut self, on: bool) {
        self.calculate_checksum = on;
    }

    /// Whether the backing supports rewind-and-reread.
    pub fn rewindable(&self) -> bool {
        self.rewindable
    }

    /// Whether the stream is backed by a real filesystem file.
    pub fn is_real_fs(&self) -> bool {
        self.real_fs
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn open_backing(source: Source) -> io::Result<Backing> {
        match source {
            Source::Fs(path) => Ok(Backing::File(File::open(path)?)),
            Source::Buffer(data) => Ok(Backing::Cursor(Cursor::new(data))),
        }
    }

    /// Read into `buf`, opening the stream on the first call. `Ok(0)` means
    /// end-of-stream; errors cover both open and read failures.
    pub fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let State::Unopened(_) = self.state {
            let state = std::mem::replace(&mut self.state, State::Closed);
            let source = match state {
                State::Unopened(source) => source,
                _ => unreachable!(),
            };
            match Self::open_backing(source) {
                Ok(backing) => {
                    if self.calculate_checksum {
                        self.hasher = Some(Sha256::new());
                    }
                    self.state = State::Open(backing);
                }
                Err(err) => return Err(err),
            }
        }

        let n = match &mut self.state {
            State::Open(Backing::File(f)) => f.read(buf)?,
            State::Open(Backing::Cursor(c)) => c.read(buf)?,
            State::Closed => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "read on closed stream",
                ))
            }
            State::Unopened(_) => unreachable!(),
        };

        if n > 0 {
            if let Some(hasher) = &mut self.hasher {
                hasher.update(&buf[..n]);
            }
        }
        Ok(n)
    }

    /// Rewind to the start. Requires the rewind capability; callers must
    /// check [`Vfile::rewindable`] before relying on a second read pass.
    /// Checksum accumulation restarts so the finalized digest covers exactly
    /// one full pass over the content.
    pub fn rewind(&mut self) -> io::Result<()> {
        if !self.rewindable {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream does not support rewind",
            ));
        }
        match &mut self.state {
            State::Unopened(_) => Ok(()),
            State::Open(Backing::File(f)) => {
                f.seek(SeekFrom::Start(0))?;
                if self.calculate_checksum {
                    self.hasher = Some(Sha256::new());
                }
                Ok(())
            }
            State::Open(Backing::Cursor(c)) => {
                c.set_position(0);
                if self.calculate_checksum {
                    self.hasher = Some(Sha256::new());
                }
                Ok(())
            }
            State::Closed => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "rewind on closed stream",
            )),
        }
    }

    /// Close the stream, finalizing the checksum exactly once. Safe to call
    /// on an unopened stream (no checksum is produced) and idempotent.
    pub fn close(&mut self) -> Option<[u8; CHECKSUM_LEN]> {
        match self.state {
            State::Open(_) => {
                if let Some(hasher) = self.hasher.take() {
                    let digest = hasher.finalize();
                    let mut out = [0u8; CHECKSUM_LEN];
                    out.copy_from_slice(&digest);
                    self.checksum = Some(out);
                }
                self.state = State::Closed;
            }
            State::Unopened(_) => {
                self.state = State::Closed;
            }
            State::Closed => {}
        }
        self.checksum
    }

    /// Finalized checksum as lowercase hex, available after close.
    pub fn checksum_hex(&self) -> Option<String> {
        self.checksum.map(hex::encode)
    }
}

impl Read for Vfile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_some(buf)
    }
}

impl std::fmt::Debug for Vfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfile")
            .field("label", &self.label)
            .field("rewindable", &self.rewindable)
            .field("real_fs", &self.real_fs)
            .finish()
    }
}
