// src/vfs/virtual_file.rs
//! Virtual files handed to guests in place of real filesystem entries
//!
//! A virtual file is created already open and wraps exactly one of:
//! - a byte source (read-only, e.g. a fixed payload buffer)
//! - a byte sink (write-only, e.g. a bounded pipe)
//!
//! Metadata is synthetic: zero size, read-only mode bits, no timestamps.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use tracing::trace;

/// Fixed mode reported for every virtual file
pub const VIRTUAL_FILE_MODE: u32 = 0o444;

/// Direction of a virtual file, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// First path segment addressing this direction
    pub fn segment(&self) -> &'static str {
        match self {
            Direction::Read => "in",
            Direction::Write => "out",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "in" => Some(Direction::Read),
            "out" => Some(Direction::Write),
            _ => None,
        }
    }
}

/// Synthetic metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: Option<std::time::SystemTime>,
    pub is_dir: bool,
}

enum Backing {
    Source(Box<dyn Read + Send>),
    Sink(Option<Box<dyn Write + Send>>),
}

/// Host-defined stand-in for a filesystem entry
pub struct VirtualFile {
    name: String,
    backing: Mutex<Backing>,
}

impl VirtualFile {
    /// Read-only file over a byte source
    pub fn reader(name: impl Into<String>, source: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            backing: Mutex::new(Backing::Source(Box::new(source))),
        }
    }

    /// Write-only file over a byte sink
    pub fn writer(name: impl Into<String>, sink: impl Write + Send + 'static) -> Self {
        Self {
            name: name.into(),
            backing: Mutex::new(Backing::Sink(Some(Box::new(sink)))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        match &*self.backing.lock() {
            Backing::Source(_) => Direction::Read,
            Backing::Sink(_) => Direction::Write,
        }
    }

    pub fn stat(&self) -> FileStat {
        FileStat {
            name: self.name.clone(),
            size: 0,
            mode: VIRTUAL_FILE_MODE,
            modified: None,
            is_dir: false,
        }
    }

    /// Read from the backing source
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut *self.backing.lock() {
            Backing::Source(source) => source.read(buf),
            Backing::Sink(_) => Err(wrong_direction(&self.name, "read from write-only")),
        }
    }

    /// Write to the backing sink
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.backing.lock() {
            Backing::Sink(Some(sink)) => sink.write(buf),
            Backing::Sink(None) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("virtual file {} already closed", self.name),
            )),
            Backing::Source(_) => Err(wrong_direction(&self.name, "write to read-only")),
        }
    }

    /// Release the sink so its reader sees end-of-stream; safe to repeat
    pub fn close(&self) -> io::Result<()> {
        let mut backing = self.backing.lock();
        if let Backing::Sink(slot) = &mut *backing {
            if let Some(mut sink) = slot.take() {
                trace!("Closing sink of virtual file {}", self.name);
                sink.flush()?;
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(&*self.backing.lock(), Backing::Sink(None))
    }
}

fn wrong_direction(name: &str, op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{} virtual file {}", op, name),
    )
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("name", &self.name)
            .field("direction", &self.direction())
            .finish()
    }
}

impl Read for &VirtualFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        VirtualFile::read(self, buf)
    }
}

impl Write for &VirtualFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        VirtualFile::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.backing.lock() {
            Backing::Sink(Some(sink)) => sink.flush(),
            _ => Ok(()),
        }
    }
}
