// src/vfs/pipe.rs
//! Bounded in-memory pipe backing write-mode virtual files
//!
//! The writer blocks once `capacity` chunks are in flight and resumes as the
//! reader drains, which couples guest completion speed to consumer speed.
//! A capacity of zero gives rendezvous semantics: every chunk waits for the
//! reader to take it.
//!
//! ```text
//! guest fd_write → PipeWriter ──[chunk][chunk]…──→ PipeReader → harness
//!                       (blocks when full)        (EOF when writer dropped)
//! ```

use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, Sender};
use std::io::{self, Read, Write};

/// Largest chunk carried by a single channel slot
pub const MAX_CHUNK: usize = 16 * 1024;

/// Create a bounded pipe holding at most `capacity` chunks
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        PipeWriter { tx: Some(tx) },
        PipeReader {
            rx,
            pending: Bytes::new(),
        },
    )
}

/// Producer half; dropping or closing it signals end-of-stream
#[derive(Debug)]
pub struct PipeWriter {
    tx: Option<Sender<Bytes>>,
}

impl PipeWriter {
    /// Release the sending side so the reader observes end-of-stream
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe writer closed"))?;

        let n = buf.len().min(MAX_CHUNK);
        tx.send(Bytes::copy_from_slice(&buf[..n]))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;

        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumer half; reads return 0 once the writer is gone and drained
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Bytes>,
    pending: Bytes,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                // All senders dropped: end-of-stream
                Err(_) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        self.pending.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}
