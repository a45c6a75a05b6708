//! Bounded capture of a child's stdout/stderr

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use serde::Serialize;

const READ_CHUNK: usize = 8 * 1024;

/// Output captured from one stream. When the stream produced more than the
/// configured limit, only the most recent bytes are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    #[serde(skip)]
    bytes: Vec<u8>,
    total_bytes: u64,
    truncated: bool,
}

impl CapturedOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture of a stream that produced exactly `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            total_bytes: bytes.len() as u64,
            bytes,
            truncated: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.total_bytes - self.bytes.len() as u64
    }

    /// Lossy UTF-8 text, prefixed with a truncation marker when bytes were dropped.
    pub fn as_text(&self) -> String {
        let body = String::from_utf8_lossy(&self.bytes);
        if self.truncated {
            format!("[... {} bytes truncated ...]\n{}", self.dropped_bytes(), body)
        } else {
            body.into_owned()
        }
    }

    pub fn tail_lines(&self, n: usize) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.bytes);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].iter().map(|l| l.to_string()).collect()
    }
}

/// Accumulates a stream while keeping memory bounded by `limit`.
#[derive(Debug)]
pub(crate) struct BoundedBuffer {
    limit: usize,
    bytes: Vec<u8>,
    total: u64,
}

impl BoundedBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            bytes: Vec::new(),
            total: 0,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if self.limit == 0 {
            return;
        }
        if chunk.len() >= self.limit {
            self.bytes.clear();
            self.bytes.extend_from_slice(&chunk[chunk.len() - self.limit..]);
            return;
        }
        self.bytes.extend_from_slice(chunk);
        // Compact lazily so the buffer never holds more than twice the limit.
        if self.bytes.len() > self.limit * 2 {
            let excess = self.bytes.len() - self.limit;
            self.bytes.drain(..excess);
        }
    }

    /// The capture so far, trimmed to the limit.
    pub(crate) fn snapshot(&self) -> CapturedOutput {
        let start = self.bytes.len().saturating_sub(self.limit);
        let bytes = self.bytes[start..].to_vec();
        CapturedOutput {
            truncated: self.total > bytes.len() as u64,
            bytes,
            total_bytes: self.total,
        }
    }
}

/// A stream being drained on its own thread.
///
/// The buffer is shared so whatever was read can still be reported when the
/// reader never reaches EOF.
pub(crate) struct StreamCapture {
    label: &'static str,
    buffer: Arc<Mutex<BoundedBuffer>>,
    done: Receiver<()>,
}

impl StreamCapture {
    /// Wait until `deadline` for EOF, then hand back what was captured.
    pub(crate) fn collect(self, deadline: Instant) -> CapturedOutput {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "{} still open at drain deadline (orphaned child?); keeping partial output",
                    self.label
                );
            }
        }
        lock(&self.buffer).snapshot()
    }
}

fn lock(buffer: &Mutex<BoundedBuffer>) -> MutexGuard<'_, BoundedBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain `reader` on a background thread. The stream is always read to EOF,
/// even past the limit, so the child never blocks on a full pipe.
pub(crate) fn spawn_reader<R>(mut reader: R, limit: usize, label: &'static str) -> StreamCapture
where
    R: Read + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(BoundedBuffer::new(limit)));
    let (tx, done) = mpsc::channel();
    let shared = Arc::clone(&buffer);
    let spawned = thread::Builder::new()
        .name(format!("buildstep-{label}"))
        .spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => lock(&shared).push(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("{} reader stopped: {}", label, e);
                        break;
                    }
                }
            }
            // The collector may have stopped waiting already.
            let _ = tx.send(());
        });
    if let Err(e) = spawned {
        tracing::warn!("failed to start {} reader thread: {}", label, e);
    }
    StreamCapture {
        label,
        buffer,
        done,
    }
}

/// Collect an optional stream; an uncaptured stream is empty.
pub(crate) fn collect(capture: Option<StreamCapture>, deadline: Instant) -> CapturedOutput {
    capture
        .map(|c| c.collect(deadline))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_under_limit_keeps_everything() {
        let mut buffer = BoundedBuffer::new(64);
        buffer.push(b"hello ");
        buffer.push(b"world");
        let out = buffer.snapshot();
        assert_eq!(out.bytes(), b"hello world");
        assert!(!out.is_truncated());
        assert_eq!(out.as_text(), "hello world");
    }

    #[test]
    fn test_over_limit_keeps_tail_with_marker() {
        let mut buffer = BoundedBuffer::new(4);
        for chunk in [b"abc".as_slice(), b"def", b"ghi"] {
            buffer.push(chunk);
        }
        let out = buffer.snapshot();
        assert_eq!(out.bytes(), b"fghi");
        assert_eq!(out.total_bytes(), 9);
        assert!(out.is_truncated());
        assert_eq!(out.dropped_bytes(), 5);
        assert_eq!(out.as_text(), "[... 5 bytes truncated ...]\nfghi");
    }

    #[test]
    fn test_single_chunk_larger_than_limit() {
        let mut buffer = BoundedBuffer::new(3);
        buffer.push(b"0123456789");
        let out = buffer.snapshot();
        assert_eq!(out.bytes(), b"789");
        assert!(out.is_truncated());
    }

    #[test]
    fn test_zero_limit_counts_only() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push(b"noise");
        let out = buffer.snapshot();
        assert!(out.bytes().is_empty());
        assert_eq!(out.total_bytes(), 5);
        assert!(out.is_truncated());
    }

    #[test]
    fn test_tail_lines() {
        let mut buffer = BoundedBuffer::new(1024);
        buffer.push(b"one\ntwo\nthree\nfour\n");
        let out = buffer.snapshot();
        assert_eq!(out.tail_lines(2), vec!["three", "four"]);
        assert_eq!(out.tail_lines(10).len(), 4);
    }

    #[test]
    fn test_reader_drains_past_limit() {
        let data = vec![b'x'; 100_000];
        let capture = spawn_reader(Cursor::new(data), 16, "stdout");
        let out = collect(Some(capture), Instant::now() + Duration::from_secs(5));
        assert_eq!(out.total_bytes(), 100_000);
        assert_eq!(out.bytes().len(), 16);
    }

    /// Yields one chunk, then blocks like a pipe held open by another process.
    struct HeldOpen {
        first: Option<&'static [u8]>,
        release: mpsc::Receiver<()>,
    }

    impl Read for HeldOpen {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(first) = self.first.take() {
                buf[..first.len()].copy_from_slice(first);
                return Ok(first.len());
            }
            let _ = self.release.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_deadline_keeps_partial_output() {
        let (release, rx) = mpsc::channel();
        let reader = HeldOpen {
            first: Some(b"ng: compile error\n"),
            release: rx,
        };
        let capture = spawn_reader(reader, 1024, "stderr");
        // Let the reader pick up the first chunk
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        let out = collect(Some(capture), Instant::now() + Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(out.as_text(), "ng: compile error\n");
        assert!(!out.is_truncated());

        drop(release);
    }

    #[test]
    fn test_uncaptured_stream_is_empty() {
        assert!(collect(None, Instant::now()).is_empty());
    }
}
