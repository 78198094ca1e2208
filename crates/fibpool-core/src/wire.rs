//! JSON-lines framing for channels that cross a process boundary.
//!
//! Every frame is one JSON document terminated by `\n`. Writers flush after
//! each frame so the peer never waits on a buffered item.
//!
//! A line that does not decode into the expected frame type is an
//! unrecognized control value: it is logged and skipped, and the reader keeps
//! serving. End of stream means the peer is gone and surfaces as
//! [`Error::ChannelClosed`].

use crate::channel::{Inbox, Outbox};
use crate::{Error, ResultItem, Result, Upstream, WorkItem};
use serde::{Serialize, de::DeserializeOwned};
use std::io::{BufRead, Write};
use std::marker::PhantomData;

/// Writes frames of type `T` to `W`.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one frame and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if `frame` cannot be serialized and
    /// [`Error::ChannelClosed`] if the peer hung up.
    pub fn send<T: Serialize>(&mut self, frame: &T) -> Result<()> {
        let mut line = serde_json::to_vec(frame).map_err(|e| Error::Codec {
            context: e.to_string(),
        })?;
        line.push(b'\n');
        self.inner
            .write_all(&line)
            .and_then(|()| self.inner.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => Error::closed("peer closed the pipe"),
                _ => Error::Io(e),
            })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<T: Serialize, W: Write> Outbox<T> for FrameWriter<W> {
    fn push(&mut self, item: T) -> Result<()> {
        self.send(&item)
    }
}

/// Reads frames of type `T` from `R`.
#[derive(Debug)]
pub struct FrameReader<R, T> {
    inner: R,
    line: String,
    skipped: usize,
    _frame: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> FrameReader<R, T> {
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            skipped: 0,
            _frame: PhantomData,
        }
    }

    /// Number of undecodable lines skipped so far.
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead, T: DeserializeOwned> Inbox<T> for FrameReader<R, T> {
    fn pop(&mut self) -> Result<T> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line)? == 0 {
                return Err(Error::closed("end of stream"));
            }

            let raw = self.line.trim();
            if raw.is_empty() {
                continue;
            }

            match serde_json::from_str(raw) {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("Unknown frame '{raw}', skipping: {e}");
                }
            }
        }
    }
}

/// The worker endpoint of a child process.
///
/// Work is pulled rather than pushed: [`Inbox::pop`] first announces
/// [`Upstream::Pull`] on the outgoing pipe, then blocks on the incoming one.
/// Results share the outgoing pipe as [`Upstream::Result`] frames.
#[derive(Debug)]
pub struct PullLink<R, W> {
    work: FrameReader<R, WorkItem>,
    upstream: FrameWriter<W>,
}

impl<R: BufRead, W: Write> PullLink<R, W> {
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            work: FrameReader::new(reader),
            upstream: FrameWriter::new(writer),
        }
    }
}

impl<R: BufRead, W: Write> Inbox<WorkItem> for PullLink<R, W> {
    fn pop(&mut self) -> Result<WorkItem> {
        self.upstream.send(&Upstream::Pull)?;
        self.work.pop()
    }
}

impl<R: BufRead, W: Write> Outbox<ResultItem> for PullLink<R, W> {
    fn push(&mut self, item: ResultItem) -> Result<()> {
        self.upstream.send(&Upstream::Result(item))
    }
}
