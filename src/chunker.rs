//! The streaming chunker: owns the read window and drives a kernel over it.

use std::io::{self, Read, Write};

use tracing::trace;

use crate::kernel::Kernel;
use crate::{ChunkerError, ChunkerOptions};

/// A streaming content defined chunker over a byte source.
///
/// The chunker owns a window of `2 * max_size` bytes, so after emitting a
/// chunk the kernel still sees one full scanning window without bytes being
/// copied twice. A chunker is consumed linearly by a single caller; chunks
/// come out in stream order and concatenate back to the source byte for
/// byte. It is not safe to share across threads, but independent chunkers
/// over independent sources run in parallel without restriction.
///
/// Three equivalent surfaces are offered: pull one chunk at a time with
/// [`Chunker::next_chunk`], push everything into a sink with
/// [`Chunker::copy`], or receive positioned chunks through
/// [`Chunker::split`]. For a fixed source and options all three emit the
/// same chunks in the same order.
pub struct Chunker<R> {
    kernel: Kernel,
    opts: ChunkerOptions,
    source: R,
    /// Read window; the live region is `buffer[offset..size]`.
    buffer: Vec<u8>,
    offset: usize,
    size: usize,
    /// Set once the source reports end of stream.
    eof: bool,
    /// Total bytes emitted, feeding the positional callback.
    processed: u64,
}

impl<R: Read> Chunker<R> {
    pub(crate) fn new(kernel: Kernel, opts: ChunkerOptions, source: R) -> Self {
        Chunker {
            kernel,
            opts,
            source,
            buffer: vec![0u8; opts.max_size * 2],
            offset: 0,
            size: 0,
            eof: false,
            processed: 0,
        }
    }

    pub fn min_size(&self) -> usize {
        self.opts.min_size
    }

    pub fn normal_size(&self) -> usize {
        self.opts.normal_size
    }

    pub fn max_size(&self) -> usize {
        self.opts.max_size
    }

    /// Slides the live bytes to the front of the window, then reads until
    /// the window is full or the source is exhausted. Short reads are not
    /// errors and are simply retried.
    fn refill(&mut self) -> Result<(), ChunkerError> {
        self.buffer.copy_within(self.offset..self.size, 0);
        self.size -= self.offset;
        self.offset = 0;
        let mut filled = 0;
        while !self.eof && self.size < self.buffer.len() {
            let read = self
                .source
                .read(&mut self.buffer[self.size..])
                .map_err(ChunkerError::Source)?;
            if read == 0 {
                self.eof = true;
            } else {
                self.size += read;
                filled += read;
            }
        }
        trace!(bytes = filled, eof = self.eof, "refilled chunk window");
        Ok(())
    }

    /// Produces the next chunk as a view into the internal window, or
    /// `Ok(None)` once the source is exhausted.
    ///
    /// The slice borrows the chunker's window and is only valid until the
    /// next call on this chunker; callers needing the bytes past that point
    /// must copy them. Every chunk except the last is between `min_size`
    /// and `max_size` long; the last may come up short.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>, ChunkerError> {
        if self.size - self.offset < self.opts.max_size && !self.eof {
            self.refill()?;
        }
        let live = self.size - self.offset;
        if live == 0 {
            return Ok(None);
        }
        let n = live.min(self.opts.max_size);
        let cut = self
            .kernel
            .cutpoint(&self.opts, &self.buffer[self.offset..self.size], n);
        let start = self.offset;
        self.offset += cut;
        self.processed += cut as u64;
        Ok(Some(&self.buffer[start..start + cut]))
    }

    /// Writes every chunk to `sink` and returns the total number of bytes
    /// written.
    ///
    /// The sink must accept each chunk in full; a partial write is reported
    /// as a [`ChunkerError::Sink`] error rather than retried.
    pub fn copy<W: Write>(&mut self, sink: &mut W) -> Result<u64, ChunkerError> {
        let mut written = 0u64;
        loop {
            let chunk = match self.next_chunk()? {
                Some(chunk) => chunk,
                None => return Ok(written),
            };
            let accepted = sink.write(chunk).map_err(ChunkerError::Sink)?;
            if accepted != chunk.len() {
                return Err(ChunkerError::Sink(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "sink accepted a partial chunk",
                )));
            }
            written += accepted as u64;
        }
    }

    /// Feeds every chunk to `callback` as `(offset, length, bytes)`, where
    /// `offset` counts the bytes emitted before this chunk.
    ///
    /// An error returned by the callback stops the split and comes back as
    /// [`ChunkerError::Callback`], unchanged.
    pub fn split<F>(&mut self, mut callback: F) -> Result<(), ChunkerError>
    where
        F: FnMut(u64, u64, &[u8]) -> io::Result<()>,
    {
        loop {
            let start = self.processed;
            match self.next_chunk()? {
                Some(chunk) => {
                    callback(start, chunk.len() as u64, chunk).map_err(ChunkerError::Callback)?;
                }
                None => return Ok(()),
            }
        }
    }
}

/// Owned-chunk iteration, at the cost of one copy per chunk.
///
/// [`Chunker::next_chunk`], [`Chunker::copy`] and [`Chunker::split`] remain
/// zero copy; use them when the per-chunk allocation matters.
impl<R: Read> Iterator for Chunker<R> {
    type Item = Result<Vec<u8>, ChunkerError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk.to_vec())),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
