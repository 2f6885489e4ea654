//! The public writer facade: header lifecycle, the input slicer, and the
//! flush/close/reset barrier logic that sits on top of [`pipeline::Pipeline`].

mod pipeline;

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use flate2::Compression;

use crate::block::Block;
use crate::config::{DEFAULT_BLOCKS, DEFAULT_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::header::Header;
use crate::pool::BufferPool;

use pipeline::Pipeline;

/// Builder for [`Writer`], mirroring `gzp::par::compress::
/// ParCompressBuilder` and `noodles_bgzf::MultithreadedWriter::
/// with_worker_count`: configure, then call [`WriterBuilder::build`].
///
/// This is pure ergonomics over `Writer::new`/`new_with_level`/
/// `set_concurrency` — it does not replace that surface.
#[derive(Debug, Clone)]
pub struct WriterBuilder {
    header: Header,
    level: i32,
    block_size: usize,
    blocks: usize,
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            header: Header::default(),
            level: -1,
            block_size: DEFAULT_BLOCK_SIZE,
            blocks: DEFAULT_BLOCKS,
        }
    }
}

impl WriterBuilder {
    /// Creates a builder with the same defaults as [`Writer::new`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression level (`-2..=9`; see [`Writer::new_with_level`]).
    pub fn compression_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Sets the approximate per-block size in bytes.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the worker pool size.
    pub fn blocks(mut self, blocks: usize) -> Self {
        self.blocks = blocks;
        self
    }

    /// Sets the header's original file name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.header.name = Some(name.into());
        self
    }

    /// Sets the header's free-form comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.header.comment = Some(comment.into());
        self
    }

    /// Sets the header's FEXTRA payload.
    pub fn extra(mut self, extra: impl Into<Vec<u8>>) -> Self {
        self.header.extra = Some(extra.into());
        self
    }

    /// Sets the header's modification time (seconds since the Unix epoch).
    pub fn mod_time(mut self, mod_time: u32) -> Self {
        self.header.mod_time = mod_time;
        self
    }

    /// Sets the header's originating-OS byte.
    pub fn os(mut self, os: u8) -> Self {
        self.header.os = os;
        self
    }

    /// Validates the configuration and returns a [`Writer`] over `sink`.
    pub fn build<W>(self, sink: W) -> Result<Writer<W>>
    where
        W: Write + Send + 'static,
    {
        let level = level_to_compression(self.level)?;
        if self.block_size == 0 || self.blocks == 0 {
            return Err(Error::InvalidConfig {
                block_size: self.block_size as i64,
                blocks: self.blocks as i64,
            });
        }
        self.header.validate()?;
        Ok(Writer::from_parts(
            sink,
            self.header,
            level,
            self.block_size,
            self.blocks,
        ))
    }
}

fn level_to_compression(level: i32) -> Result<Compression> {
    match level {
        // Go's compress/flate (and klauspost/pgzip, this crate's closest
        // relative) reserve -2 for "Huffman only" encoding. flate2 has no
        // such mode, so we approximate it with the fastest real level
        // available and document the gap here rather than in behavior.
        -2 => Ok(Compression::fast()),
        -1 => Ok(Compression::default()),
        0..=9 => Ok(Compression::new(level as u32)),
        _ => Err(Error::InvalidLevel(level)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Streaming,
    Closed,
}

/// A parallel GZIP (RFC 1952) writer.
///
/// Bytes passed to [`Writer::write`] are sliced into blocks of roughly
/// `block_size`, compressed concurrently by a fixed pool of `blocks`
/// workers, and reassembled in submission order into `sink`.
pub struct Writer<W: Write + Send + 'static> {
    header: Header,
    level: Compression,
    block_size: usize,
    blocks: usize,
    current: BytesMut,
    next_seq: u64,
    generation: u64,
    pipeline: Option<Pipeline<W>>,
    pool: Option<Arc<BufferPool>>,
    sink: Option<W>,
    total_uncompressed: Arc<AtomicU64>,
    state: State,
    error: Option<Error>,
    started: bool,
}

impl<W: Write + Send + 'static> Writer<W> {
    /// Creates a writer at the default compression level. Does not touch
    /// `sink` until the first byte is written, flushed, or closed.
    pub fn new(sink: W) -> Self {
        Self::new_with_level(sink, -1).expect("default compression level is always valid")
    }

    /// Creates a writer at `level` (`-2..=9`). Fails with
    /// [`Error::InvalidLevel`] outside that range.
    pub fn new_with_level(sink: W, level: i32) -> Result<Self> {
        let level = level_to_compression(level)?;
        Ok(Self::from_parts(
            sink,
            Header::default(),
            level,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_BLOCKS,
        ))
    }

    /// Returns a [`WriterBuilder`] for configuring header fields and
    /// concurrency before construction.
    pub fn builder() -> WriterBuilder {
        WriterBuilder::new()
    }

    fn from_parts(
        sink: W,
        header: Header,
        level: Compression,
        block_size: usize,
        blocks: usize,
    ) -> Self {
        Self {
            header,
            level,
            block_size,
            blocks,
            current: BytesMut::new(),
            next_seq: 0,
            generation: 0,
            pipeline: None,
            pool: None,
            sink: Some(sink),
            total_uncompressed: Arc::new(AtomicU64::new(0)),
            state: State::Fresh,
            error: None,
            started: false,
        }
    }

    /// Returns the current header. Mutate it through [`Writer::header_mut`]
    /// before the first block is submitted.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a mutable view of the header, or [`Error::InvalidState`] if a
    /// block has already been submitted — header fields become read-only
    /// once the first block goes out.
    pub fn header_mut(&mut self) -> Result<&mut Header> {
        if self.started {
            return Err(Error::InvalidState(
                "header is immutable once a block has been submitted",
            ));
        }
        Ok(&mut self.header)
    }

    /// Sets the block size and worker count. Fails with
    /// [`Error::InvalidState`] if any block has already been submitted, or
    /// [`Error::InvalidConfig`] if either argument is non-positive.
    pub fn set_concurrency(&mut self, block_size: i64, blocks: i64) -> Result<()> {
        if self.started {
            return Err(Error::InvalidState(
                "set_concurrency after first submitted block",
            ));
        }
        if block_size <= 0 || blocks <= 0 {
            return Err(Error::InvalidConfig { block_size, blocks });
        }
        self.block_size = block_size as usize;
        self.blocks = blocks as usize;
        Ok(())
    }

    /// Returns the total number of bytes passed to [`Writer::write`] so far
    /// in this session, for reporting only.
    pub fn uncompressed_size(&self) -> u64 {
        self.total_uncompressed.load(Ordering::Acquire)
    }

    fn check_latched(&mut self) -> Result<()> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if let Some(pipeline) = &self.pipeline {
            if let Some(e) = pipeline.latched_error() {
                self.error = Some(e.clone());
                return Err(e);
            }
        }
        Ok(())
    }

    fn ensure_started(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Err(self
                .error
                .clone()
                .unwrap_or(Error::InvalidState("writer is closed")));
        }
        self.check_latched()?;

        if self.pipeline.is_none() {
            self.header.validate()?;
            let pool = Arc::new(BufferPool::new(self.block_size, self.blocks));
            self.current = pool.acquire();
            let pipeline = Pipeline::spawn(
                self.sink.take().expect("sink present until first pipeline spawn"),
                self.header.clone(),
                self.level,
                pool.clone(),
                self.blocks,
                self.generation,
                self.total_uncompressed.clone(),
            );
            self.pool = Some(pool);
            self.pipeline = Some(pipeline);
            self.started = true;
            self.state = State::Streaming;
        }

        Ok(())
    }

    fn submit_current(&mut self, is_last: bool) -> Result<u64> {
        let buf = std::mem::replace(&mut self.current, BytesMut::new());
        let seq = self.next_seq;
        self.next_seq += 1;

        let block = Block {
            seq,
            input: buf,
            is_last,
            generation: self.generation,
        };

        let submit_failed = {
            let pipeline = self.pipeline.as_ref().expect("pipeline started before submit");
            pipeline.submit(block).is_err()
        };
        if submit_failed {
            self.check_latched()?;
            return Err(Error::InvalidState("pipeline is no longer running"));
        }

        if !is_last {
            let pool = self.pool.as_ref().expect("pool exists once pipeline is running");
            self.current = pool.acquire();
        }

        Ok(seq)
    }

    /// Appends `bytes` to the current input buffer, submitting full blocks
    /// as they fill. Returns the number of bytes accepted, which is always
    /// `bytes.len()` unless a latched error short-circuits the call.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.check_latched()?;
        if self.state == State::Closed {
            return Err(Error::InvalidState("writer is closed"));
        }
        if bytes.is_empty() {
            return Ok(0);
        }
        self.ensure_started()?;

        let mut remaining = bytes;
        let mut written = 0usize;

        while !remaining.is_empty() {
            let cap = self.block_size - self.current.len();
            let take = cap.min(remaining.len());
            self.current.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            written += take;

            if self.current.len() >= self.block_size {
                self.submit_current(false)?;
            }
        }

        Ok(written)
    }

    /// Submits any partially filled block as a non-last block and blocks
    /// until the sink has received everything written so far. Legal even
    /// after zero bytes have been written.
    pub fn flush(&mut self) -> Result<()> {
        self.check_latched()?;
        if self.state == State::Closed {
            return Err(Error::InvalidState("writer is closed"));
        }
        self.ensure_started()?;
        let seq = self.submit_current(false)?;
        self.pipeline
            .as_ref()
            .expect("started by ensure_started")
            .wait_for(seq, false)
    }

    /// Submits the tail as the last block, drains all outstanding work,
    /// writes the trailer, and transitions to closed. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return match &self.error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
        }

        let result = (|| {
            self.check_latched()?;
            self.ensure_started()?;
            let seq = self.submit_current(true)?;
            self.pipeline
                .as_ref()
                .expect("started by ensure_started")
                .wait_for(seq, true)
        })();

        self.state = State::Closed;
        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        if let Some(pipeline) = self.pipeline.take() {
            self.sink = pipeline.shutdown();
        }

        result
    }

    /// Alias for [`Writer::close`], matching `gzp::ZWriter::finish` and
    /// `noodles_bgzf::MultithreadedWriter::finish`.
    pub fn finish(&mut self) -> Result<()> {
        self.close()
    }

    /// Returns the sink, if it is currently held by the writer rather than
    /// the (running) pipeline thread — i.e. before the first submission, or
    /// after `close`. Matches `flate2::bufread::GzDecoder::get_ref`'s
    /// accessor style.
    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// Consumes the writer, returning the sink if one is held (see
    /// [`Writer::get_ref`]). Typical use: `writer.close()?;
    /// writer.into_inner().unwrap()` to recover a `Vec<u8>` sink.
    pub fn into_inner(self) -> Option<W> {
        self.sink
    }

    /// Aborts any pending work, rewinds session state to zero, and targets
    /// `new_sink` for the next write. The header's current field values are
    /// kept (only the session counters reset); `new_sink` receives a fresh
    /// header once the next block is submitted.
    pub fn reset(&mut self, new_sink: W) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.mark_stale();
            pipeline.shutdown();
        }

        self.generation = self.generation.wrapping_add(1);
        self.next_seq = 0;
        self.current = BytesMut::new();
        self.pool = None;
        self.sink = Some(new_sink);
        self.state = State::Fresh;
        self.error = None;
        self.started = false;
        self.total_uncompressed = Arc::new(AtomicU64::new(0));
    }
}

impl<W: Write + Send + 'static> Write for Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Writer::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> io::Result<()> {
        Writer::flush(self).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::Reader;
    use std::io::{Cursor, Read as _};
    use std::sync::Mutex;

    fn decompress_all(bytes: &[u8]) -> Vec<u8> {
        let mut reader = Reader::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    /// A sink the test keeps its own handle to, so it can peek at bytes the
    /// writer has emitted so far without disturbing a still-open `Writer`
    /// (whose sink is otherwise exclusively owned by its pipeline thread).
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_close_is_a_valid_empty_gzip() {
        let mut w = Writer::new(Vec::new());
        w.close().unwrap();
        let out = w.into_inner().unwrap();

        assert_eq!(&out[out.len() - 8..], &[0u8; 8]);
        assert!(decompress_all(&out).is_empty());
    }

    #[test]
    fn flush_is_legal_with_zero_bytes_and_grows_monotonically() {
        let sink = SharedSink::default();
        let mut w = Writer::new(sink.clone());

        w.flush().unwrap();
        let len1 = sink.0.lock().unwrap().len();

        w.write(b"x").unwrap();
        let len2 = sink.0.lock().unwrap().len();
        assert_eq!(len1, len2);

        w.flush().unwrap();
        let len3 = sink.0.lock().unwrap().len();
        assert!(len3 > len2);

        w.close().unwrap();
        assert_eq!(decompress_all(&sink.0.lock().unwrap()), b"x");
    }

    #[test]
    fn set_concurrency_rejects_nonpositive_values() {
        let mut w = Writer::new(Vec::new());
        assert!(matches!(
            w.set_concurrency(0, 4),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            w.set_concurrency(1024, 0),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn set_concurrency_locks_after_first_submission() {
        let mut w = Writer::new(Vec::new());
        w.flush().unwrap();
        assert!(matches!(
            w.set_concurrency(1024, 4),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn header_mut_locks_after_first_submission() {
        let mut w = Writer::new(Vec::new());
        w.header_mut().unwrap().name = Some("a".to_string());
        w.flush().unwrap();
        assert!(matches!(w.header_mut(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let mut w = Writer::new(Vec::new());
        w.write(b"hello").unwrap();
        w.close().unwrap();
        w.close().unwrap();
    }

    #[test]
    fn reset_targets_new_sink_and_old_sink_is_untouched_beyond_emission() {
        let mut w = Writer::new(Vec::new());
        w.write(b"msg").unwrap();
        w.close().unwrap();
        let buf_a = w.get_ref().unwrap().clone();

        w.reset(Vec::new());
        w.write(b"msg").unwrap();
        w.close().unwrap();
        let buf_b = w.into_inner().unwrap();

        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn round_trips_through_many_small_blocks() {
        let mut w = Writer::new(Vec::new());
        w.set_concurrency(256, 4).unwrap();
        let payload: Vec<u8> = (0..10_000).map(|i| (i % 251) as u8).collect();
        w.write(&payload).unwrap();
        w.close().unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(decompress_all(&out), payload);
    }
}
