//! The read-ahead decoder: a background producer thread that inflates one
//! or more concatenated GZIP members and forwards decoded chunks through a
//! bounded channel, so `read()` rarely blocks on the DEFLATE primitive
//! directly.

use std::io::{self, BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use crate::config::{DEFAULT_BLOCKS, DEFAULT_BLOCK_SIZE};
use crate::crc::Crc32;
use crate::deflate::Inflater;
use crate::error::{Error, Result};
use crate::header::{read_header, read_trailer, Header};

/// A message the producer sends the consumer.
enum Chunk {
    /// Decoded bytes from the member currently being read.
    Data(Vec<u8>),
    /// A new member's header was parsed; the decoder is now positioned at
    /// the start of that member's body.
    MemberBoundary(Header),
    /// The source ended cleanly after a complete member's trailer.
    Eof,
    /// A header, trailer, or DEFLATE error; terminal for the producer.
    Error(Error),
}

/// A concurrent read-ahead wrapper around a sequential DEFLATE decoder.
///
/// Construction blocks just long enough to parse the first member's header,
/// exposed as field-style access right away; everything after that — inflating, validating trailers,
/// and parsing any subsequent concatenated members — happens on a
/// background thread that stays `2 * blocks` chunks ahead of [`Reader::read`].
pub struct Reader<R> {
    first_header: Header,
    current_header: Header,
    block_size: usize,
    blocks: usize,
    data_rx: Receiver<Chunk>,
    handle: Option<JoinHandle<R>>,
    current: Vec<u8>,
    pos: usize,
    error: Option<Error>,
    closed: bool,
    source: Option<R>,
}

impl<R> Reader<R>
where
    R: Read + Send + 'static,
{
    /// Opens a decoder with the default block size and read-ahead depth.
    pub fn new(source: R) -> Result<Self> {
        Self::new_with_capacity(source, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCKS)
    }

    /// Opens a decoder whose producer reads `block_size`-sized chunks and
    /// stays up to `2 * blocks` chunks ahead of the consumer.
    pub fn new_with_capacity(source: R, block_size: usize, blocks: usize) -> Result<Self> {
        let mut buf_reader = BufReader::with_capacity(block_size.max(1), source);
        let header = read_header(&mut buf_reader)?;

        let (tx, rx) = crossbeam_channel::bounded(2 * blocks);
        let handle = thread::spawn(move || run_producer(buf_reader, block_size, tx));

        Ok(Self {
            first_header: header.clone(),
            current_header: header,
            block_size,
            blocks,
            data_rx: rx,
            handle: Some(handle),
            current: Vec::new(),
            pos: 0,
            error: None,
            closed: false,
            source: None,
        })
    }

    /// The first member's header, fixed for the lifetime of this decoder
    /// (until [`Reader::reset`]).
    pub fn first_header(&self) -> &Header {
        &self.first_header
    }

    /// The header of the member currently being decoded. Equal to
    /// [`Reader::first_header`] until a subsequent concatenated member's
    /// header has been parsed.
    pub fn header(&self) -> &Header {
        &self.current_header
    }

    /// Copies decoded bytes into `buf`, returning the number of bytes
    /// actually copied out of the current internal chunk — never more than
    /// `buf.len()`, but also never padded up to it. Returns `Ok(0)` at a
    /// clean end of input.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if buf.is_empty() || self.closed {
            return Ok(0);
        }

        loop {
            if self.pos < self.current.len() {
                let n = std::cmp::min(buf.len(), self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            match self.data_rx.recv() {
                Ok(Chunk::Data(v)) => {
                    self.current = v;
                    self.pos = 0;
                }
                Ok(Chunk::MemberBoundary(h)) => {
                    self.current_header = h;
                }
                Ok(Chunk::Eof) => return Ok(0),
                Ok(Chunk::Error(e)) => {
                    self.error = Some(e.clone());
                    return Err(e);
                }
                Err(_) => {
                    let e = Error::InvalidState("decoder thread exited unexpectedly");
                    self.error = Some(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// Tears down the background producer and recovers the source.
    /// Idempotent: repeated calls return the first outcome.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return match &self.error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            };
        }
        self.closed = true;

        // Dropping the receiver disconnects the channel; the producer's
        // next `send` fails and it returns the source without blocking on
        // further I/O it would otherwise have done.
        self.data_rx = crossbeam_channel::bounded(0).1;
        if let Some(handle) = self.handle.take() {
            if let Ok(source) = handle.join() {
                self.source = Some(source);
            }
        }

        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Discards the current stream (closing its producer, dropping the old
    /// source) and begins decoding `new_source` from its first header,
    /// exactly as a freshly constructed `Reader` would.
    pub fn reset(&mut self, new_source: R) -> Result<()> {
        let _ = self.close();
        self.closed = false;
        self.error = None;
        self.current = Vec::new();
        self.pos = 0;
        self.source = None;

        let mut buf_reader = BufReader::with_capacity(self.block_size.max(1), new_source);
        let header = read_header(&mut buf_reader)?;

        let (tx, rx) = crossbeam_channel::bounded(2 * self.blocks);
        let block_size = self.block_size;
        self.handle = Some(thread::spawn(move || run_producer(buf_reader, block_size, tx)));
        self.data_rx = rx;
        self.first_header = header.clone();
        self.current_header = header;
        Ok(())
    }

    /// Returns the source, if it is currently held by the reader rather
    /// than the (running) producer thread — i.e. after [`Reader::close`].
    pub fn get_ref(&self) -> Option<&R> {
        self.source.as_ref()
    }

    /// Consumes the reader, returning the source if one is held (see
    /// [`Reader::get_ref`]).
    pub fn into_inner(self) -> Option<R> {
        self.source
    }
}

impl<R> Read for Reader<R>
where
    R: Read + Send + 'static,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Reader::read(self, buf).map_err(Into::into)
    }
}

/// Runs on the background thread for the lifetime of one `Reader` session:
/// inflates the current member, validates its trailer, and either parses
/// the next concatenated member's header or reports a clean EOF. Returns
/// the source once the channel disconnects or the stream ends, so `close`/
/// `reset` can recover it.
fn run_producer<R: Read>(mut reader: BufReader<R>, block_size: usize, tx: Sender<Chunk>) -> R {
    let mut inflater = Inflater::new();
    let mut member_crc = Crc32::new();
    let mut member_len: u64 = 0;
    let mut out_buf = vec![0u8; block_size.max(1)];

    loop {
        loop {
            let input = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) => {
                    let _ = tx.send(Chunk::Error(Error::source_read(e)));
                    return reader.into_inner();
                }
            };
            let input_is_final = input.is_empty();

            let (consumed, produced, finished) =
                match inflater.inflate(input, &mut out_buf, input_is_final) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let _ = tx.send(Chunk::Error(e));
                        return reader.into_inner();
                    }
                };
            reader.consume(consumed);

            if produced > 0 {
                member_crc.update(&out_buf[..produced]);
                member_len += produced as u64;
                if tx.send(Chunk::Data(out_buf[..produced].to_vec())).is_err() {
                    return reader.into_inner();
                }
            }

            if finished {
                break;
            }
            if input_is_final && consumed == 0 && produced == 0 {
                let _ = tx.send(Chunk::Error(Error::InflateError(
                    "source ended before the DEFLATE stream's final block".to_string(),
                )));
                return reader.into_inner();
            }
        }

        if let Err(e) = read_trailer(&mut reader, member_crc.peek(), member_len as u32) {
            let _ = tx.send(Chunk::Error(e));
            return reader.into_inner();
        }

        let more = match reader.fill_buf() {
            Ok(buf) => !buf.is_empty(),
            Err(e) => {
                let _ = tx.send(Chunk::Error(Error::source_read(e)));
                return reader.into_inner();
            }
        };
        if !more {
            let _ = tx.send(Chunk::Eof);
            return reader.into_inner();
        }

        let header = match read_header(&mut reader) {
            Ok(h) => h,
            Err(e) => {
                let _ = tx.send(Chunk::Error(e));
                return reader.into_inner();
            }
        };
        if tx.send(Chunk::MemberBoundary(header)).is_err() {
            return reader.into_inner();
        }

        inflater = Inflater::new();
        member_crc = Crc32::new();
        member_len = 0;
    }
}
