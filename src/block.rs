//! The unit of work passed between the slicer, the worker pool, and the
//! emitter.

use bytes::BytesMut;

use crate::error::Error;

/// A sliced, owned chunk of input awaiting compression.
///
/// Sequence numbers are dense and start at 0 for each compression session
/// (reset by [`crate::compress::Writer::reset`]).
#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) seq: u64,
    pub(crate) input: BytesMut,
    pub(crate) is_last: bool,
    pub(crate) generation: u64,
}

/// The outcome of compressing one [`Block`].
///
/// `input` is not part of the public result shape (`{seq, compressed,
/// uncompressed_len, crc}`) — it rides along so the emitter can return the
/// exhausted input buffer to the pool once the block is actually emitted.
#[derive(Debug)]
pub(crate) struct CompressResult {
    pub(crate) seq: u64,
    pub(crate) compressed: Vec<u8>,
    pub(crate) uncompressed_len: u32,
    pub(crate) crc: u32,
    pub(crate) generation: u64,
    pub(crate) input: BytesMut,
    /// Set if the DEFLATE primitive failed on this block. The emitter, not
    /// the worker, latches this into the session so the error surfaces in
    /// seq order rather than out of order.
    pub(crate) error: Option<Error>,
}
