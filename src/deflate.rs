//! The DEFLATE primitive this crate treats as an external building block:
//! encoding a byte slice at a chosen level into a complete, byte-aligned
//! DEFLATE fragment, and decoding a DEFLATE bit-stream incrementally.
//!
//! Blocks are compressed with a fresh [`flate2::Compress`] per call (no
//! cross-block dictionary), matching `gzp`'s documented tradeoff of
//! per-block-independent compression in exchange for parallelism.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::Result;

/// The 5-byte RFC 1951 partial flush / sync marker: an empty stored block
/// (BFINAL=0) that byte-aligns the stream so the next DEFLATE fragment can
/// start cleanly.
pub(crate) const SYNC_MARKER: [u8; 5] = [0x00, 0x00, 0x00, 0xff, 0xff];

/// Encodes `input` as one DEFLATE fragment.
///
/// If `is_last` is `false`, the fragment ends with [`SYNC_MARKER`] so it can
/// be concatenated with the next block's fragment. If `is_last` is `true`,
/// the fragment's final block has BFINAL=1, terminating the DEFLATE stream.
pub(crate) fn compress_block(input: &[u8], level: Compression, is_last: bool) -> Result<Vec<u8>> {
    let mut compressor = Compress::new(level, false);
    let mut output = Vec::with_capacity(input.len() / 2 + 64);
    let flush = if is_last {
        FlushCompress::Finish
    } else {
        FlushCompress::Sync
    };

    loop {
        let consumed = compressor.total_in() as usize;
        let status = compressor.compress_vec(&input[consumed..], &mut output, flush)?;

        match status {
            Status::StreamEnd => break,
            Status::BufError => {
                // `compress_vec` never reallocates `output` itself — it
                // returns `BufError` once the spare capacity we reserved
                // runs out. Reserve more and retry the same input.
                let grow = output.capacity().max(256);
                output.reserve(grow);
            }
            Status::Ok => {
                if !is_last && compressor.total_in() as usize >= input.len() {
                    break;
                }
                // Otherwise: a Finish flush that hasn't reached StreamEnd
                // yet, or a Sync flush that hasn't consumed all of `input`
                // yet. Loop again.
            }
        }
    }

    Ok(output)
}

/// The inflate side, used by the read-ahead decoder to pull decompressed
/// bytes progressively out of a member's DEFLATE fragment stream.
///
/// Unlike the encoder, this is stateful across calls: a member's fragments
/// (and their embedded [`SYNC_MARKER`]s) are transparent to the decoder —
/// an empty stored block just decodes to zero bytes — so a single
/// [`Decompress`] instance runs across the whole member.
pub(crate) struct Inflater {
    inner: Decompress,
}

impl Inflater {
    pub(crate) fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }

    /// Decompresses as much of `input` into `output` as fits, returning
    /// `(bytes_consumed, bytes_produced, member_finished)`.
    pub(crate) fn inflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        input_is_final: bool,
    ) -> Result<(usize, usize, bool)> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();

        let flush = if input_is_final {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };

        let status = self.inner.decompress(input, output, flush)?;

        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;
        let finished = matches!(status, Status::StreamEnd);

        Ok((consumed, produced, finished))
    }
}
