//! Session configuration shared by the writer and reader builders.
//!
//! There is no env var or on-disk config here — just the plain
//! struct/defaults pair, the same shape `flate2`'s own `gz::Builder` and
//! `gzp::par::compress::ParCompressBuilder` use for the same purpose.

/// Default block size in bytes. Documented elsewhere as "approximately
/// 250,000 bytes"; we round to a power-of-two-friendly
/// 262,144 (256 KiB), as `gzp`'s own `DEFAULT_BUFSIZE` rounds its analogous
/// default rather than using the exact historical constant.
pub const DEFAULT_BLOCK_SIZE: usize = 262_144;

/// Default worker pool size / read-ahead depth divisor.
pub const DEFAULT_BLOCKS: usize = 16;
