//! A parallel, block-based GZIP (RFC 1952) compressor and a concurrent
//! read-ahead decoder.
//!
//! [`Writer`] splits input into fixed-size blocks, compresses them
//! concurrently across a fixed worker pool, and reassembles the results
//! into a single well-formed GZIP stream whose trailer reflects the full
//! uncompressed input — trading a small amount of compression ratio for
//! throughput that scales with the number of workers. [`Reader`] is the
//! compatible decoder side: a sequential DEFLATE inflater wrapped in a
//! background read-ahead thread.
//!
//! ```no_run
//! use std::io::Write;
//! use pgzip::Writer;
//!
//! let mut writer = Writer::new(Vec::new());
//! writer.write_all(b"hello, world")?;
//! writer.close()?;
//! # Ok::<(), std::io::Error>(())
//! ```

mod block;
mod compress;
mod config;
mod crc;
mod decompress;
mod deflate;
mod error;
mod header;
mod pool;

pub use compress::{Writer, WriterBuilder};
pub use config::{DEFAULT_BLOCKS, DEFAULT_BLOCK_SIZE};
pub use decompress::Reader;
pub use error::{Error, Result};
pub use header::Header;
