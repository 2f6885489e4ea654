//! Error types shared by the compressor and decompressor.

use std::{io, sync::Arc};

use thiserror::Error;

/// The result type returned by this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced by the parallel GZIP compressor or the read-ahead
/// decompressor.
///
/// This type is cheaply [`Clone`] so that a session's first-observed error
/// can be latched and handed back unchanged from every subsequent call.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A compression level outside `-2..=9` was given to `Writer::new_with_level`
    /// or the builder.
    #[error("invalid compression level: {0}")]
    InvalidLevel(i32),

    /// `set_concurrency` was given a non-positive `block_size` or `blocks`.
    #[error("invalid concurrency config: block_size={block_size}, blocks={blocks}")]
    InvalidConfig {
        /// The rejected block size.
        block_size: i64,
        /// The rejected worker count.
        blocks: i64,
    },

    /// An operation that is only legal before the first submitted block (e.g.
    /// `set_concurrency`), or only legal on an open writer, was attempted at
    /// the wrong point in the lifecycle.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A `name`/`comment` header field was not representable in Latin-1, or
    /// contained an embedded NUL; or, on read, the GZIP header was malformed
    /// or failed its FHCRC check.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The trailer's CRC-32 or ISIZE did not match the decompressed data.
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    /// The sink returned an I/O error while the emitter was writing to it.
    #[error("sink write error: {0}")]
    SinkWrite(#[source] Arc<io::Error>),

    /// The source returned an I/O error while the decoder was reading from it.
    #[error("source read error: {0}")]
    SourceRead(#[source] Arc<io::Error>),

    /// The DEFLATE encoder primitive failed.
    #[error("deflate error: {0}")]
    DeflateError(String),

    /// The DEFLATE decoder primitive failed.
    #[error("inflate error: {0}")]
    InflateError(String),
}

impl Error {
    pub(crate) fn sink_write(e: io::Error) -> Error {
        Error::SinkWrite(Arc::new(e))
    }

    pub(crate) fn source_read(e: io::Error) -> Error {
        Error::SourceRead(Arc::new(e))
    }

    /// Returns an [`io::Error`] view of this error, for use at `Read`/`Write`
    /// trait boundaries.
    pub(crate) fn into_io_error(self) -> io::Error {
        match self {
            Error::SinkWrite(e) | Error::SourceRead(e) => match Arc::try_unwrap(e) {
                Ok(e) => e,
                Err(e) => io::Error::new(e.kind(), e.to_string()),
            },
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        e.into_io_error()
    }
}

impl From<flate2::CompressError> for Error {
    fn from(e: flate2::CompressError) -> Error {
        Error::DeflateError(e.to_string())
    }
}

impl From<flate2::DecompressError> for Error {
    fn from(e: flate2::DecompressError) -> Error {
        Error::InflateError(e.to_string())
    }
}
