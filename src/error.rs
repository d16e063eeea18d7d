#![forbid(unsafe_code)]

use std::io;

use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

/// Structural failures of a DEFLATE or gzip stream.
///
/// Every variant is fatal: DEFLATE has no way to resynchronise in the middle
/// of a block, so the whole decode is abandoned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("input ended while more bits were required")]
    TruncatedStream,
    #[error("no valid huffman code found")]
    InvalidCode,
    #[error("reserved block type")]
    InvalidBlockType,
    #[error("stored block LEN does not match NLEN")]
    BlockLengthMismatch,
    #[error("back-reference distance points before the start of the output")]
    InvalidDistance,
    #[error("destination buffer is too small")]
    OutputOverflow,
    #[error("not a gzip deflate stream")]
    NotGzip,
    #[error("invalid stream: {0}")]
    InvalidStream(&'static str),
    #[error("gzip header crc16 check failed")]
    HeaderCrcMismatch,
    #[error("crc32 check failed")]
    CrcMismatch,
    #[error("length check failed")]
    SizeMismatch,
}

// Reads from an in-memory slice can only fail by running out of bytes.
impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        DecodeError::TruncatedStream
    }
}
