#![forbid(unsafe_code)]

//! DEFLATE and gzip decoding with a bit-exact provenance trace: every field
//! of the compressed stream is reported with the span of bits it came from.

use std::io::{Read, Write};

use anyhow::Result;

mod bit_reader;
mod deflate;
mod error;
mod format;
mod gzip;
mod huffman_coding;
mod trace;
mod tracking_writer;

pub use bit_reader::{BitReader, BitSequence, BitSpan};
pub use deflate::{inflate, inflate_to_vec, BlockHeader, CompressionType, DeflateReader};
pub use error::DecodeError;
pub use format::format_trace;
pub use gzip::{
    gunzip, gunzip_into, CompressionMethod, MemberFlags, MemberFooter, MemberHeader, MemberReader,
};
pub use huffman_coding::{
    DistanceToken, HuffmanCodeWord, HuffmanCoding, LitLenToken, TreeCodeToken,
    FIXED_DISTANCE_CODING, FIXED_LITLEN_CODING,
};
pub use trace::{CodeLengthCategory, CodeLengthSlot, Trace, TraceRecord};
pub use tracking_writer::TrackingWriter;

/// Reads a whole gzip member from `input` and writes the decoded bytes to
/// `output`.
pub fn decompress<R: Read, W: Write>(mut input: R, mut output: W) -> Result<Trace> {
    let mut source = Vec::new();
    input.read_to_end(&mut source)?;
    let (data, trace) = gunzip(&source)?;
    output.write_all(&data)?;
    output.flush()?;
    Ok(trace)
}
