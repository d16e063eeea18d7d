#![forbid(unsafe_code)]

use std::convert::TryFrom;

use anyhow::{bail, ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::bit_reader::{BitReader, BitSpan};
use crate::error::DecodeError;
use crate::huffman_coding::{
    decode_litlen_distance_trees, DistanceToken, HuffmanCoding, LitLenToken,
    FIXED_DISTANCE_CODING, FIXED_LITLEN_CODING,
};
use crate::trace::{Trace, TraceRecord};
use crate::tracking_writer::TrackingWriter;

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct BlockHeader {
    pub is_final: bool,
    pub compression_type: CompressionType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionType {
    Uncompressed = 0,
    FixedTree = 1,
    DynamicTree = 2,
    Reserved = 3,
}

impl TryFrom<u16> for CompressionType {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0 => CompressionType::Uncompressed,
            1 => CompressionType::FixedTree,
            2 => CompressionType::DynamicTree,
            3 => CompressionType::Reserved,
            _ => bail!("Invalid compression type!"),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Block-by-block DEFLATE decoder that records a trace of every field it
/// reads.
pub struct DeflateReader<'a, 'b> {
    bit_reader: BitReader<'a>,
    tracker: TrackingWriter<'b>,
    trace: Trace,
    is_avail: bool,
}

impl<'a, 'b> DeflateReader<'a, 'b> {
    pub fn new(source: &'a [u8], destination: &'b mut [u8]) -> Self {
        Self {
            bit_reader: BitReader::new(source),
            tracker: TrackingWriter::new(destination),
            trace: Trace::new(),
            is_avail: true,
        }
    }

    pub fn next_block(&mut self) -> Option<Result<BlockHeader>> {
        if self.is_avail {
            let block = self.read_block();
            if block.is_err() {
                self.is_avail = false;
            }
            Some(block)
        } else {
            None
        }
    }

    fn read_block(&mut self) -> Result<BlockHeader> {
        let header = self.read_header()?;
        self.is_avail = !header.is_final;

        match header.compression_type {
            CompressionType::Uncompressed => self.read_stored_block()?,
            CompressionType::FixedTree => {
                self.read_compressed_block(&FIXED_LITLEN_CODING, &FIXED_DISTANCE_CODING)?
            }
            CompressionType::DynamicTree => {
                let (litlen_coding, distance_coding) =
                    decode_litlen_distance_trees(&mut self.bit_reader, &mut self.trace)?;
                self.read_compressed_block(&litlen_coding, &distance_coding)?
            }
            CompressionType::Reserved => bail!(DecodeError::InvalidBlockType),
        }

        if header.is_final {
            let padding = self.bit_reader.align_to_byte();
            self.trace.extend_last_block_end(padding.length);
        }

        Ok(header)
    }

    fn read_header(&mut self) -> Result<BlockHeader> {
        let bfinal = self.bit_reader.read_bit()?;
        self.trace.push(TraceRecord::Bfinal {
            value: bfinal.bits() == 1,
            span: bfinal.span(),
        });

        let btype = self.bit_reader.read_bits(2)?;
        self.trace.push(TraceRecord::Btype {
            value: btype.bits() as u8,
            span: btype.span(),
        });

        let header = BlockHeader {
            is_final: bfinal.bits() == 1,
            compression_type: btype.bits().try_into()?,
        };
        debug!(
            "block at bit {}: final = {}, type = {:?}",
            bfinal.span().index,
            header.is_final,
            header.compression_type
        );
        Ok(header)
    }

    fn read_stored_block(&mut self) -> Result<()> {
        let padding = self.bit_reader.align_to_byte();
        if padding.length > 0 {
            self.trace.push(TraceRecord::Alignment { span: padding });
        }

        let index = self.bit_reader.position();
        let rdr = self.bit_reader.borrow_reader_from_boundary();
        let len = rdr.read_u16::<LittleEndian>().map_err(DecodeError::from)?;
        let nlen = rdr.read_u16::<LittleEndian>().map_err(DecodeError::from)?;
        self.trace.push(TraceRecord::StoredLength {
            len,
            nlen,
            span: BitSpan::new(index, 32),
        });
        ensure!(len == !nlen, DecodeError::BlockLengthMismatch);

        let stream: &'a [u8] = *rdr;
        ensure!(stream.len() >= len as usize, DecodeError::TruncatedStream);
        let (bytes, rest) = stream.split_at(len as usize);
        *rdr = rest;

        self.tracker.write_slice(bytes)?;
        let data_span = BitSpan::new(index + 32, bytes.len() * 8);
        if !bytes.is_empty() {
            self.trace.push(TraceRecord::StoredData {
                bytes: bytes.to_vec(),
                span: data_span,
            });
        }
        self.trace.push(TraceRecord::BlockEnd {
            span: BitSpan::new(data_span.end(), 0),
        });
        Ok(())
    }

    fn read_compressed_block(
        &mut self,
        litlen_coding: &HuffmanCoding<LitLenToken>,
        distance_coding: &HuffmanCoding<DistanceToken>,
    ) -> Result<()> {
        loop {
            let (token, code) = litlen_coding.read_symbol(&mut self.bit_reader)?;
            match token {
                LitLenToken::EndOfBlock => {
                    self.trace.push(TraceRecord::BlockEnd { span: code.span() });
                    break;
                }
                LitLenToken::Literal(byte) => {
                    self.tracker.write_u8(byte)?;
                    self.trace.push(TraceRecord::Literal {
                        value: byte,
                        span: code.span(),
                    });
                }
                LitLenToken::Length {
                    symbol: length_symbol,
                    base: length_base,
                    extra_bits: length_extra_bits,
                } => {
                    let length_extra = self.bit_reader.read_bits(length_extra_bits)?;
                    let length = length_base + length_extra.bits();

                    let (distance_token, distance_code) =
                        distance_coding.read_symbol(&mut self.bit_reader)?;
                    let distance_extra = self.bit_reader.read_bits(distance_token.extra_bits)?;
                    let distance = distance_token.base + distance_extra.bits();

                    let produced_bytes = self
                        .tracker
                        .write_previous(distance as usize, length as usize)?
                        .to_vec();
                    self.trace.push(TraceRecord::Lz77 {
                        length_value: length,
                        length_symbol,
                        length_code_span: code.span(),
                        length_extra_span: length_extra.span(),
                        dist_value: distance,
                        dist_symbol: distance_token.symbol,
                        dist_code_span: distance_code.span(),
                        dist_extra_span: distance_extra.span(),
                        span: code.span().through(distance_extra.span()),
                        produced_bytes,
                    });
                }
            }
        }
        Ok(())
    }

    /// Offset of the next unread bit of the source.
    pub fn position(&self) -> usize {
        self.bit_reader.position()
    }

    pub fn byte_count(&self) -> usize {
        self.tracker.byte_count()
    }

    /// Unconsumed source bytes, the output writer and the trace.
    pub fn into_inners(self) -> (&'a [u8], TrackingWriter<'b>, Trace) {
        (self.bit_reader.into_inner(), self.tracker, self.trace)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Inflates a raw DEFLATE stream into `destination`, returning the written
/// prefix and the trace.
pub fn inflate<'b>(source: &[u8], destination: &'b mut [u8]) -> Result<(&'b [u8], Trace)> {
    let mut reader = DeflateReader::new(source, destination);
    while let Some(block) = reader.next_block() {
        block?;
    }
    let (_, writer, trace) = reader.into_inners();
    let (data, _) = writer.finish();
    Ok((data, trace))
}

/// Like [`inflate`], into a fresh buffer of `capacity` bytes.
pub fn inflate_to_vec(source: &[u8], capacity: usize) -> Result<(Vec<u8>, Trace)> {
    let mut destination = vec![0u8; capacity];
    let (data, trace) = inflate(source, &mut destination)?;
    let len = data.len();
    destination.truncate(len);
    Ok((destination, trace))
}

////////////////////////////////////////////////////////////////////////////////
