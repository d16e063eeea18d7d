#![forbid(unsafe_code)]

use crate::error::DecodeError;

////////////////////////////////////////////////////////////////////////////////

/// Keep at least this many bits buffered so a 16-bit field never needs a
/// second refill.
const REFILL_THRESHOLD: u8 = 24;

////////////////////////////////////////////////////////////////////////////////

/// A `[index, index + length)` range of bits, counted from the first bit of
/// the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BitSpan {
    pub index: usize,
    pub length: usize,
}

impl BitSpan {
    pub fn new(index: usize, length: usize) -> Self {
        Self { index, length }
    }

    pub fn end(&self) -> usize {
        self.index + self.length
    }

    /// The span starting at `self` and ending where `last` ends.
    pub fn through(&self, last: BitSpan) -> BitSpan {
        debug_assert!(last.end() >= self.index);
        BitSpan::new(self.index, last.end() - self.index)
    }

    pub fn extend(&mut self, bits: usize) {
        self.length += bits;
    }

    pub fn shift(&mut self, bits: usize) {
        self.index += bits;
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Bits read from the stream together with the position they were read at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitSequence {
    bits: u16,
    len: u8,
    index: usize,
}

impl BitSequence {
    pub fn new(bits: u16, len: u8, index: usize) -> Self {
        assert!(len <= 16);
        assert!(len == 16 || bits >> len == 0);
        Self { bits, len, index }
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn span(&self) -> BitSpan {
        BitSpan::new(self.index, self.len as usize)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// LSB-first bit cursor over an in-memory DEFLATE stream.
///
/// Whole bytes are pulled into `buffer` ahead of the read position, so
/// `position` is derived from the bytes taken minus the bits still buffered.
pub struct BitReader<'a> {
    source: &'a [u8],
    stream: &'a [u8],
    buffer: u32,
    bit_count: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            stream: source,
            buffer: 0,
            bit_count: 0,
        }
    }

    /// Offset of the next unread bit.
    pub fn position(&self) -> usize {
        self.taken_bytes() * 8 - self.bit_count as usize
    }

    fn taken_bytes(&self) -> usize {
        self.source.len() - self.stream.len()
    }

    fn refill(&mut self) {
        while self.bit_count < REFILL_THRESHOLD {
            match self.stream.split_first() {
                Some((&byte, rest)) => {
                    self.buffer |= (byte as u32) << self.bit_count;
                    self.bit_count += 8;
                    self.stream = rest;
                }
                None => break,
            }
        }
    }

    pub fn read_bits(&mut self, len: u8) -> Result<BitSequence, DecodeError> {
        assert!(len <= 16);
        let index = self.position();
        if len == 0 {
            return Ok(BitSequence::new(0, 0, index));
        }
        self.refill();
        if self.bit_count < len {
            return Err(DecodeError::TruncatedStream);
        }
        let bits = (self.buffer & ((1u32 << len) - 1)) as u16;
        self.consume(len);
        Ok(BitSequence::new(bits, len, index))
    }

    pub fn read_bit(&mut self) -> Result<BitSequence, DecodeError> {
        self.read_bits(1)
    }

    /// Buffered bits (LSB is the next stream bit) and how many are valid.
    pub(crate) fn peek(&mut self) -> (u32, u8) {
        self.refill();
        (self.buffer, self.bit_count)
    }

    pub(crate) fn consume(&mut self, len: u8) {
        debug_assert!(len <= self.bit_count);
        self.buffer >>= len;
        self.bit_count -= len;
    }

    /// Drops the rest of the current partial byte and pushes whole buffered
    /// bytes back into the stream. Returns the span of the dropped bits.
    pub fn align_to_byte(&mut self) -> BitSpan {
        let index = self.position();
        let padding = self.bit_count % 8;
        self.consume(padding);

        let unread = (self.bit_count / 8) as usize;
        let offset = self.taken_bytes() - unread;
        self.stream = &self.source[offset..];
        self.buffer = 0;
        self.bit_count = 0;

        BitSpan::new(index, padding as usize)
    }

    /// Byte reader positioned at the current byte boundary.
    /// `align_to_byte` must have been called first.
    pub fn borrow_reader_from_boundary(&mut self) -> &mut &'a [u8] {
        debug_assert_eq!(self.bit_count, 0);
        &mut self.stream
    }

    /// Bytes not yet consumed, as seen after aligning to a byte boundary.
    pub fn into_inner(mut self) -> &'a [u8] {
        self.align_to_byte();
        self.stream
    }
}

////////////////////////////////////////////////////////////////////////////////
