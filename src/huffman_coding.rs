#![forbid(unsafe_code)]

use std::{convert::TryFrom, marker::PhantomData};

use log::trace;

use crate::bit_reader::{BitReader, BitSequence};
use crate::error::DecodeError;
use crate::trace::{CodeLengthCategory, CodeLengthSlot, Trace, TraceRecord};

////////////////////////////////////////////////////////////////////////////////

pub const MAX_CODE_LENGTH: usize = 15;
const MAX_SYMBOLS: usize = 288;

const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

////////////////////////////////////////////////////////////////////////////////

struct BaseTable {
    extra_bits: [u8; 30],
    base: [u16; 30],
}

const fn build_base_table(delta: usize, first: u16) -> BaseTable {
    let mut extra_bits = [0u8; 30];
    let mut base = [0u16; 30];

    let mut i = 0;
    while i < 30 - delta {
        extra_bits[i + delta] = (i / delta) as u8;
        i += 1;
    }

    let mut sum = first;
    i = 0;
    while i < 30 {
        base[i] = sum;
        sum += 1u16 << extra_bits[i];
        i += 1;
    }

    BaseTable { extra_bits, base }
}

const LENGTH_TABLE: BaseTable = {
    let mut table = build_base_table(4, 3);
    table.extra_bits[28] = 0;
    table.base[28] = 258;
    table
};

const DISTANCE_TABLE: BaseTable = build_base_table(2, 1);

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HuffmanCodeWord(pub u16);

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeCodeToken {
    Length(u8),
    CopyPrev,
    RepeatZero { symbol: u16, base: u16, extra_bits: u8 },
}

impl TryFrom<HuffmanCodeWord> for TreeCodeToken {
    type Error = DecodeError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        Ok(match value.0 {
            len @ 0..=15 => TreeCodeToken::Length(len as u8),
            16 => TreeCodeToken::CopyPrev,
            17 => TreeCodeToken::RepeatZero {
                symbol: 17,
                base: 3,
                extra_bits: 3,
            },
            18 => TreeCodeToken::RepeatZero {
                symbol: 18,
                base: 11,
                extra_bits: 7,
            },
            _ => return Err(DecodeError::InvalidCode),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LitLenToken {
    Literal(u8),
    EndOfBlock,
    Length { symbol: u16, base: u16, extra_bits: u8 },
}

impl TryFrom<HuffmanCodeWord> for LitLenToken {
    type Error = DecodeError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        Ok(match value.0 {
            byte @ 0..=255 => LitLenToken::Literal(byte as u8),
            256 => LitLenToken::EndOfBlock,
            symbol @ 257..=285 => {
                let index = (symbol - 257) as usize;
                LitLenToken::Length {
                    symbol,
                    base: LENGTH_TABLE.base[index],
                    extra_bits: LENGTH_TABLE.extra_bits[index],
                }
            }
            _ => return Err(DecodeError::InvalidCode),
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceToken {
    pub symbol: u16,
    pub base: u16,
    pub extra_bits: u8,
}

impl TryFrom<HuffmanCodeWord> for DistanceToken {
    type Error = DecodeError;

    fn try_from(value: HuffmanCodeWord) -> Result<Self, Self::Error> {
        let index = value.0 as usize;
        if index >= DISTANCE_TABLE.base.len() {
            return Err(DecodeError::InvalidCode);
        }
        Ok(DistanceToken {
            symbol: value.0,
            base: DISTANCE_TABLE.base[index],
            extra_bits: DISTANCE_TABLE.extra_bits[index],
        })
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Canonical Huffman decode table: how many codes there are of each length
/// and the symbols sorted by code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuffmanCoding<T> {
    counts: [u16; MAX_CODE_LENGTH + 1],
    symbols: [u16; MAX_SYMBOLS],
    _token: PhantomData<T>,
}

pub static FIXED_LITLEN_CODING: HuffmanCoding<LitLenToken> = HuffmanCoding::fixed_litlen();
pub static FIXED_DISTANCE_CODING: HuffmanCoding<DistanceToken> = HuffmanCoding::fixed_distance();

impl HuffmanCoding<LitLenToken> {
    const fn fixed_litlen() -> Self {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        counts[7] = 24;
        counts[8] = 152;
        counts[9] = 112;

        let mut symbols = [0u16; MAX_SYMBOLS];
        let mut i = 0;
        while i < 24 {
            symbols[i] = 256 + i as u16;
            i += 1;
        }
        i = 0;
        while i < 144 {
            symbols[24 + i] = i as u16;
            i += 1;
        }
        i = 0;
        while i < 8 {
            symbols[24 + 144 + i] = 280 + i as u16;
            i += 1;
        }
        i = 0;
        while i < 112 {
            symbols[24 + 144 + 8 + i] = 144 + i as u16;
            i += 1;
        }

        Self::from_parts(counts, symbols)
    }
}

impl HuffmanCoding<DistanceToken> {
    const fn fixed_distance() -> Self {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        counts[5] = 32;

        let mut symbols = [0u16; MAX_SYMBOLS];
        let mut i = 0;
        while i < 32 {
            symbols[i] = i as u16;
            i += 1;
        }

        Self::from_parts(counts, symbols)
    }
}

impl<T> HuffmanCoding<T> {
    const fn from_parts(counts: [u16; MAX_CODE_LENGTH + 1], symbols: [u16; MAX_SYMBOLS]) -> Self {
        Self {
            counts,
            symbols,
            _token: PhantomData,
        }
    }

    pub fn from_lengths(code_lengths: &[u8]) -> Result<Self, DecodeError> {
        if code_lengths.len() > MAX_SYMBOLS {
            return Err(DecodeError::InvalidStream("too many code lengths"));
        }

        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in code_lengths {
            let len = len as usize;
            if len > MAX_CODE_LENGTH {
                return Err(DecodeError::InvalidStream("code length exceeds 15"));
            }
            counts[len] += 1;
        }
        counts[0] = 0;

        let mut offsets = [0u16; MAX_CODE_LENGTH + 1];
        let mut sum = 0;
        for (offset, &count) in offsets.iter_mut().zip(counts.iter()) {
            *offset = sum;
            sum += count;
        }

        let mut symbols = [0u16; MAX_SYMBOLS];
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[len as usize];
                symbols[*slot as usize] = symbol as u16;
                *slot += 1;
            }
        }

        Ok(Self::from_parts(counts, symbols))
    }

    pub fn counts(&self) -> &[u16; MAX_CODE_LENGTH + 1] {
        &self.counts
    }

    /// Symbols in canonical code order.
    pub fn symbols(&self) -> &[u16] {
        let used: u16 = self.counts.iter().sum();
        &self.symbols[..used as usize]
    }

    /// Decodes one code and returns the symbol with the code bits, most
    /// significant bit first, at the position they were read from.
    pub fn decode_symbol(
        &self,
        bit_reader: &mut BitReader,
    ) -> Result<(HuffmanCodeWord, BitSequence), DecodeError> {
        let index = bit_reader.position();
        let (mut buffer, available) = bit_reader.peek();

        let mut code = 0u16;
        let mut cur = 0i32;
        let mut sum = 0i32;
        for len in 1..=MAX_CODE_LENGTH {
            if len > available as usize {
                return Err(DecodeError::TruncatedStream);
            }
            let bit = buffer & 1;
            buffer >>= 1;

            code = (code << 1) | bit as u16;
            cur = 2 * cur + bit as i32;
            let count = self.counts[len] as i32;
            sum += count;
            cur -= count;

            if cur < 0 {
                bit_reader.consume(len as u8);
                let symbol = self.symbols[(sum + cur) as usize];
                return Ok((HuffmanCodeWord(symbol), BitSequence::new(code, len as u8, index)));
            }
        }

        Err(DecodeError::InvalidCode)
    }
}

impl<T> HuffmanCoding<T>
where
    T: TryFrom<HuffmanCodeWord, Error = DecodeError>,
{
    pub fn read_symbol(&self, bit_reader: &mut BitReader) -> Result<(T, BitSequence), DecodeError> {
        let (word, code) = self.decode_symbol(bit_reader)?;
        Ok((T::try_from(word)?, code))
    }
}

////////////////////////////////////////////////////////////////////////////////

fn slot_for(index: usize, hlit: usize) -> CodeLengthSlot {
    if index < hlit {
        CodeLengthSlot {
            category: CodeLengthCategory::Lz77LengthTable,
            symbol: index as u16,
        }
    } else {
        CodeLengthSlot {
            category: CodeLengthCategory::Lz77DistTable,
            symbol: (index - hlit) as u16,
        }
    }
}

/// Reads the dynamic block preamble and builds its two codings, recording
/// every field into `trace`.
pub fn decode_litlen_distance_trees(
    bit_reader: &mut BitReader,
    trace: &mut Trace,
) -> Result<(HuffmanCoding<LitLenToken>, HuffmanCoding<DistanceToken>), DecodeError> {
    let hlit = bit_reader.read_bits(5)?;
    let hlit_value = hlit.bits() + 257;
    trace.push(TraceRecord::Hlit {
        value: hlit_value,
        span: hlit.span(),
    });

    let hdist = bit_reader.read_bits(5)?;
    let hdist_value = hdist.bits() + 1;
    trace.push(TraceRecord::Hdist {
        value: hdist_value,
        span: hdist.span(),
    });

    let hclen = bit_reader.read_bits(4)?;
    let hclen_value = hclen.bits() + 4;
    trace.push(TraceRecord::Hclen {
        value: hclen_value,
        span: hclen.span(),
    });

    trace!(
        "dynamic trees: hlit = {}, hdist = {}, hclen = {}",
        hlit_value,
        hdist_value,
        hclen_value
    );

    let mut tree_lengths = [0u8; 19];
    for &symbol in CODE_LENGTH_ORDER.iter().take(hclen_value as usize) {
        let length = bit_reader.read_bits(3)?;
        tree_lengths[symbol] = length.bits() as u8;
        trace.push(TraceRecord::CodeLength {
            category: CodeLengthCategory::RunLengthTable,
            symbol: symbol as u16,
            code_length: length.bits() as u8,
            span: length.span(),
        });
    }
    let tree_coding = HuffmanCoding::<TreeCodeToken>::from_lengths(&tree_lengths)?;

    let hlit = hlit_value as usize;
    let total = hlit + hdist_value as usize;
    let mut lengths: Vec<u8> = Vec::with_capacity(total);
    while lengths.len() < total {
        let (token, code) = tree_coding.read_symbol(bit_reader)?;
        let (symbol, code_length, base, extra_bits) = match token {
            TreeCodeToken::Length(len) => {
                let slot = slot_for(lengths.len(), hlit);
                lengths.push(len);
                trace.push(TraceRecord::CodeLength {
                    category: slot.category,
                    symbol: slot.symbol,
                    code_length: len,
                    span: code.span(),
                });
                continue;
            }
            TreeCodeToken::CopyPrev => {
                let prev = *lengths.last().ok_or(DecodeError::InvalidStream(
                    "repeat of previous code length with no previous length",
                ))?;
                (16, prev, 3, 2)
            }
            TreeCodeToken::RepeatZero {
                symbol,
                base,
                extra_bits,
            } => (symbol, 0, base, extra_bits),
        };

        let extra = bit_reader.read_bits(extra_bits)?;
        let repeat_count = base + extra.bits();
        let start = lengths.len();
        if start + repeat_count as usize > total {
            return Err(DecodeError::InvalidStream(
                "code length repeat overruns the alphabet",
            ));
        }
        lengths.resize(start + repeat_count as usize, code_length);

        let affected_symbols: Vec<CodeLengthSlot> = (start..lengths.len())
            .map(|index| slot_for(index, hlit))
            .collect();
        trace.push(TraceRecord::RepeatCodeLength {
            category: affected_symbols[0].category,
            symbol,
            repeat_count,
            code_length,
            affected_symbols,
            span: code.span().through(extra.span()),
        });
    }

    let (litlen_lengths, distance_lengths) = lengths.split_at(hlit);
    Ok((
        HuffmanCoding::from_lengths(litlen_lengths)?,
        HuffmanCoding::from_lengths(distance_lengths)?,
    ))
}

////////////////////////////////////////////////////////////////////////////////
