#![forbid(unsafe_code)]

use std::{fmt, slice};

use crate::bit_reader::BitSpan;

////////////////////////////////////////////////////////////////////////////////

/// Which table a code length belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodeLengthCategory {
    /// The 19-symbol code length alphabet.
    RunLengthTable,
    /// Literal/length alphabet of a dynamic block.
    Lz77LengthTable,
    /// Distance alphabet of a dynamic block.
    Lz77DistTable,
}

impl CodeLengthCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLengthCategory::RunLengthTable => "run_length_table",
            CodeLengthCategory::Lz77LengthTable => "lz77_length_table",
            CodeLengthCategory::Lz77DistTable => "lz77_dist_table",
        }
    }
}

impl fmt::Display for CodeLengthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbol of one of the three alphabets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodeLengthSlot {
    pub category: CodeLengthCategory,
    pub symbol: u16,
}

////////////////////////////////////////////////////////////////////////////////

/// One decoding decision and the bits it was made from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceRecord {
    Bfinal {
        value: bool,
        span: BitSpan,
    },
    Btype {
        value: u8,
        span: BitSpan,
    },
    Hlit {
        value: u16,
        span: BitSpan,
    },
    Hdist {
        value: u16,
        span: BitSpan,
    },
    Hclen {
        value: u16,
        span: BitSpan,
    },
    CodeLength {
        category: CodeLengthCategory,
        symbol: u16,
        code_length: u8,
        span: BitSpan,
    },
    RepeatCodeLength {
        category: CodeLengthCategory,
        /// 16, 17 or 18.
        symbol: u16,
        repeat_count: u16,
        code_length: u8,
        affected_symbols: Vec<CodeLengthSlot>,
        span: BitSpan,
    },
    Literal {
        value: u8,
        span: BitSpan,
    },
    Lz77 {
        length_value: u16,
        length_symbol: u16,
        length_code_span: BitSpan,
        length_extra_span: BitSpan,
        dist_value: u16,
        dist_symbol: u16,
        dist_code_span: BitSpan,
        dist_extra_span: BitSpan,
        span: BitSpan,
        produced_bytes: Vec<u8>,
    },
    /// Padding dropped before the LEN field of a stored block.
    Alignment {
        span: BitSpan,
    },
    StoredLength {
        len: u16,
        nlen: u16,
        span: BitSpan,
    },
    StoredData {
        bytes: Vec<u8>,
        span: BitSpan,
    },
    BlockEnd {
        span: BitSpan,
    },
    GzipHeader {
        span: BitSpan,
        raw_bytes: Vec<u8>,
    },
    /// Payload bytes left between the final block and the gzip footer.
    TrailingData {
        raw_bytes: Vec<u8>,
        span: BitSpan,
    },
    GzipFooter {
        span: BitSpan,
        raw_bytes: Vec<u8>,
    },
}

impl TraceRecord {
    pub fn span(&self) -> BitSpan {
        match self {
            TraceRecord::Bfinal { span, .. }
            | TraceRecord::Btype { span, .. }
            | TraceRecord::Hlit { span, .. }
            | TraceRecord::Hdist { span, .. }
            | TraceRecord::Hclen { span, .. }
            | TraceRecord::CodeLength { span, .. }
            | TraceRecord::RepeatCodeLength { span, .. }
            | TraceRecord::Literal { span, .. }
            | TraceRecord::Lz77 { span, .. }
            | TraceRecord::Alignment { span }
            | TraceRecord::StoredLength { span, .. }
            | TraceRecord::StoredData { span, .. }
            | TraceRecord::BlockEnd { span }
            | TraceRecord::GzipHeader { span, .. }
            | TraceRecord::TrailingData { span, .. }
            | TraceRecord::GzipFooter { span, .. } => *span,
        }
    }

    /// Output bytes this record accounts for.
    pub fn produced_bytes(&self) -> &[u8] {
        match self {
            TraceRecord::Literal { value, .. } => slice::from_ref(value),
            TraceRecord::Lz77 { produced_bytes, .. } => produced_bytes,
            TraceRecord::StoredData { bytes, .. } => bytes,
            _ => &[],
        }
    }

    fn shift(&mut self, bits: usize) {
        match self {
            TraceRecord::Lz77 {
                length_code_span,
                length_extra_span,
                dist_code_span,
                dist_extra_span,
                span,
                ..
            } => {
                for inner in [
                    length_code_span,
                    length_extra_span,
                    dist_code_span,
                    dist_extra_span,
                    span,
                ] {
                    inner.shift(bits);
                }
            }
            TraceRecord::Bfinal { span, .. }
            | TraceRecord::Btype { span, .. }
            | TraceRecord::Hlit { span, .. }
            | TraceRecord::Hdist { span, .. }
            | TraceRecord::Hclen { span, .. }
            | TraceRecord::CodeLength { span, .. }
            | TraceRecord::RepeatCodeLength { span, .. }
            | TraceRecord::Literal { span, .. }
            | TraceRecord::Alignment { span }
            | TraceRecord::StoredLength { span, .. }
            | TraceRecord::StoredData { span, .. }
            | TraceRecord::BlockEnd { span }
            | TraceRecord::GzipHeader { span, .. }
            | TraceRecord::TrailingData { span, .. }
            | TraceRecord::GzipFooter { span, .. } => span.shift(bits),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Records in the order they were decoded. Records are only ever appended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn iter(&self) -> slice::Iter<'_, TraceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }

    /// Sum of all span lengths.
    pub fn total_bits(&self) -> usize {
        self.records.iter().map(|r| r.span().length).sum()
    }

    /// Moves every span `bits` further into the stream.
    pub fn rebase(&mut self, bits: usize) {
        for record in &mut self.records {
            record.shift(bits);
        }
    }

    /// Whether the spans tile `[0, total_bits())` with no gaps or overlaps.
    pub fn is_contiguous(&self) -> bool {
        let mut spans: Vec<BitSpan> = self.records.iter().map(TraceRecord::span).collect();
        spans.sort_by_key(|span| span.index);
        let mut end = 0;
        for span in spans {
            if span.index != end {
                return false;
            }
            end = span.end();
        }
        true
    }

    /// Literal, stored and back-reference bytes in decode order.
    pub fn produced_bytes(&self) -> Vec<u8> {
        self.records
            .iter()
            .flat_map(|r| r.produced_bytes().iter().copied())
            .collect()
    }

    pub(crate) fn extend_last_block_end(&mut self, bits: usize) {
        if let Some(TraceRecord::BlockEnd { span }) = self.records.last_mut() {
            span.extend(bits);
        }
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a TraceRecord;
    type IntoIter = slice::Iter<'a, TraceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Extend<TraceRecord> for Trace {
    fn extend<I: IntoIterator<Item = TraceRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

////////////////////////////////////////////////////////////////////////////////
