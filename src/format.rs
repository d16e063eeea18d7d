#![forbid(unsafe_code)]

use std::{ascii, fmt};

use crate::trace::{Trace, TraceRecord};

////////////////////////////////////////////////////////////////////////////////

/// Renders the trace as a line-oriented report: one `[bits] label` line per
/// record, plus one line per symbol a repeat instruction sets.
pub fn format_trace(trace: &Trace) -> String {
    trace.to_string()
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self {
            write_record(f, record)?;
        }
        Ok(())
    }
}

fn line(f: &mut impl fmt::Write, size: usize, msg: fmt::Arguments) -> fmt::Result {
    writeln!(f, "{:>4} {}", format!("[{}]", size), msg)
}

fn write_record(f: &mut impl fmt::Write, record: &TraceRecord) -> fmt::Result {
    let size = record.span().length;
    match record {
        TraceRecord::Bfinal { value, .. } => {
            if *value {
                line(f, size, format_args!("Last block (val: 1)"))
            } else {
                line(f, size, format_args!("Not final (val: 0)"))
            }
        }
        TraceRecord::Btype { value, .. } => {
            let kind = match value {
                0 => "Uncompressed block",
                1 => "Fixed Huffman Tree block",
                2 => "Dynamic Huffman Tree block",
                _ => "Reserved block type",
            };
            line(f, size, format_args!("{} (val: {})", kind, value))
        }
        TraceRecord::Hlit { value, .. } => line(
            f,
            size,
            format_args!("HLIT  {:>3} (val:{})", value, value.saturating_sub(257)),
        ),
        TraceRecord::Hdist { value, .. } => line(
            f,
            size,
            format_args!("HDIST {:>3} (val:{})", value, value.saturating_sub(1)),
        ),
        TraceRecord::Hclen { value, .. } => line(
            f,
            size,
            format_args!("HCLEN {:>3} (val:{})", value, value.saturating_sub(4)),
        ),
        TraceRecord::CodeLength {
            category,
            symbol,
            code_length,
            ..
        } => line(
            f,
            size,
            format_args!("{} {:>3} len {}", category, symbol, code_length),
        ),
        TraceRecord::RepeatCodeLength {
            symbol,
            repeat_count,
            code_length,
            affected_symbols,
            ..
        } => {
            line(
                f,
                size,
                format_args!(
                    "Repeat len {} x{} (sym {})",
                    code_length, repeat_count, symbol
                ),
            )?;
            for slot in affected_symbols {
                line(
                    f,
                    0,
                    format_args!(
                        "  {} {:>3} len {}",
                        slot.category, slot.symbol, code_length
                    ),
                )?;
            }
            Ok(())
        }
        TraceRecord::Literal { value, .. } => line(
            f,
            size,
            format_args!("{:02X}  {}", value, ascii::escape_default(*value)),
        ),
        TraceRecord::Lz77 {
            length_value,
            dist_value,
            ..
        } => line(f, size, format_args!("({},{})", length_value, dist_value)),
        TraceRecord::Alignment { .. } => line(f, size, format_args!("Padding to byte boundary")),
        TraceRecord::StoredLength { len, nlen, .. } => {
            line(f, size, format_args!("LEN {} NLEN {:#06x}", len, nlen))
        }
        TraceRecord::StoredData { bytes, .. } => {
            line(f, size, format_args!("{} stored bytes", bytes.len()))
        }
        TraceRecord::BlockEnd { .. } => line(f, size, format_args!("End of block")),
        TraceRecord::GzipHeader { raw_bytes, .. } => {
            line(f, size, format_args!("Gzip header ({} bytes)", raw_bytes.len()))
        }
        TraceRecord::TrailingData { raw_bytes, .. } => line(
            f,
            size,
            format_args!("{} bytes after the final block", raw_bytes.len()),
        ),
        TraceRecord::GzipFooter { raw_bytes, .. } => {
            let field = |at: usize| {
                raw_bytes
                    .get(at..at + 4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .unwrap_or_default()
            };
            line(
                f,
                size,
                format_args!("Gzip footer (crc32: {:08x}, size: {})", field(0), field(4)),
            )
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
