#![forbid(unsafe_code)]

use anyhow::{ensure, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use crc::{Crc, CRC_32_ISO_HDLC};
use log::{debug, warn};

use crate::bit_reader::BitSpan;
use crate::deflate::DeflateReader;
use crate::error::DecodeError;
use crate::trace::{Trace, TraceRecord};

////////////////////////////////////////////////////////////////////////////////

const ID1: u8 = 0x1f;
const ID2: u8 = 0x8b;

const CM_DEFLATE: u8 = 8;

const FTEXT_OFFSET: u8 = 0;
const FHCRC_OFFSET: u8 = 1;
const FEXTRA_OFFSET: u8 = 2;
const FNAME_OFFSET: u8 = 3;
const FCOMMENT_OFFSET: u8 = 4;

const FOOTER_SIZE: usize = 8;

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHeader {
    pub compression_method: CompressionMethod,
    pub flags: MemberFlags,
    pub modification_time: u32,
    pub extra: Option<Vec<u8>>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub extra_flags: u8,
    pub os: u8,
}

impl MemberHeader {
    pub fn flags(&self) -> MemberFlags {
        self.flags
    }
}

// Header strings are ISO 8859-1.
fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Copy, Debug, PartialEq, Ord, PartialOrd, Eq)]
pub enum CompressionMethod {
    Deflate,
    Unknown(u8),
}

impl From<u8> for CompressionMethod {
    fn from(value: u8) -> Self {
        match value {
            CM_DEFLATE => Self::Deflate,
            x => Self::Unknown(x),
        }
    }
}

impl From<CompressionMethod> for u8 {
    fn from(method: CompressionMethod) -> u8 {
        match method {
            CompressionMethod::Deflate => CM_DEFLATE,
            CompressionMethod::Unknown(x) => x,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFlags(pub u8);

impl MemberFlags {
    fn bit(&self, n: u8) -> bool {
        (self.0 >> n) & 1 != 0
    }

    pub fn is_text(&self) -> bool {
        self.bit(FTEXT_OFFSET)
    }

    pub fn has_crc(&self) -> bool {
        self.bit(FHCRC_OFFSET)
    }

    pub fn has_extra(&self) -> bool {
        self.bit(FEXTRA_OFFSET)
    }

    pub fn has_name(&self) -> bool {
        self.bit(FNAME_OFFSET)
    }

    pub fn has_comment(&self) -> bool {
        self.bit(FCOMMENT_OFFSET)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFooter {
    pub data_crc32: u32,
    pub data_size: u32,
}

////////////////////////////////////////////////////////////////////////////////

/// A single gzip member held in memory.
pub struct MemberReader<'a> {
    source: &'a [u8],
}

impl<'a> MemberReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self { source }
    }

    /// Parses the header and returns it with the offset of the first payload
    /// byte.
    pub fn read_header(&self) -> Result<(MemberHeader, usize)> {
        ensure!(
            self.source.starts_with(&[ID1, ID2]),
            DecodeError::NotGzip
        );
        let mut rdr = &self.source[2..];

        let cm: CompressionMethod = rdr.read_u8().map_err(DecodeError::from)?.into();
        ensure!(cm == CompressionMethod::Deflate, DecodeError::NotGzip);

        let flags = MemberFlags(rdr.read_u8().map_err(DecodeError::from)?);
        let mtime = rdr.read_u32::<LittleEndian>().map_err(DecodeError::from)?;
        let xfl = rdr.read_u8().map_err(DecodeError::from)?;
        let os = rdr.read_u8().map_err(DecodeError::from)?;

        let extra = if flags.has_extra() {
            let len = rdr.read_u16::<LittleEndian>().map_err(DecodeError::from)? as usize;
            ensure!(rdr.len() >= len, DecodeError::TruncatedStream);
            let (extra, rest) = rdr.split_at(len);
            rdr = rest;
            Some(extra.to_vec())
        } else {
            None
        };

        let name = if flags.has_name() {
            Some(latin1_string(read_zero_terminated(&mut rdr)?))
        } else {
            None
        };

        let comment = if flags.has_comment() {
            Some(latin1_string(read_zero_terminated(&mut rdr)?))
        } else {
            None
        };

        let header = MemberHeader {
            compression_method: cm,
            flags,
            modification_time: mtime,
            extra,
            name,
            comment,
            extra_flags: xfl,
            os,
        };

        if header.flags.has_crc() {
            let covered = &self.source[..self.source.len() - rdr.len()];
            let crc16 = rdr.read_u16::<LittleEndian>().map_err(DecodeError::from)?;
            ensure!(
                CRC.checksum(covered) as u16 == crc16,
                DecodeError::HeaderCrcMismatch
            );
        }

        Ok((header, self.source.len() - rdr.len()))
    }

    /// Reads the trailing CRC-32 and ISIZE fields.
    pub fn read_footer(&self, payload_start: usize) -> Result<MemberFooter> {
        ensure!(
            self.source.len() >= payload_start + FOOTER_SIZE,
            DecodeError::TruncatedStream
        );
        let mut rdr = &self.source[self.source.len() - FOOTER_SIZE..];
        let crc = rdr.read_u32::<LittleEndian>().map_err(DecodeError::from)?;
        let isize = rdr.read_u32::<LittleEndian>().map_err(DecodeError::from)?;
        Ok(MemberFooter {
            data_crc32: crc,
            data_size: isize,
        })
    }
}

fn read_zero_terminated<'a>(rdr: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let stream: &'a [u8] = *rdr;
    let end = stream
        .iter()
        .position(|&b| b == 0)
        .ok_or(DecodeError::TruncatedStream)?;
    *rdr = &stream[end + 1..];
    Ok(&stream[..end])
}

////////////////////////////////////////////////////////////////////////////////

/// Inflates the payload of a gzip member into `destination`, checks the
/// footer and returns the output with a trace in absolute stream offsets.
pub fn gunzip_into<'b>(source: &[u8], destination: &'b mut [u8]) -> Result<(&'b [u8], Trace)> {
    let member = MemberReader::new(source);
    let (header, payload_start) = member.read_header()?;
    let footer = member.read_footer(payload_start)?;
    debug!("gzip member: {:?}, {:?}", header, footer);

    inflate_member(source, payload_start, footer, destination)
}

/// Like [`gunzip_into`], with a buffer sized from the ISIZE field.
pub fn gunzip(source: &[u8]) -> Result<(Vec<u8>, Trace)> {
    let member = MemberReader::new(source);
    let (header, payload_start) = member.read_header()?;
    let footer = member.read_footer(payload_start)?;
    debug!("gzip member: {:?}, {:?}", header, footer);

    let mut destination = vec![0u8; footer.data_size as usize];
    let (len, trace) = {
        let (data, trace) = inflate_member(source, payload_start, footer, &mut destination)?;
        (data.len(), trace)
    };
    destination.truncate(len);
    Ok((destination, trace))
}

fn inflate_member<'b>(
    source: &[u8],
    payload_start: usize,
    footer: MemberFooter,
    destination: &'b mut [u8],
) -> Result<(&'b [u8], Trace)> {
    let payload_end = source.len() - FOOTER_SIZE;
    let payload = &source[payload_start..payload_end];

    let mut reader = DeflateReader::new(payload, destination);
    while let Some(block) = reader.next_block() {
        block?;
    }
    debug!(
        "inflated {} payload bits into {} bytes",
        reader.position(),
        reader.byte_count()
    );
    let (rest, writer, mut inner) = reader.into_inners();

    let (data, crc32) = writer.finish();
    ensure!(
        footer.data_size == data.len() as u32,
        DecodeError::SizeMismatch
    );
    ensure!(footer.data_crc32 == crc32, DecodeError::CrcMismatch);

    let mut trace = Trace::new();
    trace.push(TraceRecord::GzipHeader {
        span: BitSpan::new(0, payload_start * 8),
        raw_bytes: source[..payload_start].to_vec(),
    });
    inner.rebase(payload_start * 8);
    trace.extend(inner.into_records());
    if !rest.is_empty() {
        warn!(
            "{} payload bytes after the final block are ignored",
            rest.len()
        );
        let rest_start = payload_end - rest.len();
        trace.push(TraceRecord::TrailingData {
            raw_bytes: rest.to_vec(),
            span: BitSpan::new(rest_start * 8, rest.len() * 8),
        });
    }
    trace.push(TraceRecord::GzipFooter {
        span: BitSpan::new(payload_end * 8, FOOTER_SIZE * 8),
        raw_bytes: source[payload_end..].to_vec(),
    });

    Ok((data, trace))
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED_A12: [u8; 5] = [0x4b, 0x4c, 0x44, 0x00, 0x00];

    fn member(header: &[u8], payload: &[u8], data: &[u8]) -> Vec<u8> {
        let mut out = header.to_vec();
        out.extend_from_slice(payload);
        out.extend_from_slice(&CRC.checksum(data).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out
    }

    fn plain_header() -> Vec<u8> {
        vec![0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0x03]
    }

    fn decode_error(err: anyhow::Error) -> DecodeError {
        *err.downcast_ref::<DecodeError>().expect("DecodeError")
    }

    #[test]
    fn gunzip_wraps_trace() -> Result<()> {
        let source = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaaa");
        let (data, trace) = gunzip(&source)?;
        assert_eq!(data, b"aaaaaaaaaaaa");

        let records = trace.records();
        assert_eq!(
            records.first(),
            Some(&TraceRecord::GzipHeader {
                span: BitSpan::new(0, 80),
                raw_bytes: plain_header(),
            })
        );
        assert_eq!(records[1].span(), BitSpan::new(80, 1));
        assert_eq!(
            records.last(),
            Some(&TraceRecord::GzipFooter {
                span: BitSpan::new(120, 64),
                raw_bytes: source[15..].to_vec(),
            })
        );
        assert!(trace.is_contiguous());
        assert_eq!(trace.total_bits(), source.len() * 8);
        assert_eq!(trace.produced_bytes(), data);
        Ok(())
    }

    #[test]
    fn optional_header_fields() -> Result<()> {
        let mut header = vec![0x1f, 0x8b, 0x08, 0b0001_1110, 1, 2, 3, 4, 0x02, 0xff];
        header.extend_from_slice(&[3, 0, b'x', b'y', b'z']);
        header.extend_from_slice(b"a.txt\0");
        header.extend_from_slice(b"caf\xe9\0");
        let crc16 = CRC.checksum(&header) as u16;
        header.extend_from_slice(&crc16.to_le_bytes());

        let source = member(&header, &FIXED_A12, b"aaaaaaaaaaaa");
        let (parsed, payload_start) = MemberReader::new(&source).read_header()?;
        assert_eq!(payload_start, header.len());
        assert_eq!(parsed.modification_time, 0x04030201);
        assert_eq!(parsed.extra.as_deref(), Some(&b"xyz"[..]));
        assert_eq!(parsed.name.as_deref(), Some("a.txt"));
        assert_eq!(parsed.comment.as_deref(), Some("café"));
        assert!(parsed.flags().has_crc());
        assert!(!parsed.flags().is_text());

        let (data, trace) = gunzip(&source)?;
        assert_eq!(data.len(), 12);
        assert_eq!(trace.records()[0].span(), BitSpan::new(0, header.len() * 8));
        assert!(trace.is_contiguous());

        let last = header.len() - 1;
        header[last] ^= 0xff;
        let corrupted = member(&header, &FIXED_A12, b"aaaaaaaaaaaa");
        assert_eq!(
            decode_error(gunzip(&corrupted).unwrap_err()),
            DecodeError::HeaderCrcMismatch
        );
        Ok(())
    }

    #[test]
    fn caller_buffer() -> Result<()> {
        let source = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaaa");
        let mut destination = [0u8; 100];
        let (data, _) = gunzip_into(&source, &mut destination)?;
        assert_eq!(data, b"aaaaaaaaaaaa");

        let mut small = [0u8; 4];
        assert_eq!(
            decode_error(gunzip_into(&source, &mut small).unwrap_err()),
            DecodeError::OutputOverflow
        );
        Ok(())
    }

    #[test]
    fn errors() {
        let mut not_gzip = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaaa");
        not_gzip[1] = 0x8c;
        assert_eq!(
            decode_error(gunzip(&not_gzip).unwrap_err()),
            DecodeError::NotGzip
        );

        let mut not_deflate = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaaa");
        not_deflate[2] = 0x07;
        assert_eq!(
            decode_error(gunzip(&not_deflate).unwrap_err()),
            DecodeError::NotGzip
        );

        let bad_crc = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaab");
        assert_eq!(
            decode_error(gunzip(&bad_crc).unwrap_err()),
            DecodeError::CrcMismatch
        );

        let mut bad_size = member(&plain_header(), &FIXED_A12, b"aaaaaaaaaaaa");
        let len = bad_size.len();
        bad_size[len - 4] = 13;
        assert_eq!(
            decode_error(gunzip(&bad_size).unwrap_err()),
            DecodeError::SizeMismatch
        );

        assert_eq!(
            decode_error(gunzip(&plain_header()).unwrap_err()),
            DecodeError::TruncatedStream
        );

        for short in [&[][..], &[ID1][..], &[0x50][..], &[0x50, 0x4b][..]] {
            assert_eq!(
                decode_error(gunzip(short).unwrap_err()),
                DecodeError::NotGzip
            );
        }
    }

    #[test]
    fn bytes_after_final_block() -> Result<()> {
        let mut payload = FIXED_A12.to_vec();
        payload.push(0x00);
        let source = member(&plain_header(), &payload, b"aaaaaaaaaaaa");

        let (data, trace) = gunzip(&source)?;
        assert_eq!(data, b"aaaaaaaaaaaa");
        assert!(trace.is_contiguous());
        assert_eq!(trace.total_bits(), source.len() * 8);

        let records = trace.records();
        assert_eq!(
            records[records.len() - 2],
            TraceRecord::TrailingData {
                raw_bytes: vec![0x00],
                span: BitSpan::new(120, 8),
            }
        );
        assert_eq!(
            records.last().map(TraceRecord::span),
            Some(BitSpan::new(128, 64))
        );
        Ok(())
    }
}
