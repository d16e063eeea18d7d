use std::io::Write;

use flate2::{write::DeflateEncoder, write::GzEncoder, Compression, GzBuilder};

use inflate_trace::{
    decompress, gunzip, gunzip_into, inflate, inflate_to_vec, CodeLengthCategory, DecodeError,
    Trace, TraceRecord,
};

////////////////////////////////////////////////////////////////////////////////

fn deflate(data: &[u8], level: Compression) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), level);
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn lorem() -> Vec<u8> {
    let words = [
        "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed",
        "do", "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna",
        "aliqua",
    ];
    let mut text = String::new();
    let mut state = 17u32;
    for i in 0..8000 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        text.push_str(words[(state >> 16) as usize % words.len()]);
        text.push(if i % 13 == 12 { '\n' } else { ' ' });
    }
    text.into_bytes()
}

fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

fn decode_error(err: anyhow::Error) -> DecodeError {
    *err.downcast_ref::<DecodeError>().expect("DecodeError")
}

fn check_raw(original: &[u8], compressed: &[u8]) -> Trace {
    let (data, trace) = inflate_to_vec(compressed, original.len()).unwrap();
    assert_eq!(data, original);
    assert!(trace.is_contiguous());
    assert_eq!(trace.total_bits(), compressed.len() * 8);
    assert_eq!(trace.produced_bytes(), original);
    trace
}

fn has_btype(trace: &Trace, btype: u8) -> bool {
    trace
        .iter()
        .any(|r| matches!(r, TraceRecord::Btype { value, .. } if *value == btype))
}

////////////////////////////////////////////////////////////////////////////////

#[test]
fn dynamic_blocks() {
    let original = lorem();
    for level in [Compression::fast(), Compression::default(), Compression::best()] {
        let trace = check_raw(&original, &deflate(&original, level));
        assert!(has_btype(&trace, 2));

        for category in [
            CodeLengthCategory::RunLengthTable,
            CodeLengthCategory::Lz77LengthTable,
            CodeLengthCategory::Lz77DistTable,
        ] {
            assert!(trace.iter().any(|r| matches!(
                r,
                TraceRecord::CodeLength { category: c, .. } if *c == category
            )));
        }
        assert!(trace
            .iter()
            .any(|r| matches!(r, TraceRecord::RepeatCodeLength { .. })));
    }
}

#[test]
fn repeat_records_list_their_symbols() {
    let original = lorem();
    let (_, trace) = inflate_to_vec(&deflate(&original, Compression::default()), original.len())
        .unwrap();
    for record in &trace {
        if let TraceRecord::RepeatCodeLength {
            symbol,
            repeat_count,
            affected_symbols,
            category,
            ..
        } = record
        {
            assert!((16..=18).contains(symbol));
            assert_eq!(affected_symbols.len(), *repeat_count as usize);
            assert_eq!(affected_symbols[0].category, *category);
            match symbol {
                16 => assert!((3..=6).contains(repeat_count)),
                17 => assert!((3..=10).contains(repeat_count)),
                _ => assert!((11..=138).contains(repeat_count)),
            }
        }
    }
}

#[test]
fn small_inputs() {
    let inputs: [&[u8]; 4] = [
        b"",
        b"a",
        b"hello hello hello hello",
        b"abababababababababababababababab",
    ];
    for original in inputs {
        let compressed = deflate(original, Compression::default());
        check_raw(original, &compressed);
    }
}

#[test]
fn overlapping_back_reference() {
    let original = vec![b'z'; 300];
    let trace = check_raw(&original, &deflate(&original, Compression::default()));
    let lz77 = trace
        .iter()
        .find_map(|r| match r {
            TraceRecord::Lz77 {
                length_value,
                dist_value,
                produced_bytes,
                ..
            } => Some((*length_value, *dist_value, produced_bytes.clone())),
            _ => None,
        })
        .expect("a back-reference");
    assert_eq!(lz77.1, 1);
    assert_eq!(lz77.2, vec![b'z'; lz77.0 as usize]);
}

#[test]
fn uncompressed_and_incompressible() {
    let original = lorem();
    check_raw(&original, &deflate(&original, Compression::none()));

    let random = noise(100_000);
    check_raw(&random, &deflate(&random, Compression::default()));
}

#[test]
fn lz77_spans_nest() {
    let original = lorem();
    let (_, trace) = inflate_to_vec(&deflate(&original, Compression::best()), original.len())
        .unwrap();
    for record in &trace {
        if let TraceRecord::Lz77 {
            length_value,
            length_code_span,
            length_extra_span,
            dist_value,
            dist_code_span,
            dist_extra_span,
            span,
            produced_bytes,
            ..
        } = record
        {
            assert_eq!(span.index, length_code_span.index);
            assert_eq!(length_code_span.end(), length_extra_span.index);
            assert_eq!(length_extra_span.end(), dist_code_span.index);
            assert_eq!(dist_code_span.end(), dist_extra_span.index);
            assert_eq!(dist_extra_span.end(), span.end());
            assert!((3..=258).contains(length_value));
            assert!((1..=32768).contains(dist_value));
            assert_eq!(produced_bytes.len(), *length_value as usize);
        }
    }
}

#[test]
fn destination_capacity() {
    let original = lorem();
    let compressed = deflate(&original, Compression::default());

    let mut larger = vec![0u8; original.len() + 1024];
    let (data, _) = inflate(&compressed, &mut larger).unwrap();
    assert_eq!(data, original.as_slice());

    let mut smaller = vec![0u8; original.len() - 1];
    assert_eq!(
        decode_error(inflate(&compressed, &mut smaller).unwrap_err()),
        DecodeError::OutputOverflow
    );
}

#[test]
fn truncated_input() {
    let original = lorem();
    let compressed = deflate(&original, Compression::default());
    let err = inflate_to_vec(&compressed[..compressed.len() / 2], original.len()).unwrap_err();
    assert_eq!(decode_error(err), DecodeError::TruncatedStream);
}

////////////////////////////////////////////////////////////////////////////////

#[test]
fn gzip_round_trip() {
    let original = lorem();
    let source = gzip(&original);
    let (data, trace) = gunzip(&source).unwrap();
    assert_eq!(data, original);

    let records = trace.records();
    assert!(matches!(records.first(), Some(TraceRecord::GzipHeader { .. })));
    assert!(matches!(records.last(), Some(TraceRecord::GzipFooter { .. })));
    assert_eq!(records[1].span().index, 80);
    assert!(trace.is_contiguous());
    assert_eq!(trace.total_bits(), source.len() * 8);
    assert_eq!(trace.produced_bytes(), original);
}

#[test]
fn gzip_with_file_name() {
    let original = b"named member\n".repeat(10);
    let mut enc = GzBuilder::new()
        .filename("notes.txt")
        .comment("for the trace")
        .write(Vec::new(), Compression::default());
    enc.write_all(&original).unwrap();
    let source = enc.finish().unwrap();

    let (data, trace) = gunzip(&source).unwrap();
    assert_eq!(data, original);
    match &trace.records()[0] {
        TraceRecord::GzipHeader { span, raw_bytes } => {
            let header_len = 10 + "notes.txt".len() + 1 + "for the trace".len() + 1;
            assert_eq!(raw_bytes.len(), header_len);
            assert_eq!(*span, inflate_trace::BitSpan::new(0, header_len * 8));
        }
        other => panic!("unexpected first record {:?}", other),
    }
    assert!(trace.is_contiguous());

    let mut destination = vec![0u8; original.len()];
    let (data, _) = gunzip_into(&source, &mut destination).unwrap();
    assert_eq!(data, original.as_slice());
}

#[test]
fn decompress_to_writer() {
    let original = lorem();
    let mut output = Vec::new();
    let trace = decompress(gzip(&original).as_slice(), &mut output).unwrap();
    assert_eq!(output, original);
    assert!(!trace.is_empty());
}

#[test]
fn raw_deflate_is_not_gzip() {
    let compressed = deflate(b"hello", Compression::default());
    let mut padded = compressed.clone();
    padded.extend_from_slice(&[0; 16]);
    assert_eq!(
        decode_error(gunzip(&padded).unwrap_err()),
        DecodeError::NotGzip
    );
}
