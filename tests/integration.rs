//! End-to-end coverage for the properties spec.md §8 calls out explicitly:
//! concatenation transparency and segmentation completeness. The narrower
//! per-module invariants (round-trip laws, single-range extraction) live
//! alongside their implementations in `src/lib/*.rs`.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use flate2::write::GzEncoder;
use flate2::Compression;

use fastqindex_lib::error::Result;
use fastqindex_lib::extractor::{ExtractRequest, Extractor};
use fastqindex_lib::format::IndexHeader;
use fastqindex_lib::indexer::Indexer;
use fastqindex_lib::io::source::StreamSource;
use fastqindex_lib::io::Sink;
use fastqindex_lib::policy::BlockDistanceStrategy;
use fastqindex_lib::writer::IndexWriter;

/// A `Sink` over a shared, reference-counted byte buffer with a cursor,
/// emulating a real file's overwrite-in-place semantics (needed by
/// `IndexWriter::finalize`'s seek-back-and-rewrite-the-header pass). Needed
/// because `IndexWriter`/`Extractor` take ownership of a `Box<dyn Sink>`,
/// but these tests still need to read the bytes back out afterward.
#[derive(Default)]
struct SinkState {
    buf: Vec<u8>,
    pos: usize,
}

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<SinkState>>);

impl SharedSink {
    fn bytes(&self) -> Vec<u8> {
        self.0.borrow().buf.clone()
    }
}

impl Sink for SharedSink {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.0.borrow_mut();
        let end = state.pos + bytes.len();
        if state.buf.len() < end {
            state.buf.resize(end, 0);
        }
        let pos = state.pos;
        state.buf[pos..end].copy_from_slice(bytes);
        state.pos = end;
        Ok(())
    }
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.0.borrow_mut().pos = offset as usize;
        Ok(())
    }
    fn tell(&mut self) -> Result<u64> {
        Ok(self.0.borrow().pos as u64)
    }
}

fn gzip_member(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn fastq_payload(lines: u64) -> Vec<u8> {
    (0..lines).map(|i| format!("read-{i}\n")).collect::<String>().into_bytes()
}

fn build_index(compressed: &[u8], block_interval: u64) -> Vec<u8> {
    let source = Box::new(StreamSource::new(std::io::Cursor::new(compressed.to_vec()), "fastq"));
    let sink = SharedSink::default();
    let writer = IndexWriter::new(Box::new(sink.clone()), false);
    let policy = Box::new(BlockDistanceStrategy::new(block_interval));
    let mut indexer = Indexer::new(source, writer, policy, false, block_interval as u32);
    indexer.create_index().unwrap();
    sink.bytes()
}

#[test]
fn concatenated_gzip_members_index_and_extract_as_one_logical_stream() {
    let copy = fastq_payload(4000);
    let mut concatenated = Vec::new();
    for _ in 0..4 {
        concatenated.extend_from_slice(&gzip_member(&copy));
    }

    let index_bytes = build_index(&concatenated, 1);
    let header = IndexHeader::read_from(&index_bytes[..512]).unwrap();
    assert_eq!(header.lines_in_indexed_file, 16_000);

    // Line 10000 is 2000 lines into the third copy (10000 - 2*4000).
    let fastq_source = Box::new(StreamSource::new(std::io::Cursor::new(concatenated), "fastq"));
    let index_source = Box::new(StreamSource::new(std::io::Cursor::new(index_bytes), "idx"));
    let output = SharedSink::default();
    let extractor = Extractor::new(
        fastq_source,
        index_source,
        Box::new(output.clone()),
        ExtractRequest::Lines { start_line: 10_000, line_count: 2000 },
    );
    let summary = extractor.extract().unwrap();
    assert_eq!(summary.lines_written, 2000);

    let expected: Vec<u8> =
        (2000..4000).map(|i| format!("read-{i}\n")).collect::<String>().into_bytes();
    assert_eq!(output.bytes(), expected);
}

#[test]
fn extracting_every_segment_and_concatenating_reproduces_the_whole_file() {
    let payload = fastq_payload(4000);
    let compressed = gzip_member(&payload);
    let index_bytes = build_index(&compressed, 2);

    const SEGMENT_COUNT: u64 = 5;
    let mut reassembled = Vec::new();
    for segment_index in 0..SEGMENT_COUNT {
        let fastq_source =
            Box::new(StreamSource::new(std::io::Cursor::new(compressed.clone()), "fastq"));
        let index_source =
            Box::new(StreamSource::new(std::io::Cursor::new(index_bytes.clone()), "idx"));
        let output = SharedSink::default();
        let extractor = Extractor::new(
            fastq_source,
            index_source,
            Box::new(output.clone()),
            ExtractRequest::Segment {
                segment_index,
                segment_count: SEGMENT_COUNT,
                record_size: 4,
            },
        );
        extractor.extract().unwrap();
        reassembled.extend(output.bytes());
    }

    assert_eq!(reassembled, payload);
}

#[test]
fn requesting_lines_past_eof_yields_an_empty_extraction_without_error() {
    let payload = fastq_payload(100);
    let compressed = gzip_member(&payload);
    let index_bytes = build_index(&compressed, 1);

    let fastq_source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "fastq"));
    let index_source = Box::new(StreamSource::new(std::io::Cursor::new(index_bytes), "idx"));
    let output = SharedSink::default();
    let extractor = Extractor::new(
        fastq_source,
        index_source,
        Box::new(output.clone()),
        ExtractRequest::Lines { start_line: 200, line_count: 10 },
    );
    let summary = extractor.extract().unwrap();
    assert_eq!(summary.lines_written, 0);
    assert!(output.bytes().is_empty());
}
