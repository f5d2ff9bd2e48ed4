//! `Extractor`: given a line range or a segmentation request, locates the
//! nearest prior resume point, primes a raw-DEFLATE decoder with its
//! dictionary and sub-byte bit offset, and streams out the requested lines.

use log::info;

use crate::constants::{CHUNK_SIZE, DEFAULT_RECORD_SIZE, WINDOW_SIZE};
use crate::deflate::{FramingObserver, Flush, ObserverMode};
use crate::error::{FqixError, Result};
use crate::format::IndexEntry;
use crate::io::{Sink, Source};
use crate::reader::IndexReader;

/// Bytes to skip after a stream end to reach the next concatenated gzip
/// member: the 8-byte trailer of the current member plus the 10-byte
/// minimal header of the next.
const CONCATENATED_PART_GAP: u64 = 8 + 10;

#[derive(Debug, Clone, Copy)]
pub enum ExtractRequest {
    Lines { start_line: u64, line_count: u64 },
    Segment { segment_index: u64, segment_count: u64, record_size: u64 },
}

pub struct ExtractSummary {
    pub lines_written: u64,
    pub concatenated_parts: u32,
}

pub struct Extractor {
    fastq_source: Box<dyn Source>,
    index_source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    request: ExtractRequest,
    /// When set, emitted lines are buffered in memory and trimmed to exactly
    /// `line_count` before being written out, rather than streamed as they
    /// are produced. Useful to double-check exact-count behavior against a
    /// reference, at the cost of holding the whole extraction in memory.
    debug_buffering: bool,
}

/// Destination for emitted lines: either written straight through to the
/// sink, or accumulated for the debug-buffering mode's end-of-run truncation.
enum LineOutput<'a> {
    Direct(&'a mut dyn Sink),
    Buffered(&'a mut Vec<Vec<u8>>),
}

impl LineOutput<'_> {
    fn emit(&mut self, line: &[u8]) -> Result<()> {
        match self {
            LineOutput::Direct(sink) => write_line(&mut **sink, line),
            LineOutput::Buffered(buffer) => {
                buffer.push(line.to_vec());
                Ok(())
            }
        }
    }
}

impl Extractor {
    pub fn new(
        fastq_source: Box<dyn Source>,
        index_source: Box<dyn Source>,
        sink: Box<dyn Sink>,
        request: ExtractRequest,
    ) -> Self {
        Self { fastq_source, index_source, sink, request, debug_buffering: false }
    }

    /// Enables the spec's debug-buffering output mode: lines are held in
    /// memory and truncated to exactly `line_count` before being flushed to
    /// the sink, instead of being streamed out as they're produced.
    pub fn with_debug_buffering(mut self, debug_buffering: bool) -> Self {
        self.debug_buffering = debug_buffering;
        self
    }

    pub fn extract(mut self) -> Result<ExtractSummary> {
        let mut index_reader = IndexReader::open(self.index_source)?;
        let total_lines = index_reader.header().lines_in_indexed_file.max(0) as u64;

        let (start_line, line_count) = resolve_request(self.request, total_lines)?;
        if line_count == 0 {
            return Err(FqixError::BadRequest(
                "extraction line count must be positive".to_string(),
            ));
        }

        let entry = select_entry(&mut index_reader, start_line)?;
        info!(
            "extracting {line_count} line(s) starting at line {start_line} from block #{}",
            entry.block_index
        );

        self.fastq_source.open()?;
        let mut observer = FramingObserver::new(ObserverMode::Raw)?;
        let mut total_bytes_in = prime_decoder(&mut *self.fastq_source, &mut observer, &entry)?;
        observer.set_dictionary(&entry.dictionary_array())?;

        let mut skip: i64 = (start_line - entry.starting_line) as i64;
        let mut extracted: u64 = 0;
        let mut first_pass = true;
        let mut incomplete_last_line: Vec<u8> = Vec::new();
        let mut concatenated_parts: u32 = 1;

        let mut in_buf = vec![0u8; CHUNK_SIZE];
        let mut out_buf = vec![0u8; WINDOW_SIZE];
        let mut debug_lines: Vec<Vec<u8>> = Vec::new();

        'outer: loop {
            if !self.fastq_source.can_read() {
                break;
            }
            let n = self.fastq_source.read(&mut in_buf)?;
            if n == 0 {
                break;
            }

            let mut consumed = 0usize;
            let mut stream_ended = false;
            while consumed < n && extracted < line_count {
                let outcome = observer.step(&in_buf[consumed..n], &mut out_buf, Flush::None)?;
                consumed += outcome.consumed_in;
                total_bytes_in += outcome.consumed_in as u64;

                if outcome.produced_out > 0 {
                    let mut output = if self.debug_buffering {
                        LineOutput::Buffered(&mut debug_lines)
                    } else {
                        LineOutput::Direct(self.sink.as_mut())
                    };
                    process_chunk(
                        &out_buf[..outcome.produced_out],
                        &mut first_pass,
                        entry.first_line_offset,
                        &mut incomplete_last_line,
                        &mut skip,
                        &mut extracted,
                        line_count,
                        &mut output,
                    )?;
                }

                if outcome.at_stream_end {
                    stream_ended = true;
                    break;
                }
            }

            if extracted >= line_count {
                break 'outer;
            }

            if stream_ended {
                total_bytes_in += CONCATENATED_PART_GAP;
                self.fastq_source.seek(total_bytes_in)?;
                if !self.fastq_source.can_read() {
                    break 'outer;
                }
                observer = FramingObserver::new(ObserverMode::Raw)?;
                observer.set_dictionary(&[0u8; WINDOW_SIZE])?;
                first_pass = true;
                concatenated_parts += 1;
            }
        }

        if self.debug_buffering {
            debug_lines.truncate(line_count as usize);
            for line in &debug_lines {
                write_line(self.sink.as_mut(), line)?;
            }
            extracted = debug_lines.len() as u64;
        }

        self.sink.flush()?;
        self.sink.close()?;
        self.fastq_source.close()?;
        index_reader.close()?;

        Ok(ExtractSummary { lines_written: extracted, concatenated_parts })
    }
}

/// Seeks the compressed source to the resume point and, if the boundary
/// fell mid-byte, primes the decoder with the leftover bits. Returns the
/// absolute compressed-byte position the source now sits at.
fn prime_decoder(
    source: &mut dyn Source,
    observer: &mut FramingObserver,
    entry: &IndexEntry,
) -> Result<u64> {
    let seek_to = if entry.bits > 0 { entry.block_offset_raw - 1 } else { entry.block_offset_raw };
    source.seek(seek_to)?;

    if entry.bits > 0 {
        let byte = source.read_char()?;
        if byte < 0 {
            return Err(FqixError::SourceRead(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "expected one more byte to prime the decoder",
            )));
        }
        observer.prime(entry.bits, byte as u8)?;
        Ok(seek_to + 1)
    } else {
        Ok(seek_to)
    }
}

fn resolve_request(request: ExtractRequest, total_lines: u64) -> Result<(u64, u64)> {
    match request {
        ExtractRequest::Lines { start_line, line_count } => Ok((start_line, line_count)),
        ExtractRequest::Segment { segment_index, segment_count, record_size } => {
            let record_size = if record_size == 0 { DEFAULT_RECORD_SIZE } else { record_size };
            if segment_count == 0 || segment_index >= segment_count {
                return Err(FqixError::BadRequest(format!(
                    "segment {segment_index} exceeds segment count {segment_count}"
                )));
            }
            if total_lines % record_size != 0 {
                return Err(FqixError::BadRequest(format!(
                    "total line count {total_lines} is not a multiple of record size {record_size}"
                )));
            }
            let total_records = total_lines / record_size;
            let records_per_segment = total_records / segment_count;
            let leftover_records = total_records % segment_count;

            let mut line_count = records_per_segment * record_size;
            let start_line = segment_index * line_count;
            if segment_index == segment_count - 1 {
                line_count = (records_per_segment + leftover_records) * record_size;
            }
            Ok((start_line, line_count))
        }
    }
}

/// Picks the last entry whose `starting_line <= start_line`, scanning the
/// index reader forward without buffering the whole file in memory.
fn select_entry(reader: &mut IndexReader, start_line: u64) -> Result<IndexEntry> {
    let mut selected = reader
        .next_entry()?
        .ok_or_else(|| FqixError::FormatInvalid("index contains no entries".to_string()))?;
    while let Some(candidate) = reader.next_entry()? {
        if candidate.starting_line > start_line {
            break;
        }
        selected = candidate;
    }
    Ok(selected)
}

fn split_lines(data: &[u8]) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<Vec<u8>> = data.split(|&b| b == b'\n').map(|s| s.to_vec()).collect();
    if data.last() == Some(&b'\n') {
        lines.pop();
    }
    lines
}

#[allow(clippy::too_many_arguments)]
fn process_chunk(
    chunk: &[u8],
    first_pass: &mut bool,
    entry_first_line_offset: u32,
    incomplete_last_line: &mut Vec<u8>,
    skip: &mut i64,
    extracted: &mut u64,
    line_count: u64,
    output: &mut LineOutput<'_>,
) -> Result<()> {
    if *extracted >= line_count {
        return Ok(());
    }

    let mut lines = split_lines(chunk);

    let remove_incomplete_first_line = *first_pass && entry_first_line_offset > 0;
    if remove_incomplete_first_line && !lines.is_empty() {
        lines.remove(0);
    }
    *first_pass = false;

    let ends_with_newline = chunk.last() == Some(&b'\n');
    let mut current_tail: Vec<u8> = Vec::new();
    if !ends_with_newline {
        if let Some(last) = lines.pop() {
            current_tail = last;
        }
    }

    if lines.is_empty() {
        incomplete_last_line.extend_from_slice(&current_tail);
        return Ok(());
    }

    if *skip < lines.len() as i64 {
        let mut i = *skip as usize;
        if i == 0 {
            let mut joined = std::mem::take(incomplete_last_line);
            joined.extend_from_slice(&lines[0]);
            output.emit(&joined)?;
            *extracted += 1;
            i = 1;
        }
        while i < lines.len() && *extracted < line_count {
            output.emit(&lines[i])?;
            *extracted += 1;
            i += 1;
        }
    }

    *incomplete_last_line = current_tail;
    if *skip > 0 {
        *skip -= (*skip).min(lines.len() as i64);
    }

    Ok(())
}

fn write_line(sink: &mut dyn Sink, line: &[u8]) -> Result<()> {
    sink.write(line)?;
    sink.write(b"\n")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::format::IndexHeader;
    use crate::io::source::StreamSource;
    use crate::writer::IndexWriter;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn build_payload(lines: u64) -> Vec<u8> {
        (0..lines).map(|i| format!("read-{i}\n")).collect::<String>().into_bytes()
    }

    /// A `Sink` over a shared, reference-counted byte buffer with a cursor,
    /// emulating a real file's overwrite-in-place semantics (needed by
    /// `IndexWriter::finalize`'s seek-back-and-rewrite-the-header pass) so a
    /// test can keep reading the bytes written through it after handing the
    /// `Box<dyn Sink>` off to a writer/indexer that otherwise takes
    /// ownership.
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

    /// Builds an in-memory gzip file and index together, then extracts a
    /// middle range and checks it matches the source lines exactly.
    #[test]
    fn extracts_a_middle_range_identical_to_the_source_lines() {
        let payload = build_payload(4000);
        let compressed = gzip_bytes(&payload);

        let index_source = Box::new(StreamSource::new(std::io::Cursor::new(compressed.clone()), "fastq"));
        let index_sink = SharedSink::default();
        let writer = IndexWriter::new(Box::new(index_sink.clone()), false);
        let policy = Box::new(crate::policy::BlockDistanceStrategy::new(1));
        let mut indexer = crate::indexer::Indexer::new(index_source, writer, policy, false, 1);
        indexer.create_index().unwrap();
        let captured = index_sink.bytes();

        let index_reader_check = IndexHeader::read_from(&captured[..512]).unwrap();
        assert_eq!(index_reader_check.lines_in_indexed_file, 4000);

        let fastq_source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "fastq"));
        let index_source = Box::new(StreamSource::new(std::io::Cursor::new(captured), "idx"));
        let output_sink = SharedSink::default();

        let extractor = Extractor::new(
            fastq_source,
            index_source,
            Box::new(output_sink.clone()),
            ExtractRequest::Lines { start_line: 2740, line_count: 2000 },
        );
        let summary = extractor.extract().unwrap();
        assert_eq!(summary.lines_written, 2000);

        let expected: Vec<u8> =
            (2740..4000).map(|i| format!("read-{i}\n")).collect::<String>().into_bytes();
        assert_eq!(output_sink.bytes(), expected);
    }

    #[test]
    fn debug_buffering_mode_trims_to_exactly_line_count_and_matches_direct_output() {
        let payload = build_payload(4000);
        let compressed = gzip_bytes(&payload);

        let index_source = Box::new(StreamSource::new(std::io::Cursor::new(compressed.clone()), "fastq"));
        let index_sink = SharedSink::default();
        let writer = IndexWriter::new(Box::new(index_sink.clone()), false);
        let policy = Box::new(crate::policy::BlockDistanceStrategy::new(1));
        let mut indexer = crate::indexer::Indexer::new(index_source, writer, policy, false, 1);
        indexer.create_index().unwrap();
        let captured = index_sink.bytes();

        let fastq_source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "fastq"));
        let index_source = Box::new(StreamSource::new(std::io::Cursor::new(captured), "idx"));
        let output_sink = SharedSink::default();

        let extractor = Extractor::new(
            fastq_source,
            index_source,
            Box::new(output_sink.clone()),
            ExtractRequest::Lines { start_line: 2740, line_count: 2000 },
        )
        .with_debug_buffering(true);
        let summary = extractor.extract().unwrap();
        assert_eq!(summary.lines_written, 2000);

        let expected: Vec<u8> =
            (2740..4000).map(|i| format!("read-{i}\n")).collect::<String>().into_bytes();
        assert_eq!(output_sink.bytes(), expected);
    }

    #[test]
    fn non_last_segment_uses_the_base_records_per_segment() {
        let (start, count) = resolve_request(
            ExtractRequest::Segment { segment_index: 1, segment_count: 3, record_size: 4 },
            4000,
        )
        .unwrap();
        assert_eq!((start, count), (1332, 1332));
    }

    #[test]
    fn last_segment_absorbs_the_leftover_records() {
        let (start, count) = resolve_request(
            ExtractRequest::Segment { segment_index: 2, segment_count: 3, record_size: 4 },
            4000,
        )
        .unwrap();
        assert_eq!((start, count), (2664, 1336));
        assert_eq!(start + count, 4000);
    }

    #[test]
    fn rejects_a_segment_index_past_the_segment_count() {
        let err = resolve_request(
            ExtractRequest::Segment { segment_index: 3, segment_count: 3, record_size: 4 },
            4000,
        );
        assert!(matches!(err, Err(FqixError::BadRequest(_))));
    }
}
