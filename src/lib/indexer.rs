//! `Indexer`: drives the framing observer over a compressed `Source`, turns
//! each block boundary into a candidate `IndexEntry`, and asks a
//! `StorageDecisionPolicy` whether to keep it.

use log::{debug, info};

use crate::constants::{CHUNK_SIZE, ENTRY_SIZE_UNCOMPRESSED, WINDOW_SIZE};
use crate::deflate::{FramingObserver, Flush, ObserverMode};
use crate::diagnostics::Diagnostics;
use crate::error::{FqixError, Result};
use crate::format::IndexEntry;
use crate::io::{Sink, Source};
use crate::policy::StorageDecisionPolicy;
use crate::writer::IndexWriter;

pub struct IndexSummary {
    pub entry_count: u64,
    pub lines_in_indexed_file: u64,
    pub concatenated_parts: u32,
    pub diagnostics: Diagnostics,
}

pub struct Indexer {
    source: Box<dyn Source>,
    writer: IndexWriter,
    policy: Box<dyn StorageDecisionPolicy>,
    dictionaries_compressed: bool,
    block_interval_hint: u32,
    started: bool,
    /// Optional pass-through sink the decompressed FASTQ bytes are teed to
    /// while indexing, so a caller can rebuild the plain file in one pass
    /// instead of piping the compressed source through a second decoder.
    echo_sink: Option<Box<dyn Sink>>,
}

/// State carried from one detected block boundary to the next, one boundary
/// delayed, so that the entry built *at* boundary N describes the block
/// that ended at boundary N-1.
struct BoundaryState {
    is_first_boundary: bool,
    pending_offset: u64,
    pending_bits: u8,
    pending_dictionary: [u8; WINDOW_SIZE],
    last_block_ended_with_newline: bool,
    block_index: u64,
    starting_line: u64,
    last_stored_offset: Option<u64>,
}

impl BoundaryState {
    fn new() -> Self {
        Self {
            is_first_boundary: true,
            pending_offset: 0,
            pending_bits: 0,
            pending_dictionary: [0u8; WINDOW_SIZE],
            last_block_ended_with_newline: true,
            block_index: 0,
            starting_line: 0,
            last_stored_offset: None,
        }
    }

    /// Resets the per-member fields a freshly reinitialized concatenated
    /// gzip member needs, while leaving `pending_offset`/`starting_line`
    /// (which are absolute across the whole source) untouched.
    fn reset_for_next_member(&mut self) {
        self.is_first_boundary = true;
        self.pending_bits = 0;
        self.pending_dictionary = [0u8; WINDOW_SIZE];
        self.last_block_ended_with_newline = true;
    }
}

impl Indexer {
    pub fn new(
        source: Box<dyn Source>,
        writer: IndexWriter,
        policy: Box<dyn StorageDecisionPolicy>,
        dictionaries_compressed: bool,
        block_interval_hint: u32,
    ) -> Self {
        Self {
            source,
            writer,
            policy,
            dictionaries_compressed,
            block_interval_hint,
            started: false,
            echo_sink: None,
        }
    }

    /// Tees every decompressed byte to `sink` as it's produced, so indexing
    /// can simultaneously reconstruct the plain (uncompressed) FASTQ file in
    /// one pass over the compressed source.
    pub fn with_echo_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.echo_sink = Some(sink);
        self
    }

    /// Runs the full indexing pass. May be called at most once per
    /// instance; a second call fails with `AlreadyStarted`.
    pub fn create_index(&mut self) -> Result<IndexSummary> {
        if self.started {
            return Err(FqixError::AlreadyStarted);
        }
        self.started = true;
        info!("starting index creation");

        let mut diagnostics = Diagnostics::default();
        self.source.open()?;
        self.writer.write_header(ENTRY_SIZE_UNCOMPRESSED as u32, self.block_interval_hint)?;

        let mut state = BoundaryState::new();
        let mut observer = FramingObserver::new(ObserverMode::AutoDetect)?;
        let mut current_block: Vec<u8> = Vec::new();
        let mut total_bytes_in: u64 = 0;
        let mut concatenated_parts: u32 = 1;

        let mut in_buf = vec![0u8; CHUNK_SIZE];
        let mut out_buf = vec![0u8; CHUNK_SIZE];

        'outer: loop {
            if !self.source.can_read() {
                break;
            }
            let n = self.source.read(&mut in_buf)?;
            if n == 0 {
                break;
            }

            let mut consumed = 0usize;
            let mut stream_ended = false;
            while consumed < n {
                let outcome = observer.step(&in_buf[consumed..n], &mut out_buf, Flush::Block)?;
                consumed += outcome.consumed_in;
                total_bytes_in += outcome.consumed_in as u64;
                current_block.extend_from_slice(&out_buf[..outcome.produced_out]);
                if let Some(echo) = &mut self.echo_sink {
                    echo.write(&out_buf[..outcome.produced_out])?;
                }

                if outcome.at_block_end || outcome.at_stream_end {
                    self.finalize_block(
                        &mut state,
                        &mut observer,
                        &current_block,
                        total_bytes_in,
                        outcome.bits,
                        &mut diagnostics,
                    )?;
                    current_block.clear();
                }

                if outcome.at_stream_end {
                    stream_ended = true;
                    break;
                }
                if outcome.consumed_in == 0 && outcome.produced_out == 0 {
                    return Err(FqixError::CorruptSource(
                        "inflate made no progress on a non-empty input buffer".to_string(),
                    ));
                }
            }

            if stream_ended {
                self.source.seek(total_bytes_in)?;
                if !self.source.can_read() {
                    break 'outer;
                }
                observer = FramingObserver::new(ObserverMode::AutoDetect)?;
                state.reset_for_next_member();
                concatenated_parts += 1;
                debug!("continuing into concatenated gzip member #{concatenated_parts}");
            }
        }

        self.source.close()?;
        if let Some(echo) = &mut self.echo_sink {
            echo.flush()?;
            echo.close()?;
        }
        self.writer.finalize(state.starting_line, ENTRY_SIZE_UNCOMPRESSED as u32, self.block_interval_hint)?;

        info!(
            "finished indexing: {} entries, {} lines, {} concatenated part(s)",
            self.writer.entry_count(),
            state.starting_line,
            concatenated_parts
        );

        Ok(IndexSummary {
            entry_count: self.writer.entry_count(),
            lines_in_indexed_file: state.starting_line,
            concatenated_parts,
            diagnostics,
        })
    }

    /// Builds the candidate entry for the block that just ended, advances
    /// the boundary state for the next one, and asks the storage policy
    /// whether to keep it.
    fn finalize_block(
        &mut self,
        state: &mut BoundaryState,
        observer: &mut FramingObserver,
        block_bytes: &[u8],
        total_bytes_in_now: u64,
        bits_at_this_boundary: u8,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let entry_block_offset = state.pending_offset;
        state.pending_offset = total_bytes_in_now;

        if state.is_first_boundary {
            state.is_first_boundary = false;
            if !block_bytes.is_empty() {
                diagnostics.push(
                    "first decompressed block was non-empty; gzip header framing may be unusual"
                        .to_string(),
                );
            }
            return Ok(());
        }

        let block_is_empty = block_bytes.is_empty();
        let newline_count = count_newlines(block_bytes);
        let current_block_ended_with_newline = if block_is_empty {
            state.last_block_ended_with_newline
        } else {
            *block_bytes.last().unwrap() == b'\n'
        };

        let mut lines_in_block: i64 = newline_count as i64;
        let mut first_line_offset: u32 = 0;
        if !block_is_empty && !state.last_block_ended_with_newline {
            if newline_count > 0 {
                lines_in_block -= 1;
                let first_newline = block_bytes.iter().position(|&b| b == b'\n').unwrap();
                first_line_offset = (first_newline + 1) as u32;
            } else {
                lines_in_block = 0;
            }
        }

        let entry_bits = state.pending_bits;
        let entry_dictionary = state.pending_dictionary;
        let block_index = state.block_index;
        state.block_index += 1;
        let starting_line = state.starting_line;
        state.starting_line = state.starting_line.wrapping_add(lines_in_block as u64);

        let candidate = IndexEntry::new(
            block_index,
            entry_block_offset,
            starting_line,
            first_line_offset,
            entry_bits,
            entry_dictionary,
        );

        state.pending_bits = bits_at_this_boundary;
        state.pending_dictionary = observer.dictionary()?;
        state.last_block_ended_with_newline = current_block_ended_with_newline;

        if self.policy.should_store(block_index, entry_block_offset, state.last_stored_offset, block_is_empty) {
            self.writer.write_entry(&candidate)?;
            state.last_stored_offset = Some(entry_block_offset);
        }

        Ok(())
    }
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::sink::ConsoleSink;
    use crate::io::source::StreamSource;
    use crate::policy::BlockDistanceStrategy;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn indexes_a_small_gzip_stream_and_counts_all_lines() {
        let payload: Vec<u8> = (0..4000).map(|i| format!("line{i}\n")).collect::<String>().into_bytes();
        let compressed = gzip_bytes(&payload);

        let source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "test"));
        let sink_buffer: Vec<u8> = Vec::new();
        let writer = IndexWriter::new(Box::new(ConsoleSink::new(sink_buffer)), false);
        let policy = Box::new(BlockDistanceStrategy::new(1));
        let mut indexer = Indexer::new(source, writer, policy, false, 1);

        let summary = indexer.create_index().unwrap();
        assert_eq!(summary.lines_in_indexed_file, 4000);
        assert_eq!(summary.concatenated_parts, 1);
    }

    /// A `Sink` over a shared buffer, used to read back what the indexer's
    /// echo sink received after `create_index` has taken ownership of it.
    #[derive(Clone, Default)]
    struct SharedBufferSink(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl SharedBufferSink {
        fn bytes(&self) -> Vec<u8> {
            self.0.borrow().clone()
        }
    }

    impl crate::io::Sink for SharedBufferSink {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn write(&mut self, bytes: &[u8]) -> Result<()> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
        fn flush(&mut self) -> Result<()> {
            Ok(())
        }
        fn tell(&mut self) -> Result<u64> {
            Ok(self.0.borrow().len() as u64)
        }
    }

    #[test]
    fn echo_sink_receives_the_full_decompressed_stream() {
        let payload: Vec<u8> = (0..500).map(|i| format!("line{i}\n")).collect::<String>().into_bytes();
        let compressed = gzip_bytes(&payload);

        let source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "test"));
        let writer = IndexWriter::new(Box::new(ConsoleSink::new(Vec::new())), false);
        let policy = Box::new(BlockDistanceStrategy::new(1));

        let echo = SharedBufferSink::default();
        let mut indexer =
            Indexer::new(source, writer, policy, false, 1).with_echo_sink(Box::new(echo.clone()));
        indexer.create_index().unwrap();

        assert_eq!(echo.bytes(), payload);
    }

    #[test]
    fn second_call_to_create_index_fails() {
        let compressed = gzip_bytes(b"a\nb\nc\n");
        let source = Box::new(StreamSource::new(std::io::Cursor::new(compressed), "test"));
        let writer = IndexWriter::new(Box::new(ConsoleSink::new(Vec::new())), false);
        let policy = Box::new(BlockDistanceStrategy::new(1));
        let mut indexer = Indexer::new(source, writer, policy, false, 1);

        indexer.create_index().unwrap();
        let err = indexer.create_index().unwrap_err();
        assert!(matches!(err, FqixError::AlreadyStarted));
    }
}
