//! `IndexWriter`: owns the write-side lifecycle of an index file -- open
//! with exclusive lock, write header, append entries, then seek back and
//! rewrite the header once counts are known.

use crate::error::{FqixError, Result};
use crate::format::{IndexEntry, IndexHeader};
use crate::io::Sink;

pub struct IndexWriter {
    sink: Box<dyn Sink>,
    dictionaries_compressed: bool,
    header_written: bool,
    finalized: bool,
    entry_count: u64,
}

impl IndexWriter {
    pub fn new(sink: Box<dyn Sink>, dictionaries_compressed: bool) -> Self {
        Self { sink, dictionaries_compressed, header_written: false, finalized: false, entry_count: 0 }
    }

    /// Writes the header in its initial form (`entry_count` and
    /// `lines_in_indexed_file` both zero). May be called only once.
    pub fn write_header(&mut self, entry_size: u32, block_interval: u32) -> Result<()> {
        if self.header_written {
            return Err(FqixError::ProtocolMisuse(
                "index header was already written".to_string(),
            ));
        }
        let header = IndexHeader::new(entry_size, block_interval, self.dictionaries_compressed);
        header.write_to(SinkWriteAdapter(self.sink.as_mut()))?;
        self.header_written = true;
        Ok(())
    }

    pub fn write_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        if !self.header_written {
            return Err(FqixError::ProtocolMisuse(
                "cannot write an entry before the header".to_string(),
            ));
        }
        entry.write_to(SinkWriteAdapter(self.sink.as_mut()), self.dictionaries_compressed)?;
        self.entry_count += 1;
        Ok(())
    }

    /// Seeks back to the start and rewrites the header with final counts.
    /// Idempotent after the first call.
    pub fn finalize(&mut self, lines_in_indexed_file: u64, entry_size: u32, block_interval: u32) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.sink.flush()?;
        self.sink.seek(0)?;
        let mut header = IndexHeader::new(entry_size, block_interval, self.dictionaries_compressed);
        header.entry_count = self.entry_count as i64;
        header.lines_in_indexed_file = lines_in_indexed_file as i64;
        header.write_to(SinkWriteAdapter(self.sink.as_mut()))?;
        self.sink.flush()?;
        self.sink.close()?;
        self.finalized = true;
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}

/// Adapts the `Sink` trait (which has no `std::io::Write` blanket impl, to
/// keep it object-safe and lock-aware) to the `std::io::Write` the header
/// and entry codecs expect.
struct SinkWriteAdapter<'a>(&'a mut dyn Sink);

impl std::io::Write for SinkWriteAdapter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .write(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0
            .flush()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::{ENTRY_SIZE_UNCOMPRESSED, WINDOW_SIZE};
    use crate::io::sink::ConsoleSink;

    #[test]
    fn rejects_an_entry_written_before_the_header() {
        let mut writer = IndexWriter::new(Box::new(ConsoleSink::new(Vec::new())), false);
        let entry = IndexEntry::new(0, 0, 0, 0, 0, [0u8; WINDOW_SIZE]);
        let err = writer.write_entry(&entry).unwrap_err();
        assert!(matches!(err, FqixError::ProtocolMisuse(_)));
    }

    #[test]
    fn rejects_writing_the_header_twice() {
        let mut writer = IndexWriter::new(Box::new(ConsoleSink::new(Vec::new())), false);
        writer.write_header(ENTRY_SIZE_UNCOMPRESSED as u32, 2048).unwrap();
        let err = writer.write_header(ENTRY_SIZE_UNCOMPRESSED as u32, 2048).unwrap_err();
        assert!(matches!(err, FqixError::ProtocolMisuse(_)));
    }
}
