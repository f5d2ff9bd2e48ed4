//! `IndexReader`: opens an index with a shared read lock, validates the
//! header, and streams entries on demand.

use crate::constants::{ENTRY_SIZE_UNCOMPRESSED, HEADER_SIZE};
use crate::error::{FqixError, Result};
use crate::format::{IndexEntry, IndexHeader};
use crate::io::Source;

pub struct IndexReader {
    source: Box<dyn Source>,
    header: IndexHeader,
    entries_remaining: u64,
    opened: bool,
}

impl IndexReader {
    /// Opens `source`, reads and validates the header, and derives the
    /// entry count either from the header or from file-size arithmetic.
    pub fn open(mut source: Box<dyn Source>) -> Result<Self> {
        source.open()?;
        let file_size = source.size();
        if let Some(size) = file_size {
            if size < HEADER_SIZE as u64 {
                return Err(FqixError::FormatInvalid(format!(
                    "index file is only {size} bytes, smaller than the {HEADER_SIZE}-byte header"
                )));
            }
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        let mut adapter = SourceReadAdapter(source.as_mut());
        std::io::Read::read_exact(&mut adapter, &mut header_buf)
            .map_err(FqixError::SourceRead)?;
        let header = IndexHeader::read_from(&header_buf[..])?;

        if !header.dictionaries_compressed {
            if let Some(size) = file_size {
                let body = size - HEADER_SIZE as u64;
                if body % ENTRY_SIZE_UNCOMPRESSED as u64 != 0 {
                    return Err(FqixError::FormatInvalid(format!(
                        "index body size {body} is not a multiple of the {ENTRY_SIZE_UNCOMPRESSED}-byte entry size"
                    )));
                }
            }
        }

        let entries_remaining = if header.entry_count > 0 {
            header.entry_count as u64
        } else if let Some(size) = file_size {
            if header.dictionaries_compressed {
                0
            } else {
                (size - HEADER_SIZE as u64) / ENTRY_SIZE_UNCOMPRESSED as u64
            }
        } else {
            0
        };

        Ok(Self { source, header, entries_remaining, opened: true })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn entries_remaining(&self) -> u64 {
        self.entries_remaining
    }

    /// Reads the next entry, or `None` once `entries_remaining` hits 0.
    pub fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        if !self.opened {
            return Err(FqixError::ProtocolMisuse("reader was not opened".to_string()));
        }
        if self.entries_remaining == 0 {
            return Ok(None);
        }
        let mut adapter = SourceReadAdapter(self.source.as_mut());
        let entry = IndexEntry::read_from(&mut adapter, self.header.dictionaries_compressed)?;
        self.entries_remaining -= 1;
        Ok(Some(entry))
    }

    pub fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.source.close()
    }
}

/// Adapts `Source` to `std::io::Read` for the fixed-layout codecs in
/// `format/`.
struct SourceReadAdapter<'a>(&'a mut dyn Source);

impl std::io::Read for SourceReadAdapter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0
            .read(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}
