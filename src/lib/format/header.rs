//! `IndexHeader`: the fixed 512-byte prefix of every index file.
//!
//! Laid out with `byteorder` little-endian primitives rather than `serde`,
//! since this is a fixed binary layout, not a serde-friendly schema.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::{HEADER_SIZE, MAGIC_NUMBER, WRITER_VERSION};
use crate::error::{FqixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub writer_version: u32,
    pub entry_size: u32,
    pub magic_number: u32,
    pub block_interval: u32,
    pub entry_count: i64,
    pub lines_in_indexed_file: i64,
    pub dictionaries_compressed: bool,
}

impl IndexHeader {
    /// Builds the header written at index-creation time, before any entry
    /// counts are known (`entry_count`/`lines_in_indexed_file` start at 0
    /// and are back-patched by `finalize`).
    pub fn new(entry_size: u32, block_interval: u32, dictionaries_compressed: bool) -> Self {
        Self {
            writer_version: WRITER_VERSION,
            entry_size,
            magic_number: MAGIC_NUMBER,
            block_interval,
            entry_count: 0,
            lines_in_indexed_file: 0,
            dictionaries_compressed,
        }
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.write_u32::<LittleEndian>(self.writer_version).unwrap();
        buf.write_u32::<LittleEndian>(self.entry_size).unwrap();
        buf.write_u32::<LittleEndian>(self.magic_number).unwrap();
        buf.write_u32::<LittleEndian>(self.block_interval).unwrap();
        buf.write_i64::<LittleEndian>(self.entry_count).unwrap();
        buf.write_i64::<LittleEndian>(self.lines_in_indexed_file).unwrap();
        buf.write_u8(self.dictionaries_compressed as u8).unwrap();
        buf.resize(HEADER_SIZE, 0);
        writer.write_all(&buf).map_err(FqixError::SinkWrite)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(FqixError::SourceRead)?;
        let mut cursor = &buf[..];
        let writer_version = cursor.read_u32::<LittleEndian>().unwrap();
        let entry_size = cursor.read_u32::<LittleEndian>().unwrap();
        let magic_number = cursor.read_u32::<LittleEndian>().unwrap();
        let block_interval = cursor.read_u32::<LittleEndian>().unwrap();
        let entry_count = cursor.read_i64::<LittleEndian>().unwrap();
        let lines_in_indexed_file = cursor.read_i64::<LittleEndian>().unwrap();
        let dictionaries_compressed = cursor.read_u8().unwrap() != 0;

        if magic_number != MAGIC_NUMBER {
            return Err(FqixError::FormatInvalid(format!(
                "bad magic number 0x{magic_number:08x}, expected 0x{MAGIC_NUMBER:08x}"
            )));
        }
        if writer_version != WRITER_VERSION {
            return Err(FqixError::FormatInvalid(format!(
                "unsupported index writer version {writer_version}"
            )));
        }

        Ok(Self {
            writer_version,
            entry_size,
            magic_number,
            block_interval,
            entry_count,
            lines_in_indexed_file,
            dictionaries_compressed,
        })
    }
}
