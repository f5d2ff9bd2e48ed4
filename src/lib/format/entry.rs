//! `IndexEntry`: one resume point. The 32-byte fixed prefix is always
//! present; the dictionary that follows is either the full 32,768 raw
//! bytes or a zlib-compressed run of `compressed_dict_size` bytes.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::constants::{ENTRY_PREFIX_SIZE, WINDOW_SIZE};
use crate::error::{FqixError, Result};

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub block_index: u64,
    pub block_offset_raw: u64,
    pub starting_line: u64,
    pub first_line_offset: u32,
    pub bits: u8,
    /// Always exactly 32,768 bytes: the uncompressed sliding window.
    pub dictionary: Vec<u8>,
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.block_index == other.block_index
            && self.block_offset_raw == other.block_offset_raw
            && self.starting_line == other.starting_line
            && self.first_line_offset == other.first_line_offset
            && self.bits == other.bits
            && self.dictionary == other.dictionary
    }
}

impl IndexEntry {
    pub fn new(
        block_index: u64,
        block_offset_raw: u64,
        starting_line: u64,
        first_line_offset: u32,
        bits: u8,
        dictionary: [u8; WINDOW_SIZE],
    ) -> Self {
        debug_assert!(bits < 8);
        Self {
            block_index,
            block_offset_raw,
            starting_line,
            first_line_offset,
            bits,
            dictionary: dictionary.to_vec(),
        }
    }

    /// Writes this entry's on-disk representation. When
    /// `dictionaries_compressed` is false the dictionary is written
    /// verbatim (32,768 bytes); otherwise it's zlib-compressed first
    /// (level 9) and only the compressed run is written.
    pub fn write_to<W: Write>(&self, mut writer: W, dictionaries_compressed: bool) -> Result<()> {
        debug_assert_eq!(self.dictionary.len(), WINDOW_SIZE);

        let compressed = if dictionaries_compressed {
            Some(compress_dictionary(&self.dictionary)?)
        } else {
            None
        };
        let compressed_dict_size = compressed.as_ref().map_or(0, Vec::len) as u16;

        let mut prefix = Vec::with_capacity(ENTRY_PREFIX_SIZE);
        prefix.write_u64::<LittleEndian>(self.block_index).unwrap();
        prefix.write_u64::<LittleEndian>(self.block_offset_raw).unwrap();
        prefix.write_u64::<LittleEndian>(self.starting_line).unwrap();
        prefix.write_u32::<LittleEndian>(self.first_line_offset).unwrap();
        prefix.write_u8(self.bits).unwrap();
        prefix.write_u8(0).unwrap();
        prefix.write_u16::<LittleEndian>(compressed_dict_size).unwrap();
        debug_assert_eq!(prefix.len(), ENTRY_PREFIX_SIZE);

        writer.write_all(&prefix).map_err(FqixError::SinkWrite)?;
        match compressed {
            Some(bytes) => writer.write_all(&bytes).map_err(FqixError::SinkWrite),
            None => writer.write_all(&self.dictionary).map_err(FqixError::SinkWrite),
        }
    }

    /// Reads one entry. `dictionaries_compressed` tells the reader how many
    /// trailing bytes belong to this entry: the full window, or only
    /// `compressed_dict_size` compressed bytes.
    pub fn read_from<R: Read>(mut reader: R, dictionaries_compressed: bool) -> Result<Self> {
        let mut prefix = [0u8; ENTRY_PREFIX_SIZE];
        reader.read_exact(&mut prefix).map_err(FqixError::SourceRead)?;
        let mut cursor = &prefix[..];
        let block_index = cursor.read_u64::<LittleEndian>().unwrap();
        let block_offset_raw = cursor.read_u64::<LittleEndian>().unwrap();
        let starting_line = cursor.read_u64::<LittleEndian>().unwrap();
        let first_line_offset = cursor.read_u32::<LittleEndian>().unwrap();
        let bits = cursor.read_u8().unwrap();
        let _reserved = cursor.read_u8().unwrap();
        let compressed_dict_size = cursor.read_u16::<LittleEndian>().unwrap();

        let dictionary = if compressed_dict_size == 0 {
            let mut raw = vec![0u8; WINDOW_SIZE];
            reader.read_exact(&mut raw).map_err(FqixError::SourceRead)?;
            raw
        } else {
            let mut compressed = vec![0u8; compressed_dict_size as usize];
            reader.read_exact(&mut compressed).map_err(FqixError::SourceRead)?;
            decompress_dictionary(&compressed)?
        };

        if dictionary.len() != WINDOW_SIZE {
            return Err(FqixError::CorruptSource(format!(
                "dictionary decompressed to {} bytes, expected {WINDOW_SIZE}",
                dictionary.len()
            )));
        }

        Ok(Self { block_index, block_offset_raw, starting_line, first_line_offset, bits, dictionary })
    }

    pub fn dictionary_array(&self) -> [u8; WINDOW_SIZE] {
        let mut out = [0u8; WINDOW_SIZE];
        out.copy_from_slice(&self.dictionary);
        out
    }
}

fn compress_dictionary(dictionary: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(dictionary).map_err(FqixError::SinkWrite)?;
    encoder.finish().map_err(FqixError::SinkWrite)
}

fn decompress_dictionary(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::with_capacity(WINDOW_SIZE);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| FqixError::CorruptSource(format!("dictionary decompression failed: {e}")))?;
    Ok(out)
}
