//! Shared sizing and identity constants for the index format and the
//! DEFLATE framing observer.

/// Size in bytes of the sliding-window dictionary required to resume raw
/// inflate at an arbitrary block boundary.
pub const WINDOW_SIZE: usize = 32_768;

/// Size of the buffer used to read raw compressed bytes from a `Source`.
pub const CHUNK_SIZE: usize = 16_384;

/// Identifies a file written by this crate. Little-endian encoding of the
/// byte sequence `{0x01, 0x02, 0x03, 0x04}`.
pub const MAGIC_NUMBER: u32 = 0x0403_0201;

/// The only writer version currently understood by this crate.
pub const WRITER_VERSION: u32 = 1;

/// Fixed size of `IndexHeader` on disk, including its zero-filled reserved
/// tail.
pub const HEADER_SIZE: usize = 512;

/// Size of an `IndexEntry`'s fixed-width prefix (everything before the
/// dictionary payload): `block_index(8) + block_offset_raw(8) +
/// starting_line(8) + first_line_offset(4) + bits(1) + reserved(1) +
/// compressed_dict_size(2)`.
pub const ENTRY_PREFIX_SIZE: usize = 32;

/// Size of an on-disk entry when dictionaries are stored uncompressed.
pub const ENTRY_SIZE_UNCOMPRESSED: usize = ENTRY_PREFIX_SIZE + WINDOW_SIZE;

/// Default number of lines per logical record (FASTQ: 4).
pub const DEFAULT_RECORD_SIZE: u64 = 4;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;
pub const GB: u64 = MB * 1024;
pub const TB: u64 = GB * 1024;

/// `shall_store` sentinel meaning "pick a value automatically from source size".
pub const AUTO_DISTANCE: i64 = -1;
