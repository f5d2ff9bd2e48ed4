//! Storage-decision policies: decide, at each block boundary, whether the
//! indexer should emit a resume point. A trait with two concrete
//! implementations, one per distance metric.

use crate::constants::{AUTO_DISTANCE, GB, KB, MB};

/// Decides whether the block currently at the indexer's cursor should
/// become a new index entry.
pub trait StorageDecisionPolicy {
    /// `block_index` / `block_offset_raw` describe the candidate block;
    /// `last_stored_offset` is `None` until the first entry is written.
    /// `block_is_empty` must make every implementation refuse
    /// unconditionally: empty blocks never become resume points.
    fn should_store(
        &mut self,
        block_index: u64,
        block_offset_raw: u64,
        last_stored_offset: Option<u64>,
        block_is_empty: bool,
    ) -> bool;
}

/// Emits every `interval`-th non-empty block, subject to a minimum
/// raw-byte distance (`interval * 16 KiB`) from the last stored entry so
/// pathologically small blocks don't starve the index of actual coverage.
pub struct BlockDistanceStrategy {
    interval: u64,
    previous_stored_index: Option<u64>,
}

impl BlockDistanceStrategy {
    pub const DEFAULT_INTERVAL: u64 = 2048;

    pub fn new(interval: u64) -> Self {
        Self { interval: interval.max(1), previous_stored_index: None }
    }

    /// Chooses an interval from the source's total size.
    pub fn auto(source_size: Option<u64>) -> Self {
        let interval = match source_size {
            None => Self::DEFAULT_INTERVAL,
            Some(size) => {
                if size <= 1 * GB {
                    16
                } else if size <= 2 * GB {
                    32
                } else if size <= 4 * GB {
                    64
                } else if size <= 8 * GB {
                    128
                } else if size <= 16 * GB {
                    256
                } else if size <= 32 * GB {
                    512
                } else if size <= 64 * GB {
                    1024
                } else if size <= 128 * GB {
                    2048
                } else if size <= 256 * GB {
                    4096
                } else {
                    8192
                }
            }
        };
        Self::new(interval)
    }

    fn minimum_byte_distance(&self) -> u64 {
        self.interval * 16 * KB
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }
}

impl StorageDecisionPolicy for BlockDistanceStrategy {
    fn should_store(
        &mut self,
        block_index: u64,
        block_offset_raw: u64,
        last_stored_offset: Option<u64>,
        block_is_empty: bool,
    ) -> bool {
        if block_is_empty {
            return false;
        }
        let due_by_block_count = match self.previous_stored_index {
            None => true,
            Some(previous) => block_index >= previous + self.interval,
        };
        if !due_by_block_count {
            return false;
        }
        let due_by_byte_distance = match last_stored_offset {
            None => true,
            Some(last) => block_offset_raw.saturating_sub(last) >= self.minimum_byte_distance(),
        };
        if due_by_byte_distance {
            self.previous_stored_index = Some(block_index);
        }
        due_by_byte_distance
    }
}

/// Emits whenever the raw-byte distance from the last stored entry exceeds
/// `threshold`.
pub struct ByteDistanceStrategy {
    threshold: u64,
}

impl ByteDistanceStrategy {
    pub const DEFAULT_THRESHOLD: u64 = GB;

    pub fn new(threshold: u64) -> Self {
        Self { threshold: threshold.max(1) }
    }

    /// `auto = max(256 KiB, size/512)`.
    pub fn auto(source_size: Option<u64>) -> Self {
        let threshold = match source_size {
            None => Self::DEFAULT_THRESHOLD,
            Some(size) => (size / 512).max(256 * KB),
        };
        Self::new(threshold)
    }

    /// Parses a human-friendly byte distance like "256k", "2g", falling
    /// back to auto-sizing on the literal sentinel `-1`.
    pub fn parse_threshold(raw: &str, source_size: Option<u64>) -> Option<u64> {
        if raw.trim() == AUTO_DISTANCE.to_string() {
            return Some(Self::auto(source_size).threshold);
        }
        let raw = raw.trim();
        let (digits, unit) = raw.split_at(raw.find(|c: char| c.is_alphabetic()).unwrap_or(raw.len()));
        let value: u64 = digits.parse().ok()?;
        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" => KB,
            "m" => MB,
            "g" => GB,
            "t" => crate::constants::TB,
            _ => return None,
        };
        Some(value * multiplier)
    }
}

impl StorageDecisionPolicy for ByteDistanceStrategy {
    fn should_store(
        &mut self,
        _block_index: u64,
        block_offset_raw: u64,
        last_stored_offset: Option<u64>,
        block_is_empty: bool,
    ) -> bool {
        if block_is_empty {
            return false;
        }
        match last_stored_offset {
            None => true,
            Some(last) => block_offset_raw.saturating_sub(last) >= self.threshold,
        }
    }
}
