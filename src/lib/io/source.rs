//! Byte-oriented `Source` contract and its two concrete implementations: a
//! seekable file source and a bounded-rewind stream source for stdin-like
//! inputs, exposed as a trait object so the Indexer/Extractor stay agnostic
//! of where bytes come from.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{FqixError, Result};
use crate::io::lock::{self, LockMode};

/// A seekable (or rewind-emulated) byte source. Implementations own their
/// own buffering; callers should not wrap them in another `BufReader`.
pub trait Source {
    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Reads up to `buf.len()` bytes, returning the number actually read
    /// (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads a single byte, or `-1` at EOF (mirrors the C `fgetc` contract).
    fn read_char(&mut self) -> Result<i32> {
        let mut byte = [0u8; 1];
        let n = self.read(&mut byte)?;
        if n == 0 {
            Ok(-1)
        } else {
            Ok(byte[0] as i32)
        }
    }

    /// Seeks to an absolute byte offset from the start of the source.
    fn seek(&mut self, offset: u64) -> Result<u64>;

    fn skip(&mut self, n: u64) -> Result<()> {
        let pos = self.tell()?;
        self.seek(pos + n)?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64>;

    /// Total size in bytes, if known up front (file sources know it;
    /// unbounded streams do not).
    fn size(&self) -> Option<u64>;

    /// True if at least one more byte is available to read at the current
    /// position.
    fn can_read(&mut self) -> bool;

    fn eof(&self) -> bool;
}

/// A local, seekable, advisory-locked file source.
pub struct FileSource {
    path: PathBuf,
    file: Option<File>,
    size: Option<u64>,
    at_eof: bool,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: None, size: None, at_eof: false }
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            FqixError::ProtocolMisuse("source was not opened before use".to_string())
        })
    }
}

impl Source for FileSource {
    fn open(&mut self) -> Result<()> {
        let file = File::open(&self.path).map_err(|source| FqixError::SourceOpen {
            path: self.path.display().to_string(),
            source,
        })?;
        lock::try_acquire(&file, LockMode::Shared, &self.path.display().to_string())?;
        self.size = file.metadata().ok().map(|m| m.len());
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            lock::release(&file);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file_mut()?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..]).map_err(FqixError::SourceRead)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.at_eof = total < buf.len();
        Ok(total)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        self.at_eof = false;
        let file = self.file_mut()?;
        file.seek(SeekFrom::Start(offset)).map_err(FqixError::SourceSeek)
    }

    fn tell(&mut self) -> Result<u64> {
        let file = self.file_mut()?;
        file.seek(SeekFrom::Current(0)).map_err(FqixError::SourceSeek)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn can_read(&mut self) -> bool {
        let Ok(pos) = self.tell() else { return false };
        match self.size {
            Some(size) => pos < size,
            None => {
                let mut probe = [0u8; 1];
                match self.read(&mut probe) {
                    Ok(1) => {
                        // Un-read the probe byte.
                        let _ = self.seek(pos);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    fn eof(&self) -> bool {
        self.at_eof
    }
}

/// A forward-only stream source (e.g. stdin) with a bounded rewind buffer,
/// emulating `seek`/`skip` over the last few read chunks. Seeking further
/// back than the buffer holds fails deterministically rather than
/// silently returning wrong bytes.
pub struct StreamSource<R> {
    inner: R,
    label: String,
    position: u64,
    rewind_chunks: VecDeque<Vec<u8>>,
    rewound_bytes: usize,
    max_segments: usize,
    default_chunk_size: usize,
    at_eof: bool,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R, label: impl Into<String>) -> Self {
        Self::with_buffer(inner, label, 8, 32 * 1024)
    }

    pub fn with_buffer(
        inner: R,
        label: impl Into<String>,
        max_segments: usize,
        default_chunk_size: usize,
    ) -> Self {
        Self {
            inner,
            label: label.into(),
            position: 0,
            rewind_chunks: VecDeque::new(),
            rewound_bytes: 0,
            max_segments,
            default_chunk_size,
            at_eof: false,
        }
    }

    fn buffered_len(&self) -> usize {
        self.rewind_chunks.iter().map(Vec::len).sum()
    }

    fn read_from_buffer(&mut self, buf: &mut [u8]) -> usize {
        let buffered = self.buffered_len();
        let joined: Vec<u8> = self.rewind_chunks.iter().flatten().copied().collect();
        let copy_len = buf.len().min(self.rewound_bytes);
        let start = buffered - self.rewound_bytes;
        buf[..copy_len].copy_from_slice(&joined[start..start + copy_len]);
        self.rewound_bytes -= copy_len;
        self.position += copy_len as u64;
        copy_len
    }

    fn read_from_stream(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf).map_err(FqixError::SourceRead)?;
        if n > 0 {
            self.rewind_chunks.push_back(buf[..n].to_vec());
            if self.rewind_chunks.len() > self.max_segments {
                self.rewind_chunks.pop_front();
            }
            self.position += n as u64;
        } else {
            self.at_eof = true;
        }
        Ok(n)
    }
}

impl<R: Read> Source for StreamSource<R> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.rewound_bytes > 0 {
            Ok(self.read_from_buffer(buf))
        } else {
            self.read_from_stream(buf)
        }
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        if offset >= self.position {
            let forward = offset - self.position;
            self.skip(forward)?;
        } else {
            let back = self.position - offset;
            self.rewind(back)?;
        }
        Ok(self.position)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n as usize;
        while remaining > 0 {
            let chunk = remaining.min(self.default_chunk_size);
            let mut sink = vec![0u8; chunk];
            let read = self.read(&mut sink)?;
            if read == 0 {
                break;
            }
            remaining -= read;
        }
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn can_read(&mut self) -> bool {
        if self.rewound_bytes > 0 {
            return true;
        }
        let mut probe = [0u8; 1];
        match self.read_from_stream(&mut probe) {
            Ok(1) => {
                // Push the probe byte back onto the rewind buffer as an
                // unread segment.
                self.rewound_bytes += 1;
                self.position -= 1;
                true
            }
            _ => false,
        }
    }

    fn eof(&self) -> bool {
        self.at_eof
    }
}

impl<R> StreamSource<R> {
    fn rewind(&mut self, n_bytes: u64) -> Result<u64> {
        let n_bytes = n_bytes.min(self.position) as usize;
        let buffered = self.buffered_len();
        if n_bytes + self.rewound_bytes > buffered {
            return Err(FqixError::SourceSeek(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "cannot rewind {n_bytes} bytes past the {}-segment buffer for '{}'",
                    self.max_segments, self.label
                ),
            )));
        }
        self.position -= n_bytes as u64;
        self.rewound_bytes += n_bytes;
        Ok(n_bytes as u64)
    }
}

/// Opens a path-like argument, treating `-` as stdin.
pub fn open_path_or_stdin(path: &Path) -> Result<Box<dyn Source>> {
    if path == Path::new("-") {
        Ok(Box::new(StreamSource::new(io::stdin(), "<stdin>")))
    } else {
        let mut source = FileSource::new(path);
        source.open()?;
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod file_source_test {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reads_seeks_and_reports_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let mut source = FileSource::new(file.path());
        source.open().unwrap();
        assert_eq!(source.size(), Some(10));

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        source.seek(8).unwrap();
        assert_eq!(source.tell().unwrap(), 8);
        let mut tail = [0u8; 4];
        assert_eq!(source.read(&mut tail).unwrap(), 2);
        assert_eq!(&tail[..2], b"89");
        source.close().unwrap();
    }

    #[test]
    fn can_read_reflects_remaining_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ab").unwrap();
        file.flush().unwrap();

        let mut source = FileSource::new(file.path());
        source.open().unwrap();
        assert!(source.can_read());
        source.seek(2).unwrap();
        assert!(!source.can_read());
    }

    #[test]
    fn a_second_exclusive_lock_on_an_already_shared_locked_file_fails() {
        use crate::io::sink::{FileSink, Sink};
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"existing content").unwrap();
        file.flush().unwrap();

        let mut reader = FileSource::new(file.path());
        reader.open().unwrap();

        let mut writer = FileSink::new(file.path(), true);
        let err = writer.open().unwrap_err();
        assert!(matches!(err, FqixError::LockContention(_)));

        // A failed lock acquisition must not have truncated the file the
        // reader is still holding open.
        assert_eq!(std::fs::read(file.path()).unwrap(), b"existing content");
    }

    #[test]
    fn stream_source_rewinds_within_its_buffer_but_not_past_it() {
        let cursor = io::Cursor::new((0u8..=250).collect::<Vec<u8>>());
        // A 2-segment, 32-byte-chunk buffer retains only the last 64 bytes
        // once four 32-byte reads have streamed past it.
        let mut source = StreamSource::with_buffer(cursor, "test", 2, 32);
        let mut buf = [0u8; 32];
        for _ in 0..4 {
            assert_eq!(source.read(&mut buf).unwrap(), 32);
        }
        assert_eq!(source.tell().unwrap(), 128);

        // Still within the retained [64, 128) window.
        source.seek(70).unwrap();
        let mut tail = [0u8; 4];
        assert_eq!(source.read(&mut tail).unwrap(), 4);
        assert_eq!(tail, [70, 71, 72, 73]);

        // Byte 0 fell out of the buffer two chunks ago; rewinding there must
        // fail deterministically rather than silently return wrong bytes.
        let err = source.seek(0).unwrap_err();
        assert!(matches!(err, FqixError::SourceSeek(_)));
    }
}
