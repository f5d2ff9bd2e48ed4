//! Byte-oriented `Sink` contract: a file sink with exclusive locking and
//! seek/tell (needed by the index writer's finalize pass) and a console
//! sink that ignores locking and seeking.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{FqixError, Result};
use crate::io::lock::{self, LockMode};

pub trait Sink {
    fn open(&mut self) -> Result<()>;

    /// Acquires an exclusive lock regardless of other readers, used only by
    /// the index writer's own open path; console sinks are a no-op.
    fn open_with_write_lock(&mut self) -> Result<()> {
        self.open()
    }

    fn close(&mut self) -> Result<()>;

    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Seeks to an absolute offset. Console sinks ignore this.
    fn seek(&mut self, offset: u64) -> Result<()> {
        let _ = offset;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64>;
}

pub struct FileSink {
    path: PathBuf,
    force_overwrite: bool,
    file: Option<File>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, force_overwrite: bool) -> Self {
        Self { path: path.into(), force_overwrite, file: None }
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            FqixError::ProtocolMisuse("sink was not opened before use".to_string())
        })
    }
}

impl Sink for FileSink {
    fn open(&mut self) -> Result<()> {
        if self.path.exists() && !self.force_overwrite {
            return Err(FqixError::SinkOpen {
                path: self.path.display().to_string(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "refusing to overwrite an existing index without force_overwrite",
                ),
            });
        }
        // Open without truncating so a failed lock acquisition (another
        // process/fd holding a conflicting flock) can't destroy an existing
        // reader's content as a side effect.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| FqixError::SinkOpen {
                path: self.path.display().to_string(),
                source,
            })?;
        lock::try_acquire(&file, LockMode::Exclusive, &self.path.display().to_string())?;
        file.set_len(0).map_err(|source| FqixError::SinkOpen {
            path: self.path.display().to_string(),
            source,
        })?;
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
            lock::release(&file);
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.file_mut()?.write_all(bytes).map_err(FqixError::SinkWrite)
    }

    fn flush(&mut self) -> Result<()> {
        self.file_mut()?.flush().map_err(FqixError::SinkWrite)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.file_mut()?.seek(SeekFrom::Start(offset)).map_err(FqixError::SinkWrite)?;
        Ok(())
    }

    fn tell(&mut self) -> Result<u64> {
        self.file_mut()?.seek(SeekFrom::Current(0)).map_err(FqixError::SinkWrite)
    }
}

/// A console sink (stdout or a handed-in writer). Ignores locking and
/// seeking, as the spec's Sink contract allows.
pub struct ConsoleSink<W> {
    writer: W,
    position: u64,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, position: 0 }
    }
}

impl<W: Write> Sink for ConsoleSink<W> {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn open_with_write_lock(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).map_err(FqixError::SinkWrite)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(FqixError::SinkWrite)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.position)
    }
}

pub fn open_path_or_stdout(path: &Path, force_overwrite: bool) -> Result<Box<dyn Sink>> {
    if path == Path::new("-") {
        Ok(Box::new(ConsoleSink::new(io::stdout())))
    } else {
        let mut sink = FileSink::new(path, force_overwrite);
        sink.open_with_write_lock()?;
        Ok(Box::new(sink))
    }
}
