//! Advisory whole-file locking via `flock(2)`, used by the file-backed
//! `Source`/`Sink` adapters.

use std::fs::File;
use std::os::unix::io::AsRawFd;

use crate::error::{FqixError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Tries to acquire a non-blocking advisory lock on `file`. Fails
/// immediately with `LockContention` rather than waiting.
pub fn try_acquire(file: &File, mode: LockMode, label: &str) -> Result<()> {
    let op = match mode {
        LockMode::Shared => libc::LOCK_SH,
        LockMode::Exclusive => libc::LOCK_EX,
    } | libc::LOCK_NB;

    let ret = unsafe { libc::flock(file.as_raw_fd(), op) };
    if ret != 0 {
        return Err(FqixError::LockContention(label.to_string()));
    }
    Ok(())
}

/// Releases any lock held on `file`. A no-op if none is held.
pub fn release(file: &File) {
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}
