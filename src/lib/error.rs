//! Error taxonomy shared by the indexer and extractor core.
//!
//! Each variant below corresponds to one of the error classes the core is
//! required to surface distinctly; callers match on these rather than on
//! opaque I/O errors so that a host CLI can map them to exit codes or retry
//! policies.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FqixError {
    #[error("{0}")]
    BadRequest(String),

    #[error("could not open source '{path}': {source}")]
    SourceOpen { path: String, #[source] source: io::Error },

    #[error("could not read from source: {0}")]
    SourceRead(#[source] io::Error),

    #[error("could not seek source: {0}")]
    SourceSeek(#[source] io::Error),

    #[error("could not open sink '{path}': {source}")]
    SinkOpen { path: String, #[source] source: io::Error },

    #[error("could not write to sink: {0}")]
    SinkWrite(#[source] io::Error),

    #[error("could not acquire advisory lock on '{0}'")]
    LockContention(String),

    #[error("index format invalid: {0}")]
    FormatInvalid(String),

    #[error("compressed source is corrupt: {0}")]
    CorruptSource(String),

    #[error("could not initialize decoder: {0}")]
    DecoderInit(String),

    #[error("protocol misuse: {0}")]
    ProtocolMisuse(String),

    #[error("this Indexer instance has already been used to create an index")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, FqixError>;
