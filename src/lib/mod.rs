#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

//! Core library for random-access line extraction from gzip-compressed
//! FASTQ streams via a sidecar index over DEFLATE block boundaries.
//!
//! `unsafe` is confined to [`deflate`], which binds the raw `libz-sys`
//! inflate engine needed for block-boundary flushing and sub-byte bit
//! priming -- facilities no safe Rust gzip crate exposes.

pub mod constants;
pub mod deflate;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod format;
pub mod indexer;
pub mod io;
pub mod policy;
pub mod reader;
pub mod tools {
    pub mod extract;
    pub mod index;
}
pub mod writer;

pub use error::{FqixError, Result};
