use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use log::info;

use crate::constants::DEFAULT_RECORD_SIZE;
use crate::extractor::{ExtractRequest, Extractor};
use crate::io::{sink, source};

/// Extracts a range of lines (or one segment of a record-aligned file) from
/// a gzip-compressed FASTQ file using its sidecar index.
#[derive(Parser, Debug)]
#[clap(name = "fqix-extract", verbatim_doc_comment)]
pub struct Opts {
    /// The gzip-compressed FASTQ file to read from. Use '-' to read from
    /// stdin (the index must then cover the same bytes already seen, so
    /// '-' here is only useful with a seekable pipe substitute).
    #[clap(short = 'f', long, display_order = 1)]
    pub fastq: PathBuf,

    /// The index file previously produced by `fqix index`. Use '-' to read
    /// from stdin.
    #[clap(short = 'i', long, display_order = 2)]
    pub index: PathBuf,

    /// Where to write the extracted lines. Use '-' for stdout.
    #[clap(short = 'o', long, display_order = 3, default_value = "-")]
    pub output: PathBuf,

    /// Zero-based first line to extract. Requires --line-count.
    #[clap(short = 's', long, display_order = 4)]
    pub start_line: Option<u64>,

    /// Number of lines to extract starting at --start-line.
    #[clap(short = 'c', long, display_order = 5)]
    pub line_count: Option<u64>,

    /// Extract one segment of the file instead, given as "INDEX/COUNT"
    /// (e.g. "0/4" for the first quarter). Mutually exclusive with
    /// --start-line/--line-count.
    #[clap(long, display_order = 6)]
    pub segment: Option<String>,

    /// Lines per logical record, used only by --segment so that a segment
    /// boundary never splits a record.
    #[clap(short = 'r', long, default_value_t = DEFAULT_RECORD_SIZE, display_order = 7)]
    pub record_size: u64,

    /// Overwrite the output file if it already exists.
    #[clap(long, display_order = 8)]
    pub force: bool,

    /// Buffer extracted lines in memory and trim to exactly --line-count at
    /// the end instead of streaming them out as they're produced.
    #[clap(long, display_order = 9)]
    pub debug: bool,
}

fn parse_segment(raw: &str) -> Result<(u64, u64)> {
    let (index_str, count_str) =
        raw.split_once('/').with_context(|| format!("--segment '{raw}' must be 'INDEX/COUNT'"))?;
    let segment_index: u64 = index_str
        .trim()
        .parse()
        .with_context(|| format!("invalid segment index in '{raw}'"))?;
    let segment_count: u64 = count_str
        .trim()
        .parse()
        .with_context(|| format!("invalid segment count in '{raw}'"))?;
    Ok((segment_index, segment_count))
}

pub fn run(opts: &Opts) -> Result<()> {
    let request = match (&opts.segment, opts.start_line, opts.line_count) {
        (Some(raw), None, None) => {
            let (segment_index, segment_count) = parse_segment(raw)?;
            ExtractRequest::Segment { segment_index, segment_count, record_size: opts.record_size }
        }
        (None, Some(start_line), Some(line_count)) => {
            ExtractRequest::Lines { start_line, line_count }
        }
        (None, _, _) => {
            bail!("either --segment or both --start-line and --line-count must be given")
        }
        (Some(_), _, _) => {
            bail!("--segment cannot be combined with --start-line/--line-count")
        }
    };
    ensure!(
        !matches!(request, ExtractRequest::Lines { line_count: 0, .. }),
        "--line-count must be positive"
    );

    let fastq_source = source::open_path_or_stdin(&opts.fastq)
        .with_context(|| format!("opening FASTQ source '{}'", opts.fastq.display()))?;
    let index_source = source::open_path_or_stdin(&opts.index)
        .with_context(|| format!("opening index source '{}'", opts.index.display()))?;
    let output_sink = sink::open_path_or_stdout(&opts.output, opts.force)
        .with_context(|| format!("opening output sink '{}'", opts.output.display()))?;

    let extractor =
        Extractor::new(fastq_source, index_source, output_sink, request).with_debug_buffering(opts.debug);
    let summary = extractor.extract().map_err(anyhow::Error::from)?;
    info!(
        "extracted {} line(s) ({} concatenated gzip part(s) traversed)",
        summary.lines_written, summary.concatenated_parts
    );
    Ok(())
}
