use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;

use crate::constants::AUTO_DISTANCE;
use crate::indexer::Indexer;
use crate::io::{sink, source};
use crate::policy::{BlockDistanceStrategy, ByteDistanceStrategy, StorageDecisionPolicy};
use crate::writer::IndexWriter;

/// Builds a sidecar index over a gzip-compressed FASTQ file's DEFLATE block
/// boundaries.
#[derive(Parser, Debug)]
#[clap(name = "fqix-index", verbatim_doc_comment)]
pub struct Opts {
    /// The gzip-compressed FASTQ file to index. Use '-' to read from stdin.
    #[clap(short = 'f', long, display_order = 1)]
    pub fastq: PathBuf,

    /// The index file to write. Use '-' to write to stdout.
    #[clap(short = 'i', long, display_order = 2)]
    pub index: PathBuf,

    /// Emit one index entry every N compressed blocks. -1 picks a value
    /// from the FASTQ file's size.
    #[clap(short = 'b', long, default_value_t = AUTO_DISTANCE, display_order = 3)]
    pub block_interval: i64,

    /// Emit an index entry whenever this many raw bytes have passed since
    /// the last one, e.g. "256m" or "2g". Overrides --block-interval.
    /// '-1' picks a value from the FASTQ file's size.
    #[clap(long, display_order = 4)]
    pub byte_distance: Option<String>,

    /// Zlib-compress each entry's 32 KiB dictionary before writing it.
    #[clap(long, display_order = 5)]
    pub compress_dictionaries: bool,

    /// Overwrite the index file if it already exists.
    #[clap(long, display_order = 6)]
    pub force: bool,

    /// Tee the decompressed FASTQ bytes to stdout while indexing, so the
    /// plain file can be reconstructed in the same pass.
    #[clap(long, display_order = 7)]
    pub echo_stdout: bool,
}

pub fn run(opts: &Opts) -> Result<()> {
    let fastq_source = source::open_path_or_stdin(&opts.fastq)
        .with_context(|| format!("opening FASTQ source '{}'", opts.fastq.display()))?;
    let source_size = fastq_source.size();

    let index_sink = sink::open_path_or_stdout(&opts.index, opts.force)
        .with_context(|| format!("opening index sink '{}'", opts.index.display()))?;

    // `block_interval_hint` is purely informational: it is stashed in the
    // header for `fqix info` to report back, and byte-distance policies have
    // no block-count interval to report, so they leave it at 0.
    let (policy, block_interval_hint): (Box<dyn StorageDecisionPolicy>, u32) =
        if let Some(raw) = &opts.byte_distance {
            let threshold = ByteDistanceStrategy::parse_threshold(raw, source_size)
                .with_context(|| format!("invalid --byte-distance value '{raw}'"))?;
            (Box::new(ByteDistanceStrategy::new(threshold)), 0)
        } else if opts.block_interval == AUTO_DISTANCE {
            let strategy = BlockDistanceStrategy::auto(source_size);
            let interval = strategy.interval() as u32;
            (Box::new(strategy), interval)
        } else {
            ensure!(opts.block_interval > 0, "--block-interval must be positive or -1 for auto");
            (Box::new(BlockDistanceStrategy::new(opts.block_interval as u64)), opts.block_interval as u32)
        };

    let writer = IndexWriter::new(index_sink, opts.compress_dictionaries);
    let mut indexer = Indexer::new(
        fastq_source,
        writer,
        policy,
        opts.compress_dictionaries,
        block_interval_hint,
    );
    if opts.echo_stdout {
        indexer = indexer.with_echo_sink(Box::new(sink::ConsoleSink::new(std::io::stdout())));
    }

    let summary = indexer.create_index().map_err(anyhow::Error::from)?;
    info!(
        "wrote {} entries covering {} lines ({} concatenated gzip part(s))",
        summary.entry_count, summary.lines_in_indexed_file, summary.concatenated_parts
    );
    for message in summary.diagnostics.messages() {
        info!("diagnostic: {message}");
    }
    Ok(())
}
