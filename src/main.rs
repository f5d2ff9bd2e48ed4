#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
use std::process::exit;

use clap::{Parser, Subcommand};
use env_logger::Env;
use fastqindex_lib::tools::extract::{run as extract, Opts as ExtractOpts};
use fastqindex_lib::tools::index::{run as index, Opts as IndexOpts};
use log::error;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds a sidecar index over a gzip-compressed FASTQ file.
    Index(IndexOpts),
    /// Extracts a line range or record-aligned segment using a prior index.
    Extract(ExtractOpts),
}

#[cfg(not(tarpaulin_include))]
fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Index(opts) => index(opts),
        Commands::Extract(opts) => extract(opts),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        exit(1);
    }
}
