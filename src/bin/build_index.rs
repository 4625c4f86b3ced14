use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tierdex::corpus::WikiDump;
use tierdex::{build_index, Analyzer, IndexConfig, MergeConfig};

#[derive(Parser, Debug)]
#[command(name = "build_index")]
#[command(about = "Build a tiered inverted index from a MediaWiki XML dump", long_about = None)]
struct Args {
    /// Path of the XML dump
    dump_path: PathBuf,

    /// Index directory, created if absent
    index_dir: PathBuf,

    /// Estimated in-memory block size in bytes before a temp block is flushed
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    block_bytes: usize,

    /// Secondary entries per tertiary entry
    #[arg(long, default_value_t = 100)]
    tertiary_gap: usize,

    /// Abort the build when resident memory exceeds this many megabytes
    #[arg(long)]
    memory_limit_mb: Option<u64>,

    /// Keep temp blocks after the merge
    #[arg(long)]
    keep_temp_blocks: bool,
}

fn run(args: Args) -> Result<()> {
    let config = IndexConfig::new(&args.index_dir)
        .max_block_bytes(args.block_bytes)
        .merge(MergeConfig::default().tertiary_gap(args.tertiary_gap))
        .memory_limit(args.memory_limit_mb.map(|mb| mb * 1024 * 1024))
        .keep_temp_blocks(args.keep_temp_blocks);

    let dump = WikiDump::open(&args.dump_path)?;
    let summary = build_index(config, Analyzer::new()?, dump)
        .with_context(|| format!("Failed to build index in {}", args.index_dir.display()))?;

    println!(
        "Indexed {} documents, {} terms from {} blocks in {:.2}s",
        summary.documents,
        summary.terms,
        summary.blocks,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            let code = e
                .downcast_ref::<tierdex::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}
