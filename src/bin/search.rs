use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tierdex::{QueryConfig, QueryContext, ReaderStrategy};

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Ranked search over a tiered inverted index", long_about = None)]
struct Args {
    /// Index directory written by build_index
    index_dir: PathBuf,

    /// File with one query per line (batch mode)
    query_file: Option<PathBuf>,

    /// Where batch results are written
    output_file: Option<PathBuf>,

    /// Results per query
    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Hold the whole secondary index in memory
    #[arg(long)]
    dense: bool,

    /// Verify file checksums before answering queries
    #[arg(long)]
    verify: bool,
}

fn run(args: Args) -> Result<()> {
    let strategy = if args.dense {
        ReaderStrategy::Dense
    } else {
        ReaderStrategy::Tiered
    };
    let config = QueryConfig::new(&args.index_dir)
        .strategy(strategy)
        .top_k(args.top_k)
        .verify_checksums(args.verify);

    let mut context = QueryContext::open(config)
        .with_context(|| format!("Failed to open index in {}", args.index_dir.display()))?;

    match (args.query_file, args.output_file) {
        (Some(queries), Some(output)) => {
            let answered = context.run_file(&queries, &output)?;
            tracing::info!(queries = answered, output = %output.display(), "Wrote results");
        }
        (None, None) => {
            let stdin = io::stdin();
            context.run_interactive(stdin.lock(), io::stdout())?;
        }
        _ => bail!("query_file and output_file must be given together"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
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
