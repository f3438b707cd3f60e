//! tlru - replay get/put scripts against a tinylru cache

mod script;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::script::{RunOptions, Script};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Replay script (JSON), or `-` for stdin
    script: PathBuf,

    /// Cache capacity (number of items), overrides the script
    #[arg(short, long)]
    capacity: Option<usize>,

    /// Log the MRU-to-LRU order after every operation
    #[arg(short, long)]
    show_state: bool,

    /// Print hit/miss statistics when done
    #[arg(long)]
    stats: bool,
}

/// Log filter from `RUST_LOG`-style directives, `info` when there are none
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn main() -> Result<()> {
    // Initialize tracing
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let script = Script::load(&args.script)?;
    let config = script.config(args.capacity)?;
    info!(
        "Replaying {} operations with capacity {}",
        script.ops.len(),
        config.capacity
    );

    let options = RunOptions {
        show_state: args.show_state,
        print_stats: args.stats,
    };
    let stdout = std::io::stdout();
    script::run(&script, &config, options, &mut stdout.lock())?;
    Ok(())
}
