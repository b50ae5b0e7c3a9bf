//! # happycache CLI
//!
//! Command-line interface for the page-cache residency dump/load
//! pipelines in `happycache-core`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

use happycache_config::logging::{init_logging, LogLevel};

mod priority;

/// happycache - capture and restore page-cache residency of a directory tree
#[derive(Parser)]
#[command(name = "happycache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory tree and record resident pages to a map.
    Dump {
        #[arg(value_name = "PATH", default_value = ".")]
        path: PathBuf,
    },
    /// Read a map and issue prefetch hints for the pages it names.
    Load {
        #[arg(value_name = "THREADS")]
        threads: Option<usize>,
        #[arg(value_name = "MAPFILE")]
        mapfile: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            // clap exits with code 2 on a usage error; the documented exit
            // code for this tool is 1, so override everything except a
            // requested --help/--version, which stay 0.
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    let level = match cli.verbose {
        0 => LogLevel::Warn,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(level);

    priority::lower_priority();

    let config = happycache_config::config().clone();

    match cli.command {
        Commands::Dump { path } => run_dump(&path, &config),
        Commands::Load { threads, mapfile } => run_load(threads, mapfile, &config),
    }
}

fn run_dump(path: &Path, config: &happycache_config::Config) -> Result<()> {
    let mut dump_config = happycache_core::dump::DumpConfig::default();
    if let Some(threads) = config.worker_threads {
        dump_config.worker_threads = threads;
    }
    dump_config.chunk_pages = config.chunk_pages;

    tracing::info!(component = "CLI", path = %path.display(), "starting dump");
    happycache_core::dump::run(path, &config.map_path, &dump_config)
        .with_context(|| format!("dump of {} failed", path.display()))
}

fn run_load(
    threads: Option<usize>,
    mapfile: Option<PathBuf>,
    config: &happycache_config::Config,
) -> Result<()> {
    let mut load_config = happycache_core::load::LoadConfig::default();
    if let Some(t) = threads.or(config.worker_threads) {
        load_config.worker_threads = t;
    }
    load_config.chunk_pages = config.chunk_pages;
    load_config.hint_block_pages = config.prefetch_block_pages;
    if let Some(budget) = config.max_page_budget {
        load_config.max_page_budget = budget;
    }

    let map_path = mapfile.unwrap_or_else(|| config.map_path.clone());
    tracing::info!(component = "CLI", mapfile = %map_path.display(), "starting load");
    happycache_core::load::run(&map_path, &load_config)
        .with_context(|| format!("load of {} failed", map_path.display()))
}
