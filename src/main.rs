use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use umb::{build_manuscript, FetchConfig, Fetcher};

/// Assemble a LaTeX manuscript from its sections, citations and figures
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build the manuscript into the project's build/ directory
    Build {
        /// Project root (the directory holding umb.toml)
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Configure logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match args.command {
        Command::Build { root } => {
            let mut fetcher = Fetcher::new(FetchConfig::from_env())?;
            let summary = build_manuscript(&root, &mut fetcher)
                .with_context(|| format!("Failed to build manuscript in {:?}", root))?;
            info!(
                "Built {} section(s) with {} reference(s) and {} figure(s)",
                summary.sections, summary.references, summary.figures
            );
            println!("{}", summary.main_file.display());
        }
    }

    Ok(())
}
