use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trellis_cli::{RenderOptions, check, render};

#[derive(Parser)]
#[command(name = "trellis", version, about = "Trellis template tools")]
struct Cli {
    /// Log engine activity to stderr (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a template and print its bindings per kind.
    Check {
        input: PathBuf,
        /// Tag that may carry data-state:* (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,
    },
    /// Mount a template on the stub renderer and print the settled HTML.
    Render {
        input: PathBuf,
        /// JSON object file seeding the component state
        #[arg(long)]
        state: Option<PathBuf>,
        /// Create loop rows inside the pass instead of over later turns
        #[arg(long, conflicts_with = "rows_per_turn")]
        eager: bool,
        #[arg(long)]
        rows_per_turn: Option<usize>,
        #[arg(long = "component")]
        components: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Check { input, components } => {
            let report = check(&input, &components)?;
            println!("{report}");
        }
        Commands::Render {
            input,
            state,
            eager,
            rows_per_turn,
            components,
        } => {
            let options = RenderOptions {
                state,
                eager,
                rows_per_turn,
                components,
            };
            println!("{}", render(&input, &options)?);
        }
    }
    Ok(())
}
