mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aquacorrect", about = "Underwater image attenuation and colour correction")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate attenuation parameters from a survey's images
    Parse(commands::parse::ParseArgs),
    /// Correct images using previously parsed parameters
    Process(commands::process::ProcessArgs),
    /// Print or save a default correction config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Parse(args) => commands::parse::run(args),
        Commands::Process(args) => commands::process::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
