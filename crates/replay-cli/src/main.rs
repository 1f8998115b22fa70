//! CLI for the Replay toolchain.
//!
//! Loads a reference-machine program and answers step, proof and
//! bisection-window queries through a checkpointed execution run.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replay-query")]
#[command(about = "Query a replay machine at arbitrary steps", long_about = None)]
#[command(version)]
struct Cli {
    /// Program to execute (JSON)
    #[arg(long, short)]
    program: PathBuf,

    /// Cache configuration (JSON); defaults are used when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Print the machine state after exactly N steps
    Step {
        #[arg(long)]
        position: u64,
    },

    /// Run the machine until it halts and print its final state
    Last,

    /// Print the hex-encoded proof of step N -> N+1
    Proof {
        #[arg(long)]
        position: u64,
    },

    /// Narrow the cache to [start, end) and print one bisection round's probe points
    Bisect {
        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,

        /// Number of segments the window is split into
        #[arg(long, default_value_t = 2)]
        degree: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let run = commands::open_run(&cli.program, cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Step { position } => commands::step(&run, position).await,
        Commands::Last => commands::last(&run).await,
        Commands::Proof { position } => commands::proof(&run, position).await,
        Commands::Bisect { start, end, degree } => {
            commands::bisect(&run, start, end, degree).await
        }
    };
    run.close();

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}
