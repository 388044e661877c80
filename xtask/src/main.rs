// Desktop/tooling crate — unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Watch timer service development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the timer crates for the watch target (no_std) and the host
    Check,
    /// Run all tests (unit, integration, and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Build and optionally open documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Drive a timer manager and cron service on a simulated clock, logging
    /// every event through tracing
    Simulate {
        /// Simulated wall time to run for, in seconds
        #[arg(long, default_value_t = 120)]
        seconds: u32,
        /// Stall the owning task once to show single-fire catch-up
        #[arg(long)]
        stall: bool,
        /// Log filter (RUST_LOG syntax)
        #[arg(long, default_value = "debug")]
        log: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Doc { open } => check::doc(open),
        Commands::Simulate {
            seconds,
            stall,
            log,
        } => simulate::run(seconds, stall, &log),
    }
}
