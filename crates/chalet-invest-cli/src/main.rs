mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::analyze::AnalyzeArgs;
use commands::monte_carlo::MonteCarloArgs;
use commands::scenarios::ScenariosArgs;
use commands::sensitivity::SensitivityArgs;

/// Cash-flow, return and risk analysis for co-owned vacation property
#[derive(Parser)]
#[command(
    name = "chalet",
    version,
    about = "Cash-flow, return and risk analysis for co-owned vacation property",
    long_about = "A CLI for analysing a co-owned holiday rental with decimal precision. \
                  Runs the year-1 cash flow, a multi-year projection with IRR/NPV, \
                  tornado sensitivities, weighted scenarios and correlated Monte Carlo \
                  simulation over a JSON or YAML assumptions document."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Year-1 cash flow, projection and return metrics
    Analyze(AnalyzeArgs),
    /// One-at-a-time sensitivity (tornado) of IRR or cash flow
    Sensitivity(SensitivityArgs),
    /// Probability-weighted comparison of named scenarios
    Scenarios(ScenariosArgs),
    /// Correlated Monte Carlo simulation over the full model
    MonteCarlo(MonteCarloArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Sensitivity(args) => commands::sensitivity::run_sensitivity(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo_cmd(args),
        Commands::Version => {
            println!("chalet {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
