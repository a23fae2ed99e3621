use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundnav::cli::setup::setup;
use fundnav::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fundnav::AppCommand {
    fn from(cmd: Commands) -> fundnav::AppCommand {
        match cmd {
            Commands::Estimate {
                fund_code,
                amount,
                details,
                json,
            } => fundnav::AppCommand::Estimate {
                fund_code,
                amount,
                details,
                json,
            },
            Commands::Batch { json } => fundnav::AppCommand::Batch { json },
            Commands::History {
                fund_code,
                days,
                json,
            } => fundnav::AppCommand::History {
                fund_code,
                days,
                json,
            },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Estimate today's NAV change of a fund and the profit on a position
    Estimate {
        /// Six digit fund code, e.g. 005827
        fund_code: String,
        /// Position amount held in the fund
        #[arg(allow_negative_numbers = true)]
        amount: f64,
        /// Show the contribution of each disclosed holding
        #[arg(long)]
        details: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Estimate every position listed in the configuration
    Batch {
        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest published NAVs of a fund
    History {
        /// Six digit fund code, e.g. 005827
        fund_code: String,
        /// Number of published NAVs to show
        #[arg(short, long, default_value_t = 30)]
        days: usize,
        /// Print the records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fundnav::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
