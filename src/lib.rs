pub mod cli;
pub mod core;
pub mod estimate;
pub mod providers;
pub mod store;

pub use estimate::{EstimationReport, EstimationResult, EstimationStatus, FundNavEstimator};

use crate::core::config::AppConfig;
use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Estimate {
        fund_code: String,
        amount: f64,
        details: bool,
        json: bool,
    },
    Batch {
        json: bool,
    },
    History {
        fund_code: String,
        days: usize,
        json: bool,
    },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fundnav starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let estimator = FundNavEstimator::from_config(&config)?;

    match command {
        AppCommand::Estimate {
            fund_code,
            amount,
            details,
            json,
        } => cli::estimate::run(&estimator, &fund_code, amount, details, json).await,
        AppCommand::Batch { json } => cli::batch::run(&estimator, &config.positions, json).await,
        AppCommand::History {
            fund_code,
            days,
            json,
        } => cli::history::run(&estimator, &fund_code, days, json).await,
    }
}
