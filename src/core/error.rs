//! Error taxonomy for fund resolution and estimation.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while resolving a fund or estimating its NAV change.
///
/// Only [`InvalidInput`](Self::InvalidInput) and [`Internal`](Self::Internal) escape
/// [`FundNavEstimator::estimate_fund_nav`](crate::estimate::FundNavEstimator::estimate_fund_nav);
/// every other variant is reported to the caller through the result status.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FundNavError {
    /// The code does not correspond to a known fund.
    #[error("Fund not found: {0}")]
    NotFound(String),

    /// The fund exists but has no disclosed holdings, e.g. a newly launched or bond fund.
    #[error("No disclosed holdings for fund: {fund_code}")]
    NoHoldingsData {
        fund_code: String,
        fund_name: Option<String>,
        holding_date: Option<NaiveDate>,
    },

    /// An upstream source did not answer within the configured timeout.
    #[error("Upstream timeout: {source_name}")]
    UpstreamTimeout { source_name: String },

    /// Malformed upstream data or any other failure not otherwise classified.
    #[error("Unexpected error: {0}")]
    Unexpected(String),

    /// The caller supplied an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A fault inside the estimator itself, such as a panicked fetch task.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FundNavError {
    /// Whether this error must be raised past the estimation boundary instead of
    /// being folded into a result status.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Internal(_))
    }
}

impl From<anyhow::Error> for FundNavError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected(format!("{err:#}"))
    }
}
