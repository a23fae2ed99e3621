//! Intraday quote types and the provider abstraction behind them.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub security_id: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    /// Signed change against the previous close, in percent.
    pub percent_change: f64,
    pub as_of: DateTime<Utc>,
    /// False when the symbol is unknown, not trading, or could not be looked up.
    pub available: bool,
}

impl Quote {
    pub fn unavailable(security_id: &str, as_of: DateTime<Utc>) -> Self {
        Quote {
            security_id: security_id.to_string(),
            name: None,
            price: None,
            percent_change: 0.0,
            as_of,
            available: false,
        }
    }

    /// The percent change, if the quote can be used for estimation.
    pub fn change(&self) -> Option<f64> {
        (self.available && self.percent_change.is_finite()).then_some(self.percent_change)
    }
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Looks up one batch of symbols in a single round trip.
    ///
    /// Symbols the source cannot resolve may be missing from the returned map or
    /// present with `available == false`.
    async fn fetch_batch(&self, security_ids: &[String]) -> Result<HashMap<String, Quote>>;

    /// Largest number of symbols accepted by one [`fetch_batch`](Self::fetch_batch) call.
    fn max_batch_size(&self) -> usize {
        100
    }
}
