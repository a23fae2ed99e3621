//! Fund profiles and the disclosed holdings they carry.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One disclosed position of a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Ticker as disclosed, e.g. `600519`, `00700` or `AAPL`.
    pub code: String,
    pub name: String,
    /// Fraction of fund net assets, `0.0..=1.0`.
    pub weight: f64,
    /// Quote symbol for this holding, see [`security_id`].
    pub security_id: String,
}

/// A fund and its top holdings as of one disclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundProfile {
    pub fund_code: String,
    pub fund_name: String,
    /// Report date the holdings snapshot is valid as of.
    pub holding_date: Option<NaiveDate>,
    pub holdings: Vec<Holding>,
}

impl FundProfile {
    /// Combined weight of the disclosed holdings, in percent.
    pub fn top_holdings_weight(&self) -> Option<f64> {
        if self.holdings.is_empty() {
            return None;
        }
        Some(self.holdings.iter().map(|h| h.weight).sum::<f64>() * 100.0)
    }
}

#[async_trait]
pub trait FundDataProvider: Send + Sync {
    /// Fetches the latest disclosed profile. `Ok(None)` means the code is unknown upstream.
    async fn fetch_profile(&self, fund_code: &str) -> Result<Option<FundProfile>>;
}

/// One published net asset value of a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavRecord {
    pub date: NaiveDate,
    /// Unit NAV.
    pub nav: f64,
    /// Accumulated NAV, which adds back distributions.
    pub accumulated_nav: Option<f64>,
    /// Change against the previous published NAV, in percent.
    pub daily_change: Option<f64>,
}

#[async_trait]
pub trait NavHistoryProvider: Send + Sync {
    /// Fetches the published NAVs of a fund, oldest first. `Ok(None)` means the code is
    /// unknown upstream.
    async fn fetch_nav_history(&self, fund_code: &str) -> Result<Option<Vec<NavRecord>>>;
}

/// A valid fund code is six ASCII digits.
pub fn is_valid_fund_code(fund_code: &str) -> bool {
    fund_code.len() == 6 && fund_code.bytes().all(|b| b.is_ascii_digit())
}

/// Builds the quote symbol for a disclosed ticker.
///
/// `market_id` is the exchange number used by fund disclosures (`0` Shenzhen or Beijing,
/// `1` Shanghai, `116` Hong Kong, `105`/`106`/`107` US). Without it the exchange is
/// guessed from the shape of the ticker.
pub fn security_id(market_id: Option<&str>, code: &str) -> String {
    match market_id {
        Some("1") => return format!("sh{code}"),
        Some("0") if is_beijing_code(code) => return format!("bj{code}"),
        Some("0") => return format!("sz{code}"),
        Some("116") => return hk_symbol(code),
        Some(id) if id.parse::<u32>().is_ok_and(|n| n >= 100) => return us_symbol(code),
        _ => {}
    }

    if code.chars().any(|c| c.is_ascii_alphabetic()) {
        us_symbol(code)
    } else if code.len() < 6 {
        hk_symbol(code)
    } else if code.starts_with('6') || code.starts_with('5') {
        format!("sh{code}")
    } else if is_beijing_code(code) {
        format!("bj{code}")
    } else {
        format!("sz{code}")
    }
}

fn is_beijing_code(code: &str) -> bool {
    code.len() == 6 && (code.starts_with('4') || code.starts_with('8') || code.starts_with("92"))
}

fn hk_symbol(code: &str) -> String {
    format!("rt_hk{code:0>5}")
}

fn us_symbol(code: &str) -> String {
    format!("gb_{}", code.to_lowercase().replace('.', "$"))
}
