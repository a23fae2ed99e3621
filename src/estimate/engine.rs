//! Weighted NAV change estimation from priced holdings.

use crate::core::fund::FundProfile;
use crate::core::quote::Quote;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// How complete the data behind an estimate was. Serialized as stable lowercase literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationStatus {
    /// Every disclosed holding was priced.
    Ok,
    /// Some holdings, possibly none, had no live price.
    Partial,
    NoHoldingsData,
    NotFound,
    Error,
}

impl EstimationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimationStatus::Ok => "ok",
            EstimationStatus::Partial => "partial",
            EstimationStatus::NoHoldingsData => "no_holdings_data",
            EstimationStatus::NotFound => "not_found",
            EstimationStatus::Error => "error",
        }
    }
}

impl Display for EstimationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One holding's input to the estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingContribution {
    pub code: String,
    pub name: String,
    pub security_id: String,
    /// Weight in percent of fund net assets.
    pub weight: f64,
    pub price: Option<f64>,
    pub percent_change: Option<f64>,
}

impl HoldingContribution {
    pub fn available(&self) -> bool {
        self.percent_change.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Estimation {
    pub estimated_change: Option<f64>,
    pub top_holdings_weight: Option<f64>,
    pub estimated_profit: Option<f64>,
    pub status: EstimationStatus,
    pub contributions: Vec<HoldingContribution>,
}

/// Profit implied by a percent change on a position.
pub fn estimated_profit(position_amount: f64, estimated_change: Option<f64>) -> Option<f64> {
    estimated_change.map(|change| position_amount * change / 100.0)
}

/// Estimates the fund's intraday change as the weight-normalized mean change of the
/// holdings that could be priced.
///
/// Missing prices shrink the set the mean is taken over; they do not pull the estimate
/// towards zero. How much of the fund the estimate covers is reported separately as
/// `top_holdings_weight`.
pub fn estimate(
    profile: &FundProfile,
    quotes: &HashMap<String, Quote>,
    position_amount: f64,
) -> Estimation {
    let contributions: Vec<HoldingContribution> = profile
        .holdings
        .iter()
        .map(|holding| {
            let quote = quotes.get(&holding.security_id);
            HoldingContribution {
                code: holding.code.clone(),
                name: holding.name.clone(),
                security_id: holding.security_id.clone(),
                weight: holding.weight * 100.0,
                price: quote.filter(|q| q.available).and_then(|q| q.price),
                percent_change: quote.and_then(Quote::change),
            }
        })
        .collect();

    let Some(top_holdings_weight) = profile.top_holdings_weight() else {
        return Estimation {
            estimated_change: None,
            top_holdings_weight: None,
            estimated_profit: None,
            status: EstimationStatus::NoHoldingsData,
            contributions,
        };
    };

    let priced: Vec<(f64, f64)> = profile
        .holdings
        .iter()
        .zip(&contributions)
        .filter_map(|(holding, c)| c.percent_change.map(|chg| (holding.weight, chg)))
        .collect();

    let status = if priced.len() == profile.holdings.len() {
        EstimationStatus::Ok
    } else {
        EstimationStatus::Partial
    };

    let estimated_change = weighted_mean(&priced);

    Estimation {
        estimated_change,
        top_holdings_weight: Some(top_holdings_weight),
        estimated_profit: estimated_profit(position_amount, estimated_change),
        status,
        contributions,
    }
}

/// Mean of `(weight, change)` pairs, falling back to an unweighted mean when every
/// weight is zero.
fn weighted_mean(priced: &[(f64, f64)]) -> Option<f64> {
    if priced.is_empty() {
        return None;
    }
    let total_weight: f64 = priced.iter().map(|(w, _)| w).sum();
    if total_weight > 0.0 {
        let weighted: f64 = priced.iter().map(|(w, chg)| w * chg).sum();
        Some(weighted / total_weight)
    } else {
        Some(priced.iter().map(|(_, chg)| chg).sum::<f64>() / priced.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fund::Holding;
    use chrono::Utc;

    fn profile(holdings: &[(&str, f64)]) -> FundProfile {
        FundProfile {
            fund_code: "005827".into(),
            fund_name: "Blue Chip".into(),
            holding_date: None,
            holdings: holdings
                .iter()
                .map(|(id, w)| Holding {
                    code: id.to_string(),
                    name: id.to_string(),
                    weight: *w,
                    security_id: id.to_string(),
                })
                .collect(),
        }
    }

    fn quotes(entries: &[(&str, Option<f64>)]) -> HashMap<String, Quote> {
        entries
            .iter()
            .map(|(id, chg)| {
                let mut quote = Quote::unavailable(id, Utc::now());
                if let Some(chg) = chg {
                    quote.available = true;
                    quote.percent_change = *chg;
                    quote.price = Some(10.0);
                }
                (id.to_string(), quote)
            })
            .collect()
    }

    #[test]
    fn test_full_coverage_is_ok() {
        let profile = profile(&[("A", 0.5), ("B", 0.5)]);
        let quotes = quotes(&[("A", Some(1.0)), ("B", Some(3.0))]);

        let est = estimate(&profile, &quotes, 10_000.0);
        assert_eq!(est.status, EstimationStatus::Ok);
        assert!((est.estimated_change.unwrap() - 2.0).abs() < 1e-12);
        assert!((est.top_holdings_weight.unwrap() - 100.0).abs() < 1e-12);
        assert!((est.estimated_profit.unwrap() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_renormalizes_to_priced_subset() {
        let profile = profile(&[("A", 0.4), ("B", 0.3)]);
        let quotes = quotes(&[("A", Some(2.0)), ("B", None)]);

        let est = estimate(&profile, &quotes, 5_000.0);
        assert_eq!(est.status, EstimationStatus::Partial);
        assert!((est.estimated_change.unwrap() - 2.0).abs() < 1e-12);
        assert!((est.top_holdings_weight.unwrap() - 70.0).abs() < 1e-9);
        assert!((est.estimated_profit.unwrap() - 100.0).abs() < 1e-9);
        assert!(est.contributions[0].available());
        assert!(!est.contributions[1].available());
        assert_eq!(est.contributions[1].price, None);
    }

    #[test]
    fn test_weighted_mean_of_mixed_moves() {
        let profile = profile(&[("A", 0.4), ("B", 0.3)]);
        let quotes = quotes(&[("A", Some(2.0)), ("B", Some(-1.0))]);

        let est = estimate(&profile, &quotes, 1_000.0);
        let expected = (0.4 * 2.0 + 0.3 * -1.0) / 0.7;
        assert_eq!(est.status, EstimationStatus::Ok);
        assert!((est.estimated_change.unwrap() - expected).abs() < 1e-12);
        assert!(
            (est.estimated_profit.unwrap() - 1_000.0 * est.estimated_change.unwrap() / 100.0)
                .abs()
                < 1e-12
        );
    }

    #[test]
    fn test_no_prices_is_partial_without_change() {
        let profile = profile(&[("A", 0.4), ("B", 0.3)]);
        let quotes = quotes(&[("A", None), ("B", None)]);

        let est = estimate(&profile, &quotes, 1_000.0);
        assert_eq!(est.status, EstimationStatus::Partial);
        assert_eq!(est.estimated_change, None);
        assert_eq!(est.estimated_profit, None);
        assert!((est.top_holdings_weight.unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_quote_entry_counts_as_unpriced() {
        let profile = profile(&[("A", 0.4), ("B", 0.3)]);
        let quotes = quotes(&[("A", Some(1.0))]);

        let est = estimate(&profile, &quotes, 1_000.0);
        assert_eq!(est.status, EstimationStatus::Partial);
        assert_eq!(est.estimated_change, Some(1.0));
    }

    #[test]
    fn test_empty_holdings_is_no_holdings_data() {
        let profile = profile(&[]);
        let est = estimate(&profile, &HashMap::new(), 1_000.0);
        assert_eq!(est.status, EstimationStatus::NoHoldingsData);
        assert_eq!(est.estimated_change, None);
        assert_eq!(est.top_holdings_weight, None);
        assert_eq!(est.estimated_profit, None);
    }

    #[test]
    fn test_zero_weights_fall_back_to_plain_mean() {
        let profile = profile(&[("A", 0.0), ("B", 0.0)]);
        let quotes = quotes(&[("A", Some(1.0)), ("B", Some(2.0))]);

        let est = estimate(&profile, &quotes, 1_000.0);
        assert_eq!(est.estimated_change, Some(1.5));
        assert_eq!(est.top_holdings_weight, Some(0.0));
    }

    #[test]
    fn test_status_literals() {
        assert_eq!(EstimationStatus::NoHoldingsData.to_string(), "no_holdings_data");
        assert_eq!(
            serde_json::to_string(&EstimationStatus::NotFound).unwrap(),
            "\"not_found\""
        );
    }
}
