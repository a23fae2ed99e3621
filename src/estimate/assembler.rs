//! Builds the response handed back to callers.

use super::engine::{Estimation, EstimationStatus, HoldingContribution};
use crate::core::error::FundNavError;
use crate::core::fund::FundProfile;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one estimation request.
///
/// Numeric fields are `None` rather than a placeholder whenever they could not be
/// computed. Formatting is left to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub fund_code: String,
    pub fund_name: Option<String>,
    pub holding_date: Option<NaiveDate>,
    pub status: EstimationStatus,
    /// Estimated intraday NAV change in percent.
    pub estimated_change: Option<f64>,
    /// Share of net assets covered by the disclosed holdings, in percent.
    pub top_holdings_weight: Option<f64>,
    pub position_amount: f64,
    pub estimated_profit: Option<f64>,
}

impl EstimationResult {
    /// The result as a string keyed mapping with exactly the result fields.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => self.fallback_map(),
        }
    }

    fn fallback_map(&self) -> Map<String, Value> {
        let number = |v: Option<f64>| v.map_or(Value::Null, Value::from);
        let mut map = Map::new();
        map.insert("fund_code".into(), Value::from(self.fund_code.clone()));
        map.insert(
            "fund_name".into(),
            self.fund_name.clone().map_or(Value::Null, Value::from),
        );
        map.insert(
            "holding_date".into(),
            self.holding_date
                .map_or(Value::Null, |d| Value::from(d.to_string())),
        );
        map.insert("status".into(), Value::from(self.status.as_str()));
        map.insert("estimated_change".into(), number(self.estimated_change));
        map.insert("top_holdings_weight".into(), number(self.top_holdings_weight));
        map.insert("position_amount".into(), number(Some(self.position_amount)));
        map.insert("estimated_profit".into(), number(self.estimated_profit));
        map
    }
}

/// A result together with the per-holding inputs it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationReport {
    pub result: EstimationResult,
    pub contributions: Vec<HoldingContribution>,
}

pub fn assemble(
    profile: &FundProfile,
    estimation: Estimation,
    position_amount: f64,
) -> EstimationReport {
    EstimationReport {
        result: EstimationResult {
            fund_code: profile.fund_code.clone(),
            fund_name: Some(profile.fund_name.clone()),
            holding_date: profile.holding_date,
            status: estimation.status,
            estimated_change: estimation.estimated_change,
            top_holdings_weight: estimation.top_holdings_weight,
            position_amount,
            estimated_profit: estimation.estimated_profit,
        },
        contributions: estimation.contributions,
    }
}

/// Result for a request that ended before anything could be estimated.
pub fn failure(fund_code: &str, position_amount: f64, err: &FundNavError) -> EstimationResult {
    let mut result = EstimationResult {
        fund_code: fund_code.to_string(),
        fund_name: None,
        holding_date: None,
        status: EstimationStatus::Error,
        estimated_change: None,
        top_holdings_weight: None,
        position_amount,
        estimated_profit: None,
    };
    match err {
        FundNavError::NotFound(_) => result.status = EstimationStatus::NotFound,
        FundNavError::NoHoldingsData {
            fund_name,
            holding_date,
            ..
        } => {
            result.status = EstimationStatus::NoHoldingsData;
            result.fund_name = fund_name.clone();
            result.holding_date = *holding_date;
        }
        _ => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fund::Holding;

    const FIELDS: [&str; 8] = [
        "fund_code",
        "fund_name",
        "holding_date",
        "status",
        "estimated_change",
        "top_holdings_weight",
        "position_amount",
        "estimated_profit",
    ];

    #[test]
    fn test_assemble_copies_profile_metadata() {
        let profile = FundProfile {
            fund_code: "005827".into(),
            fund_name: "Blue Chip".into(),
            holding_date: NaiveDate::from_ymd_opt(2024, 6, 30),
            holdings: vec![Holding {
                code: "600519".into(),
                name: "Moutai".into(),
                weight: 0.1,
                security_id: "sh600519".into(),
            }],
        };
        let estimation = Estimation {
            estimated_change: Some(1.5),
            top_holdings_weight: Some(10.0),
            estimated_profit: Some(15.0),
            status: EstimationStatus::Ok,
            contributions: Vec::new(),
        };

        let report = assemble(&profile, estimation, 1_000.0);
        assert_eq!(report.result.fund_name.as_deref(), Some("Blue Chip"));
        assert_eq!(report.result.holding_date, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(report.result.status, EstimationStatus::Ok);
        assert_eq!(report.result.position_amount, 1_000.0);
        assert_eq!(report.result.estimated_profit, Some(15.0));
    }

    #[test]
    fn test_failure_not_found_echoes_request() {
        let result = failure(
            "999999",
            2_500.0,
            &FundNavError::NotFound("999999".into()),
        );
        assert_eq!(result.status, EstimationStatus::NotFound);
        assert_eq!(result.fund_code, "999999");
        assert_eq!(result.position_amount, 2_500.0);
        assert_eq!(result.fund_name, None);
        assert_eq!(result.estimated_change, None);
        assert_eq!(result.top_holdings_weight, None);
        assert_eq!(result.estimated_profit, None);
    }

    #[test]
    fn test_failure_no_holdings_keeps_known_metadata() {
        let err = FundNavError::NoHoldingsData {
            fund_code: "000001".into(),
            fund_name: Some("Bond Fund".into()),
            holding_date: NaiveDate::from_ymd_opt(2024, 3, 31),
        };
        let result = failure("000001", 100.0, &err);
        assert_eq!(result.status, EstimationStatus::NoHoldingsData);
        assert_eq!(result.fund_name.as_deref(), Some("Bond Fund"));
        assert_eq!(result.holding_date, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(result.top_holdings_weight, None);
    }

    #[test]
    fn test_failure_other_errors_map_to_error_status() {
        let err = FundNavError::Unexpected("bad payload".into());
        assert_eq!(failure("000001", 1.0, &err).status, EstimationStatus::Error);
    }

    #[test]
    fn test_to_map_has_exactly_the_result_fields() {
        let result = failure("999999", 10.0, &FundNavError::NotFound("999999".into()));
        let map = result.to_map();

        assert_eq!(map.len(), FIELDS.len());
        for field in FIELDS {
            assert!(map.contains_key(field), "missing {field}");
        }
        assert_eq!(map["status"], Value::from("not_found"));
        assert_eq!(map["estimated_change"], Value::Null);
        assert_eq!(map["fund_name"], Value::Null);
        assert_eq!(map["position_amount"], Value::from(10.0));
    }

    #[test]
    fn test_fallback_map_matches_serialized_map() {
        let result = EstimationResult {
            fund_code: "005827".into(),
            fund_name: Some("Blue Chip".into()),
            holding_date: NaiveDate::from_ymd_opt(2024, 6, 30),
            status: EstimationStatus::Partial,
            estimated_change: Some(2.0),
            top_holdings_weight: Some(70.0),
            position_amount: 5_000.0,
            estimated_profit: Some(100.0),
        };
        assert_eq!(result.to_map(), result.fallback_map());
    }
}
