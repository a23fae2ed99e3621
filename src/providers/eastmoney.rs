use super::util::{RETRIES, RETRY_DELAY_MS, with_retry};
use crate::core::fund::{
    FundDataProvider, FundProfile, Holding, NavHistoryProvider, NavRecord, security_id,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use regex::Regex;
use reqwest::header::REFERER;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};

/// Fund names, top-10 stock holdings and NAV history from Eastmoney's fund pages.
pub struct EastmoneyFundProvider {
    base_url: String,
    fundgz_base_url: String,
    pingzhongdata_base_url: String,
    client: reqwest::Client,
    patterns: PagePatterns,
}

struct PagePatterns {
    row: Regex,
    cell: Regex,
    tag: Regex,
    market_link: Regex,
    report_date: Regex,
    fund_name: Regex,
    listed_name: Regex,
    net_worth_trend: Regex,
    accumulated_worth_trend: Regex,
}

impl PagePatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            row: Regex::new(r"(?s)<tr>(.*?)</tr>")?,
            cell: Regex::new(r"(?s)<td[^>]*>(.*?)</td>")?,
            tag: Regex::new(r"<[^>]*>")?,
            market_link: Regex::new(r"unify/r/(\d+)\.([A-Za-z0-9.]+)")?,
            report_date: Regex::new(r"px12'>\s*(\d{4}-\d{2}-\d{2})\s*<")?,
            fund_name: Regex::new(r"(?s)<label class='left'>\s*<a[^>]*>(.*?)</a>")?,
            listed_name: Regex::new(r#"var\s+fS_name\s*=\s*"([^"]*)""#)?,
            net_worth_trend: Regex::new(r"(?s)var\s+Data_netWorthTrend\s*=\s*(\[.*?\]);")?,
            accumulated_worth_trend: Regex::new(
                r"(?s)var\s+Data_ACWorthTrend\s*=\s*(\[.*?\]);",
            )?,
        })
    }

    fn strip_tags(&self, html: &str) -> String {
        self.tag
            .replace_all(html, "")
            .replace("&nbsp;", " ")
            .trim()
            .to_string()
    }
}

/// The latest disclosure section of a holdings page.
#[derive(Debug, Default, PartialEq)]
struct HoldingsDisclosure {
    fund_name: Option<String>,
    report_date: Option<NaiveDate>,
    holdings: Vec<Holding>,
}

#[derive(Debug, Deserialize)]
struct FundGzResponse {
    fundcode: String,
    name: String,
}

impl EastmoneyFundProvider {
    pub fn new(
        base_url: &str,
        fundgz_base_url: &str,
        pingzhongdata_base_url: &str,
        client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fundgz_base_url: fundgz_base_url.trim_end_matches('/').to_string(),
            pingzhongdata_base_url: pingzhongdata_base_url.trim_end_matches('/').to_string(),
            client,
            patterns: PagePatterns::new().context("Failed to compile page patterns")?,
        })
    }

    /// Looks the fund up in the realtime valuation feed, which answers `jsonpgz();` for
    /// codes it does not know.
    async fn fetch_fund_name(&self, fund_code: &str) -> Result<Option<String>> {
        let url = format!("{}/js/{}.js", self.fundgz_base_url, fund_code);
        debug!("Requesting fund name from {}", url);

        let response = with_retry(
            || async { self.client.get(&url).send().await },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .with_context(|| format!("Failed to send fund lookup for: {fund_code}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response
            .error_for_status()
            .with_context(|| format!("Fund lookup failed for: {fund_code}"))?
            .text()
            .await
            .with_context(|| format!("Failed to get fund lookup text for: {fund_code}"))?;

        let Some(payload) = extract_jsonpgz_payload(&text) else {
            return Ok(None);
        };
        let gz: FundGzResponse = serde_json::from_str(payload).with_context(|| {
            format!("Failed to parse fund lookup for: {fund_code}. Response: '{text}'")
        })?;

        if gz.fundcode.trim() != fund_code || gz.name.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(gz.name.trim().to_string()))
    }

    async fn fetch_disclosure(&self, fund_code: &str) -> Result<HoldingsDisclosure> {
        let url = format!(
            "{}/FundArchivesDatas.aspx?type=jjcc&code={}&topline=10",
            self.base_url, fund_code
        );
        let referer = format!("{}/ccmx_{}.html", self.base_url, fund_code);
        debug!("Requesting holdings from {}", url);

        let response = with_retry(
            || async {
                self.client
                    .get(&url)
                    .header(REFERER, referer.as_str())
                    .send()
                    .await?
                    .error_for_status()
            },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .with_context(|| format!("Failed to fetch holdings for fund: {fund_code}"))?;

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to get holdings text for fund: {fund_code}"))?;

        self.parse_disclosure(&text).inspect_err(|e| {
            error!(
                error = ?e,
                fund_code = %fund_code,
                "Failed to parse holdings response"
            );
        })
    }

    /// Downloads the fund's `pingzhongdata` script, which lists every fund Eastmoney
    /// tracks whether or not it holds stocks.
    async fn fetch_pingzhongdata(&self, fund_code: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/pingzhongdata/{}.js",
            self.pingzhongdata_base_url, fund_code
        );
        debug!("Requesting fund data from {}", url);

        let response = with_retry(
            || async { self.client.get(&url).send().await },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .with_context(|| format!("Failed to send fund data request for: {fund_code}"))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response
            .error_for_status()
            .with_context(|| format!("Fund data request failed for: {fund_code}"))?
            .text()
            .await
            .with_context(|| format!("Failed to get fund data text for: {fund_code}"))?;
        Ok(Some(text))
    }

    fn parse_listed_name(&self, script: &str) -> Option<String> {
        self.patterns
            .listed_name
            .captures(script)
            .map(|c| c[1].trim().to_string())
            .filter(|name| !name.is_empty())
    }

    /// Reads `Data_netWorthTrend` (unit NAV and daily change) joined with
    /// `Data_ACWorthTrend` (accumulated NAV) on their timestamps.
    fn parse_nav_history(&self, script: &str) -> Result<Vec<NavRecord>> {
        let Some(unit) = self.patterns.net_worth_trend.captures(script) else {
            return Ok(Vec::new());
        };
        let points: Vec<Value> =
            serde_json::from_str(&unit[1]).context("Failed to parse unit NAV trend")?;

        let accumulated: HashMap<i64, f64> = self
            .patterns
            .accumulated_worth_trend
            .captures(script)
            .and_then(|c| serde_json::from_str::<Vec<Value>>(&c[1]).ok())
            .unwrap_or_default()
            .iter()
            .filter_map(|point| {
                let pair = point.as_array()?;
                Some((pair.first()?.as_i64()?, number(pair.get(1)?)?))
            })
            .collect();

        let mut records: Vec<NavRecord> = points
            .iter()
            .filter_map(|point| {
                let x = point.get("x")?.as_i64()?;
                let nav = number(point.get("y")?)?;
                Some(NavRecord {
                    date: nav_date(x)?,
                    nav,
                    accumulated_nav: accumulated.get(&x).copied(),
                    daily_change: point.get("equityReturn").and_then(number),
                })
            })
            .collect();
        records.sort_by_key(|r| r.date);
        records.dedup_by_key(|r| r.date);
        Ok(records)
    }

    fn parse_disclosure(&self, body: &str) -> Result<HoldingsDisclosure> {
        let content = extract_apidata_content(body)
            .ok_or_else(|| anyhow!("Holdings response has no content field"))?;

        // Sections are ordered newest first; only the latest report counts.
        let Some(latest) = content
            .split("<div class='box'>")
            .find(|section| section.contains("<tbody>"))
        else {
            return Ok(HoldingsDisclosure::default());
        };

        let fund_name = self
            .patterns
            .fund_name
            .captures(latest)
            .map(|c| self.patterns.strip_tags(&c[1]))
            .filter(|name| !name.is_empty());

        let report_date = self
            .patterns
            .report_date
            .captures(latest)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok());

        let body = latest
            .split_once("<tbody>")
            .map(|(_, rest)| rest)
            .unwrap_or(latest);

        let mut holdings = Vec::new();
        for row in self.patterns.row.captures_iter(body) {
            let row_html = &row[1];
            let cells: Vec<String> = self
                .patterns
                .cell
                .captures_iter(row_html)
                .map(|c| self.patterns.strip_tags(&c[1]))
                .collect();
            if cells.len() < 4 {
                continue;
            }

            let market_id = self
                .patterns
                .market_link
                .captures(row_html)
                .map(|c| c[1].to_string());
            let code = cells[1].clone();
            if code.is_empty() {
                continue;
            }

            // The weight column moves depending on whether price columns are present,
            // so take the first percentage after the name.
            let Some(weight) = cells[3..].iter().find_map(|cell| parse_percent(cell)) else {
                warn!(code = %code, "Skipping holding without a weight");
                continue;
            };

            holdings.push(Holding {
                security_id: security_id(market_id.as_deref(), &code),
                code,
                name: cells[2].clone(),
                weight: weight / 100.0,
            });
        }

        Ok(HoldingsDisclosure {
            fund_name,
            report_date,
            holdings,
        })
    }
}

fn extract_jsonpgz_payload(text: &str) -> Option<&str> {
    let text = text.trim();
    let start = text.find("jsonpgz(")? + "jsonpgz(".len();
    let end = text.rfind(')')?;
    if end <= start {
        return None;
    }
    let payload = text[start..end].trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Pulls the HTML out of `var apidata={ content:"...",arryear:[...],curyear:...};`.
/// The markup only uses single quotes, so the next double quote ends it.
fn extract_apidata_content(body: &str) -> Option<&str> {
    let start = body.find("content:")?;
    let rest = &body[start + "content:".len()..];
    let open = rest.find('"')?;
    let rest = &rest[open + 1..];
    let close = rest.find('"')?;
    Some(&rest[..close])
}

/// Trend timestamps mark midnight in China Standard Time.
fn nav_date(timestamp_ms: i64) -> Option<NaiveDate> {
    let at = DateTime::from_timestamp_millis(timestamp_ms)?;
    Some((at + Duration::hours(8)).date_naive())
}

/// Accepts both JSON numbers and numeric strings.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn parse_percent(cell: &str) -> Option<f64> {
    let value = cell.trim().strip_suffix('%')?.replace(',', "");
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[async_trait]
impl FundDataProvider for EastmoneyFundProvider {
    #[instrument(name = "EastmoneyProfileFetch", skip(self), fields(fund_code = %fund_code))]
    async fn fetch_profile(&self, fund_code: &str) -> Result<Option<FundProfile>> {
        let (name, disclosure) = futures::join!(
            self.fetch_fund_name(fund_code),
            self.fetch_disclosure(fund_code)
        );
        let disclosure = disclosure?;
        let name = match name {
            Ok(name) => name,
            // Holdings alone are enough to know the fund exists.
            Err(e) if !disclosure.holdings.is_empty() => {
                warn!(error = %e, "Fund name lookup failed, using holdings page title");
                None
            }
            Err(e) => return Err(e),
        };

        // Bond and money market funds hold no stocks and are often missing from the
        // valuation feed, so confirm unknown codes against the fund listing.
        let name = match name {
            None if disclosure.holdings.is_empty() => self
                .fetch_pingzhongdata(fund_code)
                .await?
                .and_then(|script| self.parse_listed_name(&script)),
            name => name,
        };
        if name.is_none() && disclosure.holdings.is_empty() {
            debug!("Fund {} not found upstream", fund_code);
            return Ok(None);
        }

        let fund_name = name
            .or(disclosure.fund_name)
            .unwrap_or_else(|| fund_code.to_string());

        debug!(
            holdings = disclosure.holdings.len(),
            holding_date = ?disclosure.report_date,
            "Fetched profile for {}",
            fund_name
        );

        Ok(Some(FundProfile {
            fund_code: fund_code.to_string(),
            fund_name,
            holding_date: disclosure.report_date,
            holdings: disclosure.holdings,
        }))
    }
}

#[async_trait]
impl NavHistoryProvider for EastmoneyFundProvider {
    #[instrument(name = "EastmoneyNavHistoryFetch", skip(self), fields(fund_code = %fund_code))]
    async fn fetch_nav_history(&self, fund_code: &str) -> Result<Option<Vec<NavRecord>>> {
        let Some(script) = self.fetch_pingzhongdata(fund_code).await? else {
            debug!("No fund data for {}", fund_code);
            return Ok(None);
        };
        let records = self.parse_nav_history(&script).inspect_err(|e| {
            error!(
                error = ?e,
                fund_code = %fund_code,
                "Failed to parse NAV history"
            );
        })?;
        if records.is_empty() && self.parse_listed_name(&script).is_none() {
            debug!("Fund {} not found upstream", fund_code);
            return Ok(None);
        }

        debug!(records = records.len(), "Fetched NAV history");
        Ok(Some(records))
    }
}
