use super::util::{RETRIES, RETRY_DELAY_MS, with_retry};
use crate::core::quote::{Quote, QuoteProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::header::REFERER;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

const SINA_REFERER: &str = "https://finance.sina.com.cn/";

/// Batched intraday quotes from Sina's `hq` endpoint.
pub struct SinaQuoteProvider {
    base_url: String,
    client: reqwest::Client,
    max_batch_size: usize,
}

impl SinaQuoteProvider {
    pub fn new(base_url: &str, client: reqwest::Client, max_batch_size: usize) -> Self {
        SinaQuoteProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            max_batch_size: max_batch_size.max(1),
        }
    }
}

/// Converts a China Standard Time wall clock reading to UTC.
fn cst_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(local - Duration::hours(8), Utc)
}

fn parse_cst(date: &str, date_fmt: &str, time: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date.trim(), date_fmt).ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
        .ok()?;
    Some(cst_to_utc(date.and_time(time)))
}

fn field(data: &[&str], index: usize) -> Option<f64> {
    data.get(index)?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses the comma separated payload for one symbol.
///
/// The layout depends on the market prefix of the symbol.
fn parse_quote(security_id: &str, payload: &str, fetched_at: DateTime<Utc>) -> Quote {
    let data: Vec<&str> = payload.split(',').collect();
    if payload.trim().is_empty() {
        return Quote::unavailable(security_id, fetched_at);
    }

    let parsed = if security_id.starts_with("rt_hk") {
        // en name, name, open, prev close, high, low, last, change, change %, ... date, time
        field(&data, 6).filter(|p| *p > 0.0).zip(field(&data, 8)).map(|(price, change)| {
            let as_of = data
                .get(17)
                .zip(data.get(18))
                .and_then(|(d, t)| parse_cst(d, "%Y/%m/%d", t));
            (data.get(1).copied(), price, change, as_of)
        })
    } else if security_id.starts_with("gb_") {
        // name, price, change %, "YYYY-mm-dd HH:MM:SS" in Beijing time, ...
        field(&data, 1).filter(|p| *p > 0.0).zip(field(&data, 2)).map(|(price, change)| {
            let as_of = data.get(3).and_then(|dt| {
                let (d, t) = dt.trim().split_once(' ')?;
                parse_cst(d, "%Y-%m-%d", t)
            });
            (data.first().copied(), price, change, as_of)
        })
    } else {
        // name, open, prev close, price, high, low, ... field 30 date, field 31 time
        field(&data, 2)
            .filter(|p| *p > 0.0)
            .zip(field(&data, 3).filter(|p| *p > 0.0))
            .map(|(prev_close, price)| {
                let as_of = data
                    .get(30)
                    .zip(data.get(31))
                    .and_then(|(d, t)| parse_cst(d, "%Y-%m-%d", t));
                let change = (price - prev_close) / prev_close * 100.0;
                (data.first().copied(), price, change, as_of)
            })
    };

    match parsed {
        Some((name, price, change, as_of)) => Quote {
            security_id: security_id.to_string(),
            name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            price: Some(price),
            percent_change: change,
            as_of: as_of.unwrap_or(fetched_at),
            available: true,
        },
        None => {
            debug!("No tradable price in quote for {}", security_id);
            Quote::unavailable(security_id, fetched_at)
        }
    }
}

/// Splits the `var hq_str_<symbol>="...";` lines of a response.
fn parse_response(text: &str, fetched_at: DateTime<Utc>) -> HashMap<String, Quote> {
    text.lines()
        .filter_map(|line| {
            let (lhs, rhs) = line.split_once('=')?;
            let security_id = lhs.trim().trim_start_matches("var ").trim_start_matches("hq_str_");
            if security_id.is_empty() {
                return None;
            }
            let payload = rhs.trim().trim_end_matches(';').trim_matches('"');
            Some((
                security_id.to_string(),
                parse_quote(security_id, payload, fetched_at),
            ))
        })
        .collect()
}

#[async_trait]
impl QuoteProvider for SinaQuoteProvider {
    #[instrument(name = "SinaQuoteFetch", skip(self, security_ids), fields(count = security_ids.len()))]
    async fn fetch_batch(&self, security_ids: &[String]) -> Result<HashMap<String, Quote>> {
        if security_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/list={}", self.base_url, security_ids.join(","));
        debug!("Requesting quotes from {}", url);

        let response = with_retry(
            || async {
                self.client
                    .get(&url)
                    .header(REFERER, SINA_REFERER)
                    .send()
                    .await?
                    .error_for_status()
            },
            RETRIES,
            RETRY_DELAY_MS,
        )
        .await
        .with_context(|| format!("Quote request failed for: {}", security_ids.join(",")))?;

        let text = response
            .text_with_charset("gbk")
            .await
            .context("Failed to read quote response")?;

        let quotes = parse_response(&text, Utc::now());
        let missing = security_ids
            .iter()
            .filter(|id| !quotes.contains_key(*id))
            .count();
        if missing > 0 {
            warn!(missing, "Quote response omitted some symbols");
        }
        Ok(quotes)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
