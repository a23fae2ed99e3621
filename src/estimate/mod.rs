//! The estimation pipeline: resolve the fund, price its holdings, estimate, assemble.

pub mod assembler;
pub mod engine;
pub mod fetcher;
pub mod history;
pub mod resolver;

pub use assembler::{EstimationReport, EstimationResult};
pub use engine::{EstimationStatus, HoldingContribution};
pub use fetcher::QuoteFetcher;
pub use history::NavHistory;
pub use resolver::{CachedProfile, FundResolver};

use crate::core::clock::{Clock, SystemClock};
use crate::core::config::{AppConfig, Position};
use crate::core::error::FundNavError;
use crate::core::fund::{FundDataProvider, NavHistoryProvider, NavRecord};
use crate::core::quote::{Quote, QuoteProvider};
use crate::providers::eastmoney::EastmoneyFundProvider;
use crate::providers::sina::SinaQuoteProvider;
use crate::providers::util::{build_client, retry_budget};
use crate::store::memory::MemoryCache;
use anyhow::Result;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Estimates intraday NAV changes of funds from their disclosed top holdings.
///
/// Cheap to clone; clones share the metadata, quote and NAV history caches.
#[derive(Clone)]
pub struct FundNavEstimator {
    resolver: Arc<FundResolver>,
    fetcher: Arc<QuoteFetcher>,
    history: Arc<NavHistory>,
}

impl FundNavEstimator {
    pub fn new(resolver: FundResolver, fetcher: QuoteFetcher, history: NavHistory) -> Self {
        Self {
            resolver: Arc::new(resolver),
            fetcher: Arc::new(fetcher),
            history: Arc::new(history),
        }
    }

    /// Wires the given providers to fresh in-memory caches driven by `clock`.
    ///
    /// Upstream lookups are bounded by the time the providers may spend retrying, not
    /// by a single request timeout.
    pub fn with_providers(
        fund_provider: Arc<dyn FundDataProvider>,
        quote_provider: Arc<dyn QuoteProvider>,
        nav_provider: Arc<dyn NavHistoryProvider>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let profile_cache = Arc::new(MemoryCache::<String, CachedProfile>::with_clock(
            Arc::clone(&clock),
        ));
        let quote_cache = Arc::new(MemoryCache::<String, Quote>::with_clock(Arc::clone(
            &clock,
        )));
        let history_cache = Arc::new(MemoryCache::<String, Vec<NavRecord>>::with_clock(
            Arc::clone(&clock),
        ));
        let upstream_budget = retry_budget(config.request_timeout());

        // A profile lookup may need a second round when the fund is missing from the
        // valuation feed.
        let resolver = FundResolver::new(
            fund_provider,
            profile_cache,
            Arc::clone(&clock),
            config.metadata_recheck(),
            upstream_budget.saturating_mul(2),
        );
        let fetcher = QuoteFetcher::new(
            quote_provider,
            quote_cache,
            clock,
            config.quote_ttl(),
            upstream_budget,
        );
        let history = NavHistory::new(
            nav_provider,
            history_cache,
            config.nav_history_ttl(),
            upstream_budget,
        );
        Self::new(resolver, fetcher, history)
    }

    /// Builds an estimator backed by Eastmoney disclosures and Sina quotes.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = build_client(config.request_timeout())?;
        let eastmoney = &config.providers.eastmoney;
        let fund_provider = Arc::new(EastmoneyFundProvider::new(
            &eastmoney.base_url,
            &eastmoney.fundgz_base_url,
            &eastmoney.pingzhongdata_base_url,
            client.clone(),
        )?);
        let quote_provider = SinaQuoteProvider::new(
            &config.providers.sina.base_url,
            client,
            config.providers.sina.max_batch_size,
        );

        Ok(Self::with_providers(
            Arc::clone(&fund_provider) as Arc<dyn FundDataProvider>,
            Arc::new(quote_provider),
            fund_provider,
            Arc::new(SystemClock),
            config,
        ))
    }

    /// Estimates the intraday NAV change of a fund and the profit it implies for a
    /// position of `position_amount`.
    ///
    /// Unknown funds, funds without disclosed holdings, missing quotes and upstream
    /// failures are all reported through [`EstimationResult::status`]. An error is
    /// returned only for a non-finite amount or an internal fault.
    pub async fn estimate_fund_nav(
        &self,
        fund_code: &str,
        position_amount: f64,
    ) -> Result<EstimationResult, FundNavError> {
        self.estimate_with_details(fund_code, position_amount)
            .await
            .map(|report| report.result)
    }

    /// Like [`estimate_fund_nav`](Self::estimate_fund_nav), also returning the
    /// per-holding inputs.
    #[instrument(name = "EstimateFundNav", skip(self), fields(fund_code = %fund_code))]
    pub async fn estimate_with_details(
        &self,
        fund_code: &str,
        position_amount: f64,
    ) -> Result<EstimationReport, FundNavError> {
        if !position_amount.is_finite() {
            return Err(FundNavError::InvalidInput(format!(
                "position amount must be a finite number, got {position_amount}"
            )));
        }
        let fund_code = fund_code.trim();

        let profile = match self.resolver.resolve(fund_code).await {
            Ok(profile) => profile,
            Err(e) => return early_exit(fund_code, position_amount, e),
        };

        let security_ids: BTreeSet<String> = profile
            .holdings
            .iter()
            .map(|h| h.security_id.clone())
            .collect();
        let quotes = match self.fetcher.fetch_quotes(&security_ids).await {
            Ok(quotes) => quotes,
            Err(e) => return early_exit(fund_code, position_amount, e),
        };

        let estimation = engine::estimate(&profile, &quotes, position_amount);
        let report = assembler::assemble(&profile, estimation, position_amount);
        info!(
            status = %report.result.status,
            estimated_change = ?report.result.estimated_change,
            "Estimated {}",
            report.result.fund_name.as_deref().unwrap_or(fund_code)
        );
        Ok(report)
    }

    /// Estimates several independent positions concurrently. Results come back in the
    /// order of `positions`.
    pub async fn estimate_batch(
        &self,
        positions: &[Position],
    ) -> Vec<Result<EstimationResult, FundNavError>> {
        self.estimate_batch_with_progress(positions, || {}).await
    }

    /// Like [`estimate_batch`](Self::estimate_batch), calling `on_done` as each
    /// position finishes.
    pub async fn estimate_batch_with_progress<F>(
        &self,
        positions: &[Position],
        on_done: F,
    ) -> Vec<Result<EstimationResult, FundNavError>>
    where
        F: Fn() + Sync,
    {
        debug!("Estimating {} positions", positions.len());
        let on_done = &on_done;
        join_all(positions.iter().map(|p| async move {
            let result = self.estimate_fund_nav(&p.fund_code, p.amount).await;
            on_done();
            result
        }))
        .await
    }

    /// The latest `days` published NAVs of a fund, newest first.
    ///
    /// Unlike estimates, lookup failures are returned as errors since there is no
    /// result to carry a status.
    #[instrument(name = "NavHistory", skip(self), fields(fund_code = %fund_code))]
    pub async fn nav_history(
        &self,
        fund_code: &str,
        days: usize,
    ) -> Result<Vec<NavRecord>, FundNavError> {
        if days == 0 {
            return Err(FundNavError::InvalidInput(
                "days must be at least 1".to_string(),
            ));
        }
        self.history.recent(fund_code, days).await
    }
}

fn early_exit(
    fund_code: &str,
    position_amount: f64,
    err: FundNavError,
) -> Result<EstimationReport, FundNavError> {
    if err.is_fatal() {
        return Err(err);
    }
    match &err {
        FundNavError::NotFound(_) | FundNavError::NoHoldingsData { .. } => {
            debug!("No estimate for {}: {}", fund_code, err)
        }
        _ => warn!(error = %err, "Estimation failed for {}", fund_code),
    }
    Ok(EstimationReport {
        result: assembler::failure(fund_code, position_amount, &err),
        contributions: Vec::new(),
    })
}
