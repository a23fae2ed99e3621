//! Fund metadata resolution with a disclosure-aware cache.

use crate::core::cache::{Cache, KeyedLocks};
use crate::core::clock::Clock;
use crate::core::error::FundNavError;
use crate::core::fund::{FundDataProvider, FundProfile, is_valid_fund_code};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A cached profile and when it was last confirmed against upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedProfile {
    pub profile: FundProfile,
    pub checked_at: DateTime<Utc>,
}

pub struct FundResolver {
    provider: Arc<dyn FundDataProvider>,
    cache: Arc<dyn Cache<String, CachedProfile>>,
    locks: Arc<KeyedLocks<String>>,
    clock: Arc<dyn Clock>,
    recheck_after: Duration,
    timeout: std::time::Duration,
}

impl FundResolver {
    pub fn new(
        provider: Arc<dyn FundDataProvider>,
        cache: Arc<dyn Cache<String, CachedProfile>>,
        clock: Arc<dyn Clock>,
        recheck_after: std::time::Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            locks: Arc::new(KeyedLocks::new()),
            clock,
            recheck_after: Duration::from_std(recheck_after).unwrap_or(Duration::hours(6)),
            timeout,
        }
    }

    /// Resolves a fund code to its profile.
    ///
    /// Fails with [`FundNavError::NotFound`] for malformed or unknown codes and with
    /// [`FundNavError::NoHoldingsData`] when the fund discloses no holdings.
    pub async fn resolve(&self, fund_code: &str) -> Result<FundProfile, FundNavError> {
        let fund_code = fund_code.trim();
        if !is_valid_fund_code(fund_code) {
            debug!("Rejecting malformed fund code: {:?}", fund_code);
            return Err(FundNavError::NotFound(fund_code.to_string()));
        }
        let key = fund_code.to_string();

        if let Some(profile) = self.fresh(&key).await {
            return with_holdings(profile);
        }

        let guard = self.locks.lock(&key).await;
        // Another request may have refreshed the entry while we waited.
        if let Some(profile) = self.fresh(&key).await {
            return with_holdings(profile);
        }

        // The refresh owns the lock and writes the cache itself, so it completes even
        // if this caller goes away.
        let provider = Arc::clone(&self.provider);
        let cache = Arc::clone(&self.cache);
        let clock = Arc::clone(&self.clock);
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            let _guard = guard;
            refresh(provider, cache, clock, key, timeout).await
        });

        let profile = task
            .await
            .map_err(|e| FundNavError::Internal(format!("Profile refresh task failed: {e}")))??;
        with_holdings(profile)
    }

    async fn fresh(&self, key: &String) -> Option<FundProfile> {
        let entry = self.cache.get(key).await?;
        let age = self.clock.now() - entry.checked_at;
        (age < self.recheck_after).then_some(entry.profile)
    }
}

async fn refresh(
    provider: Arc<dyn FundDataProvider>,
    cache: Arc<dyn Cache<String, CachedProfile>>,
    clock: Arc<dyn Clock>,
    fund_code: String,
    timeout: std::time::Duration,
) -> Result<FundProfile, FundNavError> {
    let cached = cache.get(&fund_code).await;
    let fetched = match tokio::time::timeout(timeout, provider.fetch_profile(&fund_code)).await {
        Ok(result) => result.map_err(FundNavError::from),
        Err(_) => Err(FundNavError::UpstreamTimeout {
            source_name: "fund metadata".to_string(),
        }),
    };

    match (fetched, cached) {
        (Ok(Some(profile)), Some(entry)) if profile.holding_date < entry.profile.holding_date => {
            debug!(
                upstream = ?profile.holding_date,
                cached = ?entry.profile.holding_date,
                "Upstream disclosure older than cache, keeping cached profile"
            );
            store(&cache, &clock, entry.profile.clone()).await;
            Ok(entry.profile)
        }
        (Ok(Some(profile)), cached) => {
            if let Some(entry) = cached
                && entry.profile.holding_date != profile.holding_date
            {
                debug!(
                    from = ?entry.profile.holding_date,
                    to = ?profile.holding_date,
                    "New disclosure for {}",
                    fund_code
                );
            }
            store(&cache, &clock, profile.clone()).await;
            Ok(profile)
        }
        (Ok(None), Some(entry)) => {
            warn!("Fund {} missing upstream, serving cached profile", fund_code);
            Ok(entry.profile)
        }
        (Ok(None), None) => Err(FundNavError::NotFound(fund_code)),
        (Err(e), Some(entry)) => {
            warn!(error = %e, "Profile refresh failed for {}, serving cached profile", fund_code);
            Ok(entry.profile)
        }
        (Err(FundNavError::UpstreamTimeout { .. }), None) => {
            warn!("Fund metadata lookup timed out for {}", fund_code);
            Err(FundNavError::NotFound(fund_code))
        }
        (Err(e), None) => Err(e),
    }
}

async fn store(
    cache: &Arc<dyn Cache<String, CachedProfile>>,
    clock: &Arc<dyn Clock>,
    profile: FundProfile,
) {
    let entry = CachedProfile {
        checked_at: clock.now(),
        profile,
    };
    cache.put(entry.profile.fund_code.clone(), entry, None).await;
}

fn with_holdings(profile: FundProfile) -> Result<FundProfile, FundNavError> {
    if profile.holdings.is_empty() {
        return Err(FundNavError::NoHoldingsData {
            fund_code: profile.fund_code,
            fund_name: Some(profile.fund_name),
            holding_date: profile.holding_date,
        });
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::fund::Holding;
    use crate::store::memory::MemoryCache;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockFundProvider {
        profiles: Mutex<HashMap<String, FundProfile>>,
        fail: Mutex<bool>,
        delay: Option<std::time::Duration>,
        call_count: AtomicUsize,
    }

    impl MockFundProvider {
        fn with(profile: FundProfile) -> Self {
            let provider = Self::default();
            provider.set(profile);
            provider
        }

        fn set(&self, profile: FundProfile) {
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.fund_code.clone(), profile);
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FundDataProvider for MockFundProvider {
        async fn fetch_profile(&self, fund_code: &str) -> Result<Option<FundProfile>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail.lock().unwrap() {
                return Err(anyhow!("upstream exploded"));
            }
            Ok(self.profiles.lock().unwrap().get(fund_code).cloned())
        }
    }

    fn profile(date: (i32, u32, u32), holdings: usize) -> FundProfile {
        FundProfile {
            fund_code: "005827".into(),
            fund_name: "Blue Chip".into(),
            holding_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            holdings: (0..holdings)
                .map(|i| Holding {
                    code: format!("60000{i}"),
                    name: format!("Stock {i}"),
                    weight: 0.05,
                    security_id: format!("sh60000{i}"),
                })
                .collect(),
        }
    }

    fn setup(provider: Arc<MockFundProvider>) -> (FundResolver, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 2, 0, 0).unwrap());
        let cache = Arc::new(MemoryCache::<String, CachedProfile>::with_clock(Arc::new(
            clock.clone(),
        )));
        let resolver = FundResolver::new(
            provider,
            cache,
            Arc::new(clock.clone()),
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_millis(200),
        );
        (resolver, clock)
    }

    #[tokio::test]
    async fn test_resolve_and_cache_hit() {
        let provider = Arc::new(MockFundProvider::with(profile((2024, 3, 31), 3)));
        let (resolver, _clock) = setup(Arc::clone(&provider));

        let first = resolver.resolve("005827").await.unwrap();
        let second = resolver.resolve(" 005827 ").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.holdings.len(), 3);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_code_is_not_found_without_lookup() {
        let provider = Arc::new(MockFundProvider::default());
        let (resolver, _clock) = setup(Arc::clone(&provider));

        for code in ["", "   ", "12345", "abcdef"] {
            let err = resolver.resolve(code).await.unwrap_err();
            assert!(matches!(err, FundNavError::NotFound(_)), "{code:?}");
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_fund_is_not_found() {
        let provider = Arc::new(MockFundProvider::default());
        let (resolver, _clock) = setup(provider);

        let err = resolver.resolve("000000").await.unwrap_err();
        assert_eq!(err, FundNavError::NotFound("000000".into()));
    }

    #[tokio::test]
    async fn test_no_holdings_is_distinct_from_not_found() {
        let provider = Arc::new(MockFundProvider::with(profile((2024, 3, 31), 0)));
        let (resolver, _clock) = setup(provider);

        let err = resolver.resolve("005827").await.unwrap_err();
        assert_eq!(
            err,
            FundNavError::NoHoldingsData {
                fund_code: "005827".into(),
                fund_name: Some("Blue Chip".into()),
                holding_date: NaiveDate::from_ymd_opt(2024, 3, 31),
            }
        );
    }

    #[tokio::test]
    async fn test_newer_disclosure_replaces_cache_after_recheck() {
        let provider = Arc::new(MockFundProvider::with(profile((2024, 3, 31), 2)));
        let (resolver, clock) = setup(Arc::clone(&provider));

        resolver.resolve("005827").await.unwrap();
        provider.set(profile((2024, 6, 30), 4));

        // Still inside the recheck window: cached snapshot served.
        clock.advance(Duration::minutes(30));
        let cached = resolver.resolve("005827").await.unwrap();
        assert_eq!(cached.holdings.len(), 2);
        assert_eq!(provider.calls(), 1);

        clock.advance(Duration::minutes(31));
        let refreshed = resolver.resolve("005827").await.unwrap();
        assert_eq!(refreshed.holding_date, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(refreshed.holdings.len(), 4);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_older_upstream_snapshot_never_replaces_cache() {
        let provider = Arc::new(MockFundProvider::with(profile((2024, 6, 30), 4)));
        let (resolver, clock) = setup(Arc::clone(&provider));

        resolver.resolve("005827").await.unwrap();
        provider.set(profile((2024, 3, 31), 2));
        clock.advance(Duration::hours(2));

        let resolved = resolver.resolve("005827").await.unwrap();
        assert_eq!(resolved.holding_date, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_serves_stale_profile() {
        let provider = Arc::new(MockFundProvider::with(profile((2024, 3, 31), 2)));
        let (resolver, clock) = setup(Arc::clone(&provider));

        resolver.resolve("005827").await.unwrap();
        *provider.fail.lock().unwrap() = true;
        clock.advance(Duration::hours(2));

        let resolved = resolver.resolve("005827").await.unwrap();
        assert_eq!(resolved.holdings.len(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_is_unexpected() {
        let provider = Arc::new(MockFundProvider::default());
        *provider.fail.lock().unwrap() = true;
        let (resolver, _clock) = setup(provider);

        let err = resolver.resolve("005827").await.unwrap_err();
        assert!(matches!(err, FundNavError::Unexpected(msg) if msg.contains("upstream exploded")));
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_not_found() {
        let provider = Arc::new(MockFundProvider {
            delay: Some(std::time::Duration::from_secs(5)),
            ..MockFundProvider::with(profile((2024, 3, 31), 2))
        });
        let (resolver, _clock) = setup(provider);

        let err = resolver.resolve("005827").await.unwrap_err();
        assert_eq!(err, FundNavError::NotFound("005827".into()));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_fetch() {
        let provider = Arc::new(MockFundProvider {
            delay: Some(std::time::Duration::from_millis(50)),
            ..MockFundProvider::with(profile((2024, 3, 31), 2))
        });
        let (resolver, _clock) = setup(Arc::clone(&provider));
        let resolver = Arc::new(resolver);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.resolve("005827").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(provider.calls(), 1);
    }
}
