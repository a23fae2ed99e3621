//! Published NAV history with a time-bounded cache.

use crate::core::cache::{Cache, KeyedLocks};
use crate::core::error::FundNavError;
use crate::core::fund::{NavHistoryProvider, NavRecord, is_valid_fund_code};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct NavHistory {
    provider: Arc<dyn NavHistoryProvider>,
    cache: Arc<dyn Cache<String, Vec<NavRecord>>>,
    locks: Arc<KeyedLocks<String>>,
    ttl: std::time::Duration,
    timeout: std::time::Duration,
}

impl NavHistory {
    pub fn new(
        provider: Arc<dyn NavHistoryProvider>,
        cache: Arc<dyn Cache<String, Vec<NavRecord>>>,
        ttl: std::time::Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            locks: Arc::new(KeyedLocks::new()),
            ttl,
            timeout,
        }
    }

    /// The latest `days` published NAVs of a fund, newest first.
    pub async fn recent(
        &self,
        fund_code: &str,
        days: usize,
    ) -> Result<Vec<NavRecord>, FundNavError> {
        let fund_code = fund_code.trim();
        if !is_valid_fund_code(fund_code) {
            debug!("Rejecting malformed fund code: {:?}", fund_code);
            return Err(FundNavError::NotFound(fund_code.to_string()));
        }
        let key = fund_code.to_string();

        let records = match self.cache.get(&key).await {
            Some(records) => records,
            None => self.load(key).await?,
        };
        Ok(records.iter().rev().take(days).cloned().collect())
    }

    async fn load(&self, key: String) -> Result<Vec<NavRecord>, FundNavError> {
        let guard = self.locks.lock(&key).await;
        if let Some(records) = self.cache.get(&key).await {
            return Ok(records);
        }

        let provider = Arc::clone(&self.provider);
        let cache = Arc::clone(&self.cache);
        let ttl = self.ttl;
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, provider.fetch_nav_history(&key)).await {
                Ok(Ok(Some(records))) => {
                    debug!(records = records.len(), "Caching NAV history for {}", key);
                    cache.put(key, records.clone(), Some(ttl)).await;
                    Ok(records)
                }
                Ok(Ok(None)) => Err(FundNavError::NotFound(key)),
                Ok(Err(e)) => Err(FundNavError::from(e)),
                Err(_) => {
                    warn!("NAV history lookup timed out for {}", key);
                    Err(FundNavError::UpstreamTimeout {
                        source_name: "nav history".to_string(),
                    })
                }
            }
        });

        task.await
            .map_err(|e| FundNavError::Internal(format!("NAV history task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::store::memory::MemoryCache;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockNavProvider {
        records: Option<Vec<NavRecord>>,
        delay: Option<std::time::Duration>,
        call_count: AtomicUsize,
    }

    impl MockNavProvider {
        fn with_days(days: u32) -> Self {
            Self {
                records: Some(
                    (1..=days)
                        .map(|d| NavRecord {
                            date: NaiveDate::from_ymd_opt(2024, 7, d).unwrap(),
                            nav: 1.0 + f64::from(d) / 100.0,
                            accumulated_nav: None,
                            daily_change: Some(1.0),
                        })
                        .collect(),
                ),
                delay: None,
                call_count: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NavHistoryProvider for MockNavProvider {
        async fn fetch_nav_history(&self, _fund_code: &str) -> Result<Option<Vec<NavRecord>>> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.records.clone())
        }
    }

    fn setup(provider: Arc<MockNavProvider>) -> (NavHistory, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap());
        let cache = Arc::new(MemoryCache::<String, Vec<NavRecord>>::with_clock(Arc::new(
            clock.clone(),
        )));
        let history = NavHistory::new(
            provider,
            cache,
            std::time::Duration::from_secs(3600),
            std::time::Duration::from_millis(200),
        );
        (history, clock)
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let provider = Arc::new(MockNavProvider::with_days(5));
        let (history, _clock) = setup(provider);

        let records = history.recent("000186", 3).await.unwrap();
        let days: Vec<u32> = records.iter().map(|r| r.date.day()).collect();
        assert_eq!(days, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_history_cached_for_ttl() {
        let provider = Arc::new(MockNavProvider::with_days(5));
        let (history, clock) = setup(Arc::clone(&provider));

        history.recent("000186", 5).await.unwrap();
        clock.advance(Duration::minutes(59));
        history.recent("000186", 2).await.unwrap();
        assert_eq!(provider.calls(), 1);

        clock.advance(Duration::minutes(2));
        history.recent("000186", 2).await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_codes_are_not_found() {
        let provider = Arc::new(MockNavProvider {
            records: None,
            delay: None,
            call_count: AtomicUsize::new(0),
        });
        let (history, _clock) = setup(Arc::clone(&provider));

        let err = history.recent("999999", 10).await.unwrap_err();
        assert_eq!(err, FundNavError::NotFound("999999".into()));
        let err = history.recent("12ab", 10).await.unwrap_err();
        assert_eq!(err, FundNavError::NotFound("12ab".into()));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let provider = Arc::new(MockNavProvider {
            delay: Some(std::time::Duration::from_secs(5)),
            ..MockNavProvider::with_days(3)
        });
        let (history, _clock) = setup(provider);

        let err = history.recent("000186", 3).await.unwrap_err();
        assert!(matches!(err, FundNavError::UpstreamTimeout { .. }));
    }
}
