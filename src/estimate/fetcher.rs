//! Quote lookups with a freshness cache in front of the upstream source.

use crate::core::cache::{Cache, KeyedLocks};
use crate::core::clock::Clock;
use crate::core::error::FundNavError;
use crate::core::market::MarketSession;
use crate::core::quote::{Quote, QuoteProvider};
use chrono::Duration;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QuoteFetcher {
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<dyn Cache<String, Quote>>,
    /// Per-id locks so racing misses on the same id collapse into one lookup.
    locks: Arc<KeyedLocks<String>>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    timeout: std::time::Duration,
}

impl QuoteFetcher {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        cache: Arc<dyn Cache<String, Quote>>,
        clock: Arc<dyn Clock>,
        freshness: std::time::Duration,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            locks: Arc::new(KeyedLocks::new()),
            clock,
            freshness: Duration::from_std(freshness).unwrap_or(Duration::seconds(30)),
            timeout,
        }
    }

    /// Returns one quote per requested id, marking the ones that could not be priced
    /// as unavailable.
    pub async fn fetch_quotes(
        &self,
        security_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, Quote>, FundNavError> {
        let mut quotes = HashMap::with_capacity(security_ids.len());
        let mut misses = Vec::new();
        for id in security_ids {
            match self.cache.get(id).await {
                Some(quote) => {
                    quotes.insert(id.clone(), quote);
                }
                None => misses.push(id.clone()),
            }
        }

        if !misses.is_empty() {
            debug!(
                hits = quotes.len(),
                misses = misses.len(),
                "Fetching quotes upstream"
            );
            let refresh = QuoteRefresh {
                provider: Arc::clone(&self.provider),
                cache: Arc::clone(&self.cache),
                locks: Arc::clone(&self.locks),
                clock: Arc::clone(&self.clock),
                freshness: self.freshness,
                timeout: self.timeout,
            };
            // Spawned so that an abandoned request still populates the cache.
            let fetched = tokio::spawn(refresh.run(misses))
                .await
                .map_err(|e| FundNavError::Internal(format!("Quote fetch task failed: {e}")))?;
            quotes.extend(fetched);
        }

        let now = self.clock.now();
        for id in security_ids {
            quotes
                .entry(id.clone())
                .or_insert_with(|| Quote::unavailable(id, now));
        }
        Ok(quotes)
    }
}

struct QuoteRefresh {
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<dyn Cache<String, Quote>>,
    locks: Arc<KeyedLocks<String>>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    timeout: std::time::Duration,
}

impl QuoteRefresh {
    /// How long a quote may be served from cache, judged by its own exchange.
    fn ttl_for(
        &self,
        id: &str,
        quote: &Quote,
        now: chrono::DateTime<chrono::Utc>,
    ) -> std::time::Duration {
        // The source answered, so even unresolvable ids are cached for the freshness
        // window.
        let ttl = if quote.available {
            MarketSession::for_security(id).quote_ttl(now, self.freshness)
        } else {
            self.freshness
        };
        ttl.to_std().unwrap_or(std::time::Duration::from_secs(30))
    }

    async fn run(self, mut ids: Vec<String>) -> HashMap<String, Quote> {
        // Locks are taken in sorted order so overlapping requests cannot deadlock.
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.locks.lock(id).await);
        }

        let mut quotes = HashMap::with_capacity(ids.len());
        let mut pending = Vec::new();
        for id in ids {
            match self.cache.get(&id).await {
                Some(quote) => {
                    quotes.insert(id, quote);
                }
                None => pending.push(id),
            }
        }
        if pending.is_empty() {
            return quotes;
        }

        let provider = &self.provider;
        let timeout = self.timeout;
        let batch_size = provider.max_batch_size().max(1);
        let batches = pending.chunks(batch_size).map(|batch| async move {
            let result = tokio::time::timeout(timeout, provider.fetch_batch(batch)).await;
            (batch, result)
        });

        for (batch, result) in join_all(batches).await {
            let now = self.clock.now();
            match result {
                Ok(Ok(mut fetched)) => {
                    for id in batch {
                        let quote = fetched
                            .remove(id)
                            .unwrap_or_else(|| Quote::unavailable(id, now));
                        let ttl = self.ttl_for(id, &quote, now);
                        self.cache.put(id.clone(), quote.clone(), Some(ttl)).await;
                        quotes.insert(id.clone(), quote);
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, size = batch.len(), "Quote batch failed");
                    for id in batch {
                        quotes.insert(id.clone(), Quote::unavailable(id, now));
                    }
                }
                Err(_) => {
                    warn!(size = batch.len(), "Quote batch timed out");
                    for id in batch {
                        quotes.insert(id.clone(), Quote::unavailable(id, now));
                    }
                }
            }
        }
        quotes
    }
}
