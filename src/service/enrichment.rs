use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::models::EarningsEvent;
use crate::service::caching::collections::market_caps;
use crate::service::caching::Cache;
use crate::service::finance::{Fetch, MarketCapProvider};
use crate::service::storage::EarningsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentConfig {
    /// Distinct tickers looked up per call; the rest stay null.
    pub max_tickers: usize,
    /// Provider requests in flight at once.
    pub concurrency: usize,
    /// Deadline for the whole fetch phase.
    pub timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_tickers: 100,
            concurrency: 5,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Fills in missing market caps: cache first, then the provider, then the store.
#[derive(Clone)]
pub struct Enricher {
    provider: Arc<dyn MarketCapProvider>,
    cache: Cache,
    store: EarningsStore,
    config: EnrichmentConfig,
}

impl Enricher {
    pub fn new(provider: Arc<dyn MarketCapProvider>, cache: Cache, store: EarningsStore) -> Self {
        Self {
            provider,
            cache,
            store,
            config: EnrichmentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EnrichmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Never fails: anything that could not be resolved stays null, and a failed
    /// store commit still returns the enriched in-memory events.
    pub async fn enrich(&self, mut events: Vec<EarningsEvent>) -> Vec<EarningsEvent> {
        let tickers = self.candidates(&events);
        if tickers.is_empty() {
            return events;
        }

        let mut caps = market_caps::load(&self.cache, &tickers).await;
        let misses: Vec<String> = tickers
            .iter()
            .filter(|t| !caps.contains_key(*t))
            .cloned()
            .collect();
        debug!(
            "Market caps: {} cached, {} to fetch",
            caps.len(),
            misses.len()
        );

        if !misses.is_empty() {
            let fetched = self.fetch_missing(&misses).await;
            market_caps::store(&self.cache, &fetched).await;
            caps.extend(fetched);
        }

        let mut updates = Vec::new();
        for event in events.iter_mut().filter(|e| e.market_cap.is_none()) {
            if let Some(cap) = caps.get(&event.ticker) {
                event.refresh_market_cap(Some(*cap));
                if event.id != 0 {
                    updates.push((event.id, *cap));
                }
            }
        }

        if let Err(err) = self.store.update_market_caps(&updates).await {
            warn!(
                "Market cap commit for {} events rolled back: {}",
                updates.len(),
                err
            );
        }
        events
    }

    fn candidates(&self, events: &[EarningsEvent]) -> Vec<String> {
        let mut seen = HashSet::new();
        let tickers: Vec<String> = events
            .iter()
            .filter(|e| e.market_cap.is_none())
            .filter(|e| seen.insert(e.ticker.clone()))
            .map(|e| e.ticker.clone())
            .collect();

        if tickers.len() > self.config.max_tickers {
            info!(
                "Capping market cap lookup at {} of {} tickers",
                self.config.max_tickers,
                tickers.len()
            );
        }
        tickers.into_iter().take(self.config.max_tickers).collect()
    }

    async fn fetch_missing(&self, tickers: &[String]) -> HashMap<String, f64> {
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let batch = self.provider.max_batch().max(1);

        let mut pending = FuturesUnordered::new();
        for chunk in tickers.chunks(batch) {
            let chunk = chunk.to_vec();
            let permits = permits.clone();
            let provider = self.provider.clone();
            pending.push(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome = provider.fetch(&chunk).await;
                (chunk, outcome)
            });
        }

        let mut fetched = HashMap::new();
        loop {
            let next = tokio::time::timeout_at(deadline, pending.next()).await;
            match next {
                Ok(Some((_, Fetch::Data(caps)))) => fetched.extend(caps),
                Ok(Some((chunk, Fetch::Empty))) => {
                    debug!("No market cap for {}", chunk.join(","));
                }
                Ok(Some((chunk, Fetch::Failed(err)))) => {
                    warn!("Market cap lookup for {} failed: {}", chunk.join(","), err);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Market cap lookups timed out after {:?}; {} requests abandoned",
                        self.config.timeout,
                        pending.len()
                    );
                    break;
                }
            }
        }

        fetched.retain(|ticker, cap| tickers.contains(ticker) && cap.is_finite());
        info!("Fetched {} of {} market caps", fetched.len(), tickers.len());
        fetched
    }
}
