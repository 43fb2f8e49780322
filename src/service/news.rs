use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::models::{normalize_ticker, NewsArticle, NewsFeed};
use crate::service::caching::collections::news as news_cache;
use crate::service::caching::Cache;
use crate::service::finance::{Fetch, NewsProvider, ProviderError};

pub const DEFAULT_NEWS_DAYS: u32 = 30;
pub const MAX_NEWS_DAYS: u32 = 90;

/// Lookback window in days, kept within `1..=MAX_NEWS_DAYS`.
pub fn clamp_days(days: u32) -> u32 {
    days.clamp(1, MAX_NEWS_DAYS)
}

/// Ticker headlines: cached feed, else the primary provider, else the fallback.
#[derive(Clone)]
pub struct NewsService {
    cache: Cache,
    primary: Arc<dyn NewsProvider>,
    fallback: Arc<dyn NewsProvider>,
}

impl NewsService {
    pub fn new(cache: Cache, primary: Arc<dyn NewsProvider>, fallback: Arc<dyn NewsProvider>) -> Self {
        Self {
            cache,
            primary,
            fallback,
        }
    }

    /// Never fails; with both providers down the feed is empty and nothing is cached.
    pub async fn news(&self, ticker: &str, days: u32) -> NewsFeed {
        let ticker = normalize_ticker(ticker);
        let days = clamp_days(days);
        if ticker.is_empty() {
            return NewsFeed {
                ticker,
                articles: Vec::new(),
            };
        }

        if let Some(feed) = news_cache::load(&self.cache, &ticker, days).await {
            debug!("Serving cached news for {} ({} days)", ticker, days);
            return feed;
        }

        let mut articles = fetch_from(self.primary.as_ref(), &ticker, days, "Primary news lookup").await;
        if articles.is_empty() {
            articles = fetch_from(self.fallback.as_ref(), &ticker, days, "Fallback news lookup").await;
        }

        let feed = NewsFeed { ticker, articles };
        if !feed.articles.is_empty() {
            info!("Caching {} articles for {}", feed.articles.len(), feed.ticker);
            news_cache::store(&self.cache, days, &feed).await;
        }
        feed
    }
}

async fn fetch_from(provider: &dyn NewsProvider, ticker: &str, days: u32, what: &str) -> Vec<NewsArticle> {
    match provider.fetch_news(ticker, days).await {
        Fetch::Data(articles) => articles,
        Fetch::Empty => Vec::new(),
        Fetch::Failed(ProviderError::NotConfigured(key)) => {
            debug!("{} skipped, {} is not set", what, key);
            Vec::new()
        }
        Fetch::Failed(err) => {
            warn!("{} failed for {}: {}", what, ticker, err);
            Vec::new()
        }
    }
}
