use crate::models::NewsFeed;
use crate::service::caching::keys::{news_key, NEWS_TTL};
use crate::service::caching::Cache;

pub async fn load(cache: &Cache, ticker: &str, days: u32) -> Option<NewsFeed> {
    cache.get_json(&news_key(ticker, days)).await
}

pub async fn store(cache: &Cache, days: u32, feed: &NewsFeed) {
    cache.set_json(&news_key(&feed.ticker, days), feed, NEWS_TTL).await;
}
