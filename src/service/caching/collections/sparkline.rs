use crate::models::Sparkline;
use crate::service::caching::keys::{sparkline_key, SPARKLINE_TTL};
use crate::service::caching::Cache;

pub async fn load(cache: &Cache, ticker: &str) -> Option<Sparkline> {
    cache.get_json(&sparkline_key(ticker)).await
}

pub async fn store(cache: &Cache, sparkline: &Sparkline) {
    cache
        .set_json(&sparkline_key(&sparkline.ticker), sparkline, SPARKLINE_TTL)
        .await;
}
