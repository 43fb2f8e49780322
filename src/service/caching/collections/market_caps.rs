use std::collections::HashMap;

use crate::service::caching::keys::{market_cap_key, MARKET_CAP_TTL};
use crate::service::caching::Cache;

/// Plain decimal text; `f64`'s `Display` is the shortest string that parses back exactly.
pub fn encode(value: f64) -> String {
    format!("{value}")
}

pub fn decode(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Cached market caps for `tickers`. Misses and undecodable entries are simply absent.
pub async fn load(cache: &Cache, tickers: &[String]) -> HashMap<String, f64> {
    let keys: Vec<String> = tickers.iter().map(|t| market_cap_key(t)).collect();
    let values = cache.get_many(&keys).await;

    tickers
        .iter()
        .zip(values)
        .filter_map(|(ticker, raw)| {
            raw.as_deref()
                .and_then(decode)
                .map(|cap| (ticker.clone(), cap))
        })
        .collect()
}

pub async fn store(cache: &Cache, caps: &HashMap<String, f64>) {
    let entries: Vec<(String, String)> = caps
        .iter()
        .map(|(ticker, cap)| (market_cap_key(ticker), encode(*cap)))
        .collect();
    cache.set_many(&entries, MARKET_CAP_TTL).await;
}
