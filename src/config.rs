use std::env;
use std::time::Duration;

use tracing::warn;

const DEFAULT_DATABASE_URL: &str = "sqlite://earnings.db";
const DEFAULT_ENRICH_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SEARCH_QUERY_DELAY_MS: u64 = 1_100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis(String),
    Memory,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketCapSource {
    /// Batched profile lookups.
    Fmp,
    /// One quote summary per symbol.
    Yahoo,
}

/// Runtime settings, read from the process environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub cache_backend: CacheBackendKind,
    pub fmp_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub brave_search_api_key: Option<String>,
    pub news_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub extraction_model: Option<String>,
    pub market_cap_source: MarketCapSource,
    pub yahoo_proxy: Option<String>,
    pub enrich_timeout: Duration,
    pub search_query_delay: Duration,
}

impl Settings {
    /// Load `.env` if present, then read the environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let redis_url = get("REDIS_URL");
        let cache_backend = match get("CACHE_BACKEND").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("none") | Some("disabled") | Some("off") => CacheBackendKind::Disabled,
            Some("memory") => CacheBackendKind::Memory,
            Some("redis") | None => match redis_url {
                Some(url) => CacheBackendKind::Redis(url),
                None => CacheBackendKind::Memory,
            },
            Some(other) => {
                warn!("Unknown CACHE_BACKEND {:?}, using the in-process cache", other);
                CacheBackendKind::Memory
            }
        };

        let market_cap_source = match get("MARKET_CAP_PROVIDER").map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("yahoo") => MarketCapSource::Yahoo,
            Some("fmp") | None => MarketCapSource::Fmp,
            Some(other) => {
                warn!("Unknown MARKET_CAP_PROVIDER {:?}, using fmp", other);
                MarketCapSource::Fmp
            }
        };

        Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            cache_backend,
            fmp_api_key: get("FMP_API_KEY"),
            alpha_vantage_api_key: get("ALPHA_VANTAGE_API_KEY"),
            brave_search_api_key: get("BRAVE_SEARCH_API_KEY"),
            news_api_key: get("NEWS_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            extraction_model: get("EXTRACTION_MODEL"),
            market_cap_source,
            yahoo_proxy: get("YAHOO_PROXY"),
            enrich_timeout: Duration::from_secs(parse_or(
                "ENRICH_TIMEOUT_SECS",
                get("ENRICH_TIMEOUT_SECS"),
                DEFAULT_ENRICH_TIMEOUT_SECS,
            )),
            search_query_delay: Duration::from_millis(parse_or(
                "SEARCH_QUERY_DELAY_MS",
                get("SEARCH_QUERY_DELAY_MS"),
                DEFAULT_SEARCH_QUERY_DELAY_MS,
            )),
        }
    }
}

fn parse_or(key: &str, raw: Option<String>, default: u64) -> u64 {
    match raw {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("{}={:?} is not a number, using {}", key, value, default);
            default
        }),
        None => default,
    }
}

/// API keys are redacted.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| if key.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Settings")
            .field("database_url", &self.database_url)
            .field("cache_backend", &self.cache_backend)
            .field("fmp_api_key", &redact(&self.fmp_api_key))
            .field("alpha_vantage_api_key", &redact(&self.alpha_vantage_api_key))
            .field("brave_search_api_key", &redact(&self.brave_search_api_key))
            .field("news_api_key", &redact(&self.news_api_key))
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("extraction_model", &self.extraction_model)
            .field("market_cap_source", &self.market_cap_source)
            .field("enrich_timeout", &self.enrich_timeout)
            .field("search_query_delay", &self.search_query_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings(&[]);
        assert_eq!(s.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(s.cache_backend, CacheBackendKind::Memory);
        assert_eq!(s.market_cap_source, MarketCapSource::Fmp);
        assert_eq!(s.enrich_timeout, Duration::from_secs(DEFAULT_ENRICH_TIMEOUT_SECS));
        assert!(s.fmp_api_key.is_none());
    }

    #[test]
    fn redis_url_selects_redis_unless_disabled() {
        let s = settings(&[("REDIS_URL", "redis://localhost:6379")]);
        assert_eq!(s.cache_backend, CacheBackendKind::Redis("redis://localhost:6379".into()));

        let s = settings(&[("REDIS_URL", "redis://localhost:6379"), ("CACHE_BACKEND", "none")]);
        assert_eq!(s.cache_backend, CacheBackendKind::Disabled);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let s = settings(&[("ENRICH_TIMEOUT_SECS", "soon"), ("MARKET_CAP_PROVIDER", "Yahoo")]);
        assert_eq!(s.enrich_timeout, Duration::from_secs(DEFAULT_ENRICH_TIMEOUT_SECS));
        assert_eq!(s.market_cap_source, MarketCapSource::Yahoo);
    }

    #[test]
    fn debug_output_hides_keys() {
        let s = settings(&[("FMP_API_KEY", "secret-key"), ("NEWS_API_KEY", "news-secret")]);
        assert_eq!(s.news_api_key.as_deref(), Some("news-secret"));
        let rendered = format!("{s:?}");
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("news-secret"));
        assert!(rendered.contains("<set>"));
    }
}
