use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{CacheBackendKind, MarketCapSource, Settings};
use crate::error::Result;
use crate::service::analysis::{AnalysisService, SearchConfig};
use crate::service::caching::{Cache, MemoryCache, RedisCache};
use crate::service::calendar::{CalendarProviders, CalendarService};
use crate::service::enrichment::{EnrichmentConfig, Enricher};
use crate::service::finance::{
    AlphaVantageClient, AnthropicExtractor, BraveNews, BraveSearch, FmpCalendar, FmpProfiles,
    HttpTransport, MarketCapProvider, NasdaqCalendar, NewsApiClient, ReqwestTransport, YahooChart,
    YahooMarketCaps,
};
use crate::service::news::NewsService;
use crate::service::storage::EarningsStore;

/// Everything a caller needs, built once from [`Settings`] and shut down with [`AppContext::close`].
#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub store: EarningsStore,
    pub cache: Cache,
    pub calendar: CalendarService,
    pub analysis: AnalysisService,
    pub news: NewsService,
}

impl AppContext {
    pub async fn from_env() -> Result<Self> {
        Self::open(Settings::from_env()).await
    }

    pub async fn open(settings: Settings) -> Result<Self> {
        info!("Opening earnings store at {}", settings.database_url);
        let store = EarningsStore::open(&settings.database_url).await?;
        let cache = open_cache(&settings.cache_backend).await;
        info!("Cache backend: {}", cache.backend_name());

        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);

        let alpha_vantage = Arc::new(AlphaVantageClient::new(
            transport.clone(),
            settings.alpha_vantage_api_key.clone(),
        ));
        let providers = CalendarProviders {
            bulk: alpha_vantage.clone(),
            range: Arc::new(FmpCalendar::new(transport.clone(), settings.fmp_api_key.clone())),
            daily: Arc::new(NasdaqCalendar::new(transport.clone())),
            symbol: alpha_vantage,
            prices: Arc::new(YahooChart::new(transport.clone())),
        };

        let market_caps: Arc<dyn MarketCapProvider> = match settings.market_cap_source {
            MarketCapSource::Fmp => Arc::new(FmpProfiles::new(transport.clone(), settings.fmp_api_key.clone())),
            MarketCapSource::Yahoo => Arc::new(YahooMarketCaps::new(settings.yahoo_proxy.clone())?),
        };
        let enricher = Enricher::new(market_caps, cache.clone(), store.clone()).with_config(EnrichmentConfig {
            timeout: settings.enrich_timeout,
            ..EnrichmentConfig::default()
        });

        let calendar = CalendarService::new(store.clone(), cache.clone(), providers, enricher);

        let search = Arc::new(BraveSearch::new(
            transport.clone(),
            settings.brave_search_api_key.clone(),
        ));
        let news = NewsService::new(
            cache.clone(),
            Arc::new(NewsApiClient::new(transport.clone(), settings.news_api_key.clone())),
            Arc::new(BraveNews::new(transport.clone(), settings.brave_search_api_key.clone())),
        );

        let extractor = Arc::new(AnthropicExtractor::new(
            transport,
            settings.anthropic_api_key.clone(),
            settings.extraction_model.clone(),
        ));
        let analysis = AnalysisService::new(store.clone(), cache.clone(), search, extractor)
            .with_search_config(SearchConfig {
                query_delay: settings.search_query_delay,
                ..SearchConfig::default()
            });

        Ok(Self {
            settings,
            store,
            cache,
            calendar,
            analysis,
            news,
        })
    }

    pub async fn close(self) {
        self.store.close().await;
        info!("Earnings store closed");
    }
}

/// A Redis server that cannot be reached leaves the cache disabled rather than failing startup.
async fn open_cache(kind: &CacheBackendKind) -> Cache {
    match kind {
        CacheBackendKind::Redis(url) => match RedisCache::new(url).await {
            Ok(redis) => Cache::redis(redis),
            Err(err) => {
                warn!("Redis cache disabled: {}", err);
                Cache::disabled()
            }
        },
        CacheBackendKind::Memory => Cache::memory(MemoryCache::new()),
        CacheBackendKind::Disabled => Cache::disabled(),
    }
}
