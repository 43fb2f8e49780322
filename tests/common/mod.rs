#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use earnings_desk::models::{AnalysisRecord, CalendarRecord, NewsArticle, ReportTime, SearchHit, Source};
use earnings_desk::service::caching::{Cache, MemoryCache};
use earnings_desk::service::calendar::{CalendarProviders, CalendarService};
use earnings_desk::service::enrichment::{EnrichmentConfig, Enricher};
use earnings_desk::service::finance::{
    BulkCalendarProvider, DailyCalendarProvider, ExtractionError, ExtractionRequest, Fetch,
    MarketCapProvider, NewsProvider, PriceHistoryProvider, ProviderError, RangeCalendarProvider,
    StructuredExtractor, SymbolCalendarProvider, WebSearchProvider,
};
use earnings_desk::service::storage::EarningsStore;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn record(source: Source, ticker: &str, date: NaiveDate) -> CalendarRecord {
    let mut record = CalendarRecord::new(source, ticker, date);
    record.company_name = Some(format!("{ticker} Corp"));
    record
}

pub fn aapl_record() -> CalendarRecord {
    let mut record = CalendarRecord::new(Source::AlphaVantage, "AAPL", day(2026, 2, 16));
    record.company_name = Some("Apple Inc.".into());
    record.report_time = ReportTime::PostMarket;
    record.fiscal_quarter = Some("2025-12-31".into());
    record.eps_estimate = Some(2.35);
    record
}

pub async fn memory_store() -> EarningsStore {
    EarningsStore::open("sqlite::memory:").await.unwrap()
}

/// A SQLite file under the temp dir, removed (with its WAL files) on drop.
pub struct TempDatabase {
    path: std::path::PathBuf,
}

impl TempDatabase {
    pub fn new(label: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("earnings-desk-{label}-{}-{nanos}.db", std::process::id()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    pub async fn open(&self) -> EarningsStore {
        EarningsStore::open(&self.url()).await.unwrap()
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

pub fn memory_cache() -> Cache {
    Cache::memory(MemoryCache::new())
}

/// Provider returning a fixed set of rows, or a fixed failure.
#[derive(Default)]
pub struct FakeCalendar {
    pub rows: Mutex<Vec<CalendarRecord>>,
    pub failure: Option<ProviderError>,
    pub calls: AtomicUsize,
}

impl FakeCalendar {
    pub fn with_rows(rows: Vec<CalendarRecord>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            ..Default::default()
        })
    }

    pub fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(err),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, keep: impl Fn(&CalendarRecord) -> bool) -> Fetch<Vec<CalendarRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Fetch::Failed(err.clone());
        }
        let rows = self.rows.lock().unwrap().iter().filter(|r| keep(*r)).cloned().collect();
        Fetch::rows(rows)
    }
}

#[async_trait]
impl BulkCalendarProvider for FakeCalendar {
    async fn fetch_upcoming(&self) -> Fetch<Vec<CalendarRecord>> {
        self.respond(|_| true)
    }
}

#[async_trait]
impl RangeCalendarProvider for FakeCalendar {
    async fn fetch_range(&self, from: NaiveDate, to: NaiveDate) -> Fetch<Vec<CalendarRecord>> {
        self.respond(|r| r.report_date >= from && r.report_date <= to)
    }
}

#[async_trait]
impl DailyCalendarProvider for FakeCalendar {
    async fn fetch_day(&self, day: NaiveDate) -> Fetch<Vec<CalendarRecord>> {
        self.respond(|r| r.report_date == day)
    }
}

#[async_trait]
impl SymbolCalendarProvider for FakeCalendar {
    async fn fetch_symbol(&self, _ticker: &str) -> Fetch<Vec<CalendarRecord>> {
        self.respond(|_| true)
    }
}

/// Market caps by ticker; tickers listed in `slow` sleep for `delay` first.
#[derive(Default)]
pub struct FakeCaps {
    pub caps: HashMap<String, f64>,
    pub slow: Vec<String>,
    pub delay: Duration,
    pub batch: usize,
    pub requested: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeCaps {
    pub fn new(caps: &[(&str, f64)]) -> Self {
        Self {
            caps: caps.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
            batch: 1,
            ..Default::default()
        }
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketCapProvider for FakeCaps {
    fn max_batch(&self) -> usize {
        self.batch
    }

    async fn fetch(&self, tickers: &[String]) -> Fetch<HashMap<String, f64>> {
        self.requested.lock().unwrap().extend(tickers.iter().cloned());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if tickers.iter().any(|t| self.slow.contains(t)) {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let found: HashMap<String, f64> = tickers
            .iter()
            .filter_map(|t| self.caps.get(t).map(|c| (t.clone(), *c)))
            .collect();
        if found.is_empty() {
            Fetch::Empty
        } else {
            Fetch::Data(found)
        }
    }
}

#[derive(Default)]
pub struct FakePrices {
    pub closes: Vec<f64>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PriceHistoryProvider for FakePrices {
    async fn daily_closes(&self, _ticker: &str) -> Fetch<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Fetch::rows(self.closes.clone())
    }
}

pub struct CalendarHarness {
    pub store: EarningsStore,
    pub cache: Cache,
    pub bulk: Arc<FakeCalendar>,
    pub range: Arc<FakeCalendar>,
    pub daily: Arc<FakeCalendar>,
    pub symbol: Arc<FakeCalendar>,
    pub prices: Arc<FakePrices>,
    pub caps: Arc<FakeCaps>,
    pub service: CalendarService,
}

pub struct HarnessBuilder {
    pub bulk: Arc<FakeCalendar>,
    pub range: Arc<FakeCalendar>,
    pub daily: Arc<FakeCalendar>,
    pub symbol: Arc<FakeCalendar>,
    pub prices: Arc<FakePrices>,
    pub caps: FakeCaps,
    pub cache: Option<Cache>,
    pub store: Option<EarningsStore>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            bulk: Arc::new(FakeCalendar::default()),
            range: Arc::new(FakeCalendar::default()),
            daily: Arc::new(FakeCalendar::default()),
            symbol: Arc::new(FakeCalendar::default()),
            prices: Arc::new(FakePrices::default()),
            caps: FakeCaps::new(&[]),
            cache: None,
            store: None,
        }
    }
}

impl HarnessBuilder {
    pub async fn build(self) -> CalendarHarness {
        let store = match self.store {
            Some(store) => store,
            None => memory_store().await,
        };
        let cache = self.cache.unwrap_or_else(memory_cache);
        let caps = Arc::new(self.caps);
        let enricher = Enricher::new(caps.clone(), cache.clone(), store.clone()).with_config(EnrichmentConfig {
            timeout: Duration::from_secs(2),
            ..EnrichmentConfig::default()
        });
        let providers = CalendarProviders {
            bulk: self.bulk.clone(),
            range: self.range.clone(),
            daily: self.daily.clone(),
            symbol: self.symbol.clone(),
            prices: self.prices.clone(),
        };
        let service = CalendarService::new(store.clone(), cache.clone(), providers, enricher);

        CalendarHarness {
            store,
            cache,
            bulk: self.bulk,
            range: self.range,
            daily: self.daily,
            symbol: self.symbol,
            prices: self.prices,
            caps,
            service,
        }
    }
}

/// Canned search results per query position, and page bodies by URL.
#[derive(Default)]
pub struct FakeSearch {
    pub results: Vec<Vec<SearchHit>>,
    pub pages: HashMap<String, String>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            url: url.into(),
            description: Some(format!("About {title}")),
        }
    }
}

#[async_trait]
impl WebSearchProvider for FakeSearch {
    async fn search(&self, query: &str, _count: usize) -> Fetch<Vec<SearchHit>> {
        let position = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(query.to_string());
            queries.len() - 1
        };
        Fetch::rows(self.results.get(position).cloned().unwrap_or_default())
    }

    async fn fetch_page(&self, url: &str) -> Fetch<String> {
        match self.pages.get(url) {
            Some(body) => Fetch::Data(body.clone()),
            None => Fetch::Failed(ProviderError::Status(403)),
        }
    }
}

pub struct FakeExtractor {
    pub outcome: Result<AnalysisRecord, ExtractionError>,
    pub requests: Mutex<Vec<ExtractionRequest>>,
}

impl FakeExtractor {
    pub fn returning(outcome: Result<AnalysisRecord, ExtractionError>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl StructuredExtractor for FakeExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<AnalysisRecord, ExtractionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.outcome.clone()
    }
}

pub fn reported_record() -> AnalysisRecord {
    AnalysisRecord {
        has_reported: true,
        eps_estimate: Some(2.35),
        eps_actual: Some(2.40),
        eps_surprise_pct: Some(2.13),
        revenue_estimate: Some(1.24e11),
        revenue_actual: Some(1.26e11),
        revenue_surprise_pct: Some(1.6),
        guidance_summary: Some("Services growth expected to continue.".into()),
        sentiment: Some(earnings_desk::models::Sentiment::Bullish),
        sentiment_score: Some(0.7),
        price_reaction_pct: Some(3.1),
    }
}

/// News source with canned articles or a fixed failure; records every (ticker, days) asked for.
#[derive(Default)]
pub struct FakeNews {
    pub articles: Vec<NewsArticle>,
    pub failure: Option<ProviderError>,
    pub requests: Mutex<Vec<(String, u32)>>,
}

impl FakeNews {
    pub fn with_titles(titles: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            articles: titles.iter().map(|t| Self::article(t)).collect(),
            ..Default::default()
        })
    }

    pub fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(err),
            ..Default::default()
        })
    }

    pub fn article(title: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            url: format!("https://news.test/{}", title.to_lowercase().replace(' ', "-")),
            description: None,
            source: Some("news.test".into()),
            published_at: None,
            image_url: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl NewsProvider for FakeNews {
    async fn fetch_news(&self, ticker: &str, days: u32) -> Fetch<Vec<NewsArticle>> {
        self.requests.lock().unwrap().push((ticker.to_string(), days));
        match &self.failure {
            Some(err) => Fetch::Failed(err.clone()),
            None => Fetch::rows(self.articles.clone()),
        }
    }
}
