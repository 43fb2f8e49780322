use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::models::{AnalysisRecord, CalendarRecord, NewsArticle, SearchHit};

pub mod alpha_vantage;
pub mod anthropic;
pub mod brave;
pub mod fmp;
pub mod http;
pub mod nasdaq;
pub mod newsapi;
pub mod parse;
pub mod retry;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageClient;
pub use anthropic::AnthropicExtractor;
pub use brave::{BraveNews, BraveSearch};
pub use fmp::{FmpCalendar, FmpProfiles};
pub use http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use nasdaq::NasdaqCalendar;
pub use newsapi::NewsApiClient;
pub use yahoo::{YahooChart, YahooMarketCaps};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("rate limited")]
    RateLimited,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of a provider call.
///
/// Callers treat `Empty` and `Failed` alike as "no rows"; `Failed` keeps the reason
/// around for logging.
#[derive(Debug)]
pub enum Fetch<T> {
    Data(T),
    Empty,
    Failed(ProviderError),
}

impl<T> Fetch<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, Fetch::Data(_))
    }

    pub fn data(self) -> Option<T> {
        match self {
            Fetch::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Like [`Fetch::data`], logging the failure reason against `what`.
    pub fn or_warn(self, what: &str) -> Option<T> {
        match self {
            Fetch::Data(value) => Some(value),
            Fetch::Empty => None,
            Fetch::Failed(err) => {
                warn!("{} failed: {}", what, err);
                None
            }
        }
    }
}

impl<T> Fetch<Vec<T>> {
    pub fn rows(rows: Vec<T>) -> Self {
        if rows.is_empty() {
            Fetch::Empty
        } else {
            Fetch::Data(rows)
        }
    }
}

impl<T> From<ProviderError> for Fetch<T> {
    fn from(err: ProviderError) -> Self {
        Fetch::Failed(err)
    }
}

/// Whole-calendar feed over the provider's default horizon.
#[async_trait]
pub trait BulkCalendarProvider: Send + Sync {
    async fn fetch_upcoming(&self) -> Fetch<Vec<CalendarRecord>>;
}

#[async_trait]
pub trait RangeCalendarProvider: Send + Sync {
    async fn fetch_range(&self, from: NaiveDate, to: NaiveDate) -> Fetch<Vec<CalendarRecord>>;
}

/// One calendar day per request; used to backfill past weeks.
#[async_trait]
pub trait DailyCalendarProvider: Send + Sync {
    async fn fetch_day(&self, day: NaiveDate) -> Fetch<Vec<CalendarRecord>>;
}

#[async_trait]
pub trait SymbolCalendarProvider: Send + Sync {
    async fn fetch_symbol(&self, ticker: &str) -> Fetch<Vec<CalendarRecord>>;
}

#[async_trait]
pub trait MarketCapProvider: Send + Sync {
    /// Largest number of symbols one `fetch` call accepts.
    fn max_batch(&self) -> usize;

    async fn fetch(&self, tickers: &[String]) -> Fetch<HashMap<String, f64>>;
}

#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    async fn daily_closes(&self, ticker: &str) -> Fetch<Vec<f64>>;
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Fetch<Vec<SearchHit>>;

    /// Readable text of the page at `url`.
    async fn fetch_page(&self, url: &str) -> Fetch<String>;
}

/// Recent headlines about a ticker.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Articles from roughly the last `days` days. Providers without a date filter ignore it.
    async fn fetch_news(&self, ticker: &str, days: u32) -> Fetch<Vec<NewsArticle>>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extractor is not configured")]
    NotConfigured,
    #[error("extractor produced no structured output")]
    Refused,
    #[error("extractor request failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("extractor output did not match the record shape: {0}")]
    Malformed(String),
}

/// Context handed to the extractor alongside the search digest.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ExtractionRequest {
    pub ticker: String,
    pub quarter: String,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_estimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_quarter: Option<String>,
}

/// Turns raw text into the fixed-shape analysis record.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<AnalysisRecord, ExtractionError>;
}
