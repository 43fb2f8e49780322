use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::{url_with_query, HttpRequest, HttpTransport, BROWSER_USER_AGENT};
use super::retry::{execute_with_retry, RetryPolicy};
use super::{Fetch, NewsProvider, ProviderError, WebSearchProvider};
use crate::models::{NewsArticle, SearchHit};

const BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const BRAVE_NEWS_URL: &str = "https://api.search.brave.com/res/v1/news/search";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const NEWS_TIMEOUT: Duration = Duration::from_secs(10);
const NEWS_COUNT: &str = "15";
const PAGE_TIMEOUT: Duration = Duration::from_secs(8);
/// Upper bound on extracted text kept per page before any digest budgeting.
const MAX_PAGE_CHARS: usize = 20_000;

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "form", "noscript",
];

static CONTENT_ROOTS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article", "main", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BraveNewsResponse {
    #[serde(default)]
    results: Vec<BraveNewsResult>,
}

#[derive(Debug, Deserialize)]
struct BraveNewsResult {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    age: Option<String>,
    meta_url: Option<BraveMetaUrl>,
    thumbnail: Option<BraveThumbnail>,
}

#[derive(Debug, Deserialize)]
struct BraveMetaUrl {
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BraveThumbnail {
    src: Option<String>,
}

fn brave_key(api_key: Option<&str>) -> Result<&str, ProviderError> {
    api_key
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::NotConfigured("BRAVE_SEARCH_API_KEY"))
}

/// Brave web search plus plain page fetches for the hits it returns.
pub struct BraveSearch {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    retry: RetryPolicy,
    base_url: String,
}

impl BraveSearch {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            retry: RetryPolicy::default(),
            base_url: BRAVE_SEARCH_URL.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let api_key = brave_key(self.api_key.as_deref())?;

        let count = count.clamp(1, 20).to_string();
        let url = url_with_query(&self.base_url, &[("q", query), ("count", count.as_str())])?;
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_header("x-subscription-token", api_key)
            .with_timeout(SEARCH_TIMEOUT);

        let resp = execute_with_retry(self.transport.as_ref(), request, &self.retry, "Brave search").await?;
        let body: Option<BraveResponse> = resp.json()?;

        Ok(body
            .and_then(|b| b.web)
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let url = r.url.filter(|u| !u.trim().is_empty())?;
                Some(SearchHit {
                    title: r.title.unwrap_or_else(|| url.clone()),
                    url,
                    description: r.description,
                })
            })
            .collect())
    }

    async fn try_fetch_page(&self, url: &str) -> Result<Option<String>, ProviderError> {
        let request = HttpRequest::get(url)
            .with_header("user-agent", BROWSER_USER_AGENT)
            .with_header("accept", "text/html")
            .with_timeout(PAGE_TIMEOUT);
        let resp = self.transport.execute(request).await?;

        let is_html = resp
            .header("content-type")
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false);
        if !is_html {
            debug!("Skipping non-html page {}", url);
            return Ok(None);
        }

        Ok(resp
            .into_body()?
            .map(|html| extract_text(&html))
            .filter(|text| !text.is_empty()))
    }
}

#[async_trait]
impl WebSearchProvider for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Fetch<Vec<SearchHit>> {
        match self.try_search(query, count).await {
            Ok(hits) => Fetch::rows(hits),
            Err(ProviderError::RateLimited) => {
                warn!("Brave search stayed rate limited for {:?}, returning no results", query);
                Fetch::Empty
            }
            Err(err) => Fetch::Failed(err),
        }
    }

    async fn fetch_page(&self, url: &str) -> Fetch<String> {
        match self.try_fetch_page(url).await {
            Ok(Some(text)) => Fetch::Data(text),
            Ok(None) => Fetch::Empty,
            Err(err) => Fetch::Failed(err),
        }
    }
}

/// Brave news search; the fallback headline source when NewsAPI has nothing.
pub struct BraveNews {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    retry: RetryPolicy,
    base_url: String,
}

impl BraveNews {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            retry: RetryPolicy::default(),
            base_url: BRAVE_NEWS_URL.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn try_fetch(&self, ticker: &str) -> Result<Vec<NewsArticle>, ProviderError> {
        let api_key = brave_key(self.api_key.as_deref())?;
        let query = format!("{ticker} stock earnings");
        let url = url_with_query(&self.base_url, &[("q", query.as_str()), ("count", NEWS_COUNT)])?;
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_header("x-subscription-token", api_key)
            .with_timeout(NEWS_TIMEOUT);

        let resp = execute_with_retry(self.transport.as_ref(), request, &self.retry, "Brave news").await?;
        let body: Option<BraveNewsResponse> = resp.json()?;

        Ok(body
            .map(|b| b.results)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let url = r.url.filter(|u| !u.trim().is_empty())?;
                Some(NewsArticle {
                    title: r.title.unwrap_or_else(|| url.clone()),
                    url,
                    description: r.description,
                    source: r.meta_url.and_then(|m| m.hostname),
                    published_at: r.age,
                    image_url: r.thumbnail.and_then(|t| t.src),
                })
            })
            .collect())
    }
}

/// Brave news has no date filter, so `days` is not sent.
#[async_trait]
impl NewsProvider for BraveNews {
    async fn fetch_news(&self, ticker: &str, _days: u32) -> Fetch<Vec<NewsArticle>> {
        match self.try_fetch(ticker).await {
            Ok(articles) => Fetch::rows(articles),
            Err(ProviderError::RateLimited) => {
                warn!("Brave news stayed rate limited for {}, returning no articles", ticker);
                Fetch::Empty
            }
            Err(err) => Fetch::Failed(err),
        }
    }
}

/// Readable text of an HTML document.
///
/// Text comes from the first `article`, `main` or `body` element with page chrome
/// (scripts, navigation, footers, forms) left out, one trimmed fragment per line.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Some(root) = CONTENT_ROOTS.iter().find_map(|sel| doc.select(sel).next()) else {
        return String::new();
    };

    let mut pieces = Vec::new();
    collect_text(root, &mut pieces);

    let mut text = pieces.join("\n");
    if let Some((cut, _)) = text.char_indices().nth(MAX_PAGE_CHARS) {
        text.truncate(cut);
    }
    text
}

fn collect_text(element: ElementRef<'_>, pieces: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    pieces.push(trimmed.to_string());
                }
            }
            Node::Element(el) if SKIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, pieces);
                }
            }
            _ => {}
        }
    }
}
