use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::http::{url_with_query, HttpRequest, HttpTransport};
use super::{Fetch, NewsProvider, ProviderError};
use crate::models::NewsArticle;

const NEWSAPI_URL: &str = "https://newsapi.org/v2/everything";
const NEWS_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: &str = "15";
/// Placeholder title NewsAPI uses for articles pulled after indexing.
const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    source: Option<RawSource>,
    published_at: Option<String>,
    url_to_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

/// NewsAPI `everything` search, relevance-sorted English articles.
pub struct NewsApiClient {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            base_url: NEWSAPI_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_fetch(&self, ticker: &str, from: NaiveDate) -> Result<Vec<NewsArticle>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::NotConfigured("NEWS_API_KEY"))?;

        let query = format!("{ticker} stock earnings");
        let from = from.format("%Y-%m-%d").to_string();
        let url = url_with_query(
            &self.base_url,
            &[
                ("q", query.as_str()),
                ("from", from.as_str()),
                ("sortBy", "relevancy"),
                ("pageSize", PAGE_SIZE),
                ("language", "en"),
                ("apiKey", api_key),
            ],
        )?;
        let request = HttpRequest::get(url)
            .with_header("accept", "application/json")
            .with_timeout(NEWS_TIMEOUT);

        let resp = self.transport.execute(request).await?;
        let Some(body) = resp.json::<EverythingResponse>()? else {
            return Ok(Vec::new());
        };
        if body.status.as_deref() != Some("ok") {
            return Err(ProviderError::Malformed(
                body.message.unwrap_or_else(|| "status was not ok".to_string()),
            ));
        }

        Ok(body.articles.into_iter().filter_map(into_article).collect())
    }
}

fn into_article(raw: RawArticle) -> Option<NewsArticle> {
    let title = raw.title.filter(|t| !t.trim().is_empty() && !t.contains(REMOVED_MARKER))?;
    let url = raw.url.filter(|u| !u.trim().is_empty())?;
    Some(NewsArticle {
        title,
        url,
        description: raw.description.filter(|d| !d.is_empty()),
        source: raw.source.and_then(|s| s.name).filter(|n| !n.is_empty()),
        published_at: raw.published_at,
        image_url: raw.url_to_image,
    })
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    async fn fetch_news(&self, ticker: &str, days: u32) -> Fetch<Vec<NewsArticle>> {
        let from = Utc::now().date_naive() - chrono::Duration::days(i64::from(days));
        match self.try_fetch(ticker, from).await {
            Ok(articles) => Fetch::rows(articles),
            Err(err) => Fetch::Failed(err),
        }
    }
}
