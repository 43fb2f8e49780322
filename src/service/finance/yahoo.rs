use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use finance_query_core::{FetchClient, YahooAuthManager, YahooError, YahooFinanceClient};
use serde_json::Value;
use tracing::debug;

use super::http::{url_with_query, HttpRequest, HttpTransport, BROWSER_USER_AGENT};
use super::{Fetch, MarketCapProvider, PriceHistoryProvider, ProviderError};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const CHART_TIMEOUT: Duration = Duration::from_secs(10);
const SPARKLINE_RANGE: &str = "1mo";

impl From<YahooError> for ProviderError {
    fn from(err: YahooError) -> Self {
        ProviderError::Transport(format!("yahoo: {err}"))
    }
}

/// Per-symbol market caps from Yahoo quote summaries.
pub struct YahooMarketCaps {
    client: Arc<YahooFinanceClient>,
}

impl YahooMarketCaps {
    /// Build the Yahoo client stack with optional proxy support.
    pub fn new(proxy: Option<String>) -> Result<Self, ProviderError> {
        let fetch = Arc::new(FetchClient::new(proxy.clone())?);
        let auth = Arc::new(YahooAuthManager::new(proxy, fetch.cookie_jar().clone()));
        let client = Arc::new(YahooFinanceClient::new(auth, fetch));
        Ok(Self { client })
    }

    async fn try_fetch(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        let summary = self
            .client
            .get_quote_summary(ticker, &["price", "summaryDetail"])
            .await?;
        Ok(market_cap_from_summary(&summary))
    }
}

#[async_trait]
impl MarketCapProvider for YahooMarketCaps {
    fn max_batch(&self) -> usize {
        1
    }

    async fn fetch(&self, tickers: &[String]) -> Fetch<HashMap<String, f64>> {
        let Some(ticker) = tickers.first() else {
            return Fetch::Empty;
        };
        match self.try_fetch(ticker).await {
            Ok(Some(cap)) => Fetch::Data(HashMap::from([(ticker.clone(), cap)])),
            Ok(None) => Fetch::Empty,
            Err(err) => Fetch::Failed(err),
        }
    }
}

/// `price.marketCap`, falling back to `summaryDetail.marketCap`.
pub fn market_cap_from_summary(summary: &Value) -> Option<f64> {
    let result = summary
        .get("quoteSummary")
        .and_then(|q| q.get("result"))
        .and_then(|r| r.as_array())
        .and_then(|arr| arr.first())?;

    extract_f64_raw(result, &["price", "marketCap"])
        .or_else(|| extract_f64_raw(result, &["summaryDetail", "marketCap"]))
        .filter(|cap| *cap > 0.0)
}

fn extract_f64_raw(root: &Value, path: &[&str]) -> Option<f64> {
    let mut current = root;
    for key in path {
        current = current.get(*key)?;
    }

    current
        .get("raw")
        .and_then(|v| v.as_f64())
        .or_else(|| current.as_f64())
}

/// Daily closes from Yahoo's chart endpoint.
pub struct YahooChart {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl YahooChart {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: CHART_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_closes(&self, ticker: &str) -> Result<Vec<f64>, ProviderError> {
        let url = url_with_query(
            &format!("{}/{}", self.base_url, ticker),
            &[
                ("range", SPARKLINE_RANGE),
                ("interval", "1d"),
                ("includePrePost", "false"),
            ],
        )?;
        let request = HttpRequest::get(url)
            .with_header("user-agent", BROWSER_USER_AGENT)
            .with_timeout(CHART_TIMEOUT);

        let body: Option<Value> = self.transport.execute(request).await?.json()?;
        Ok(body.as_ref().map(closes_from_chart).unwrap_or_default())
    }
}

/// Closing prices in timestamp order, skipping null bars.
pub fn closes_from_chart(body: &Value) -> Vec<f64> {
    body.pointer("/chart/result/0/indicators/quote/0/close")
        .and_then(|c| c.as_array())
        .map(|closes| {
            closes
                .iter()
                .filter_map(|c| c.as_f64())
                .map(|c| (c * 100.0).round() / 100.0)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PriceHistoryProvider for YahooChart {
    async fn daily_closes(&self, ticker: &str) -> Fetch<Vec<f64>> {
        match self.try_closes(ticker).await {
            Ok(closes) => {
                debug!("Yahoo chart returned {} closes for {}", closes.len(), ticker);
                Fetch::rows(closes)
            }
            Err(err) => Fetch::Failed(err),
        }
    }
}
