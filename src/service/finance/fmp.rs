use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use super::http::{url_with_query, HttpRequest, HttpTransport};
use super::parse::{normalize_fiscal_quarter, parse_iso_date, report_time};
use super::{Fetch, MarketCapProvider, ProviderError, RangeCalendarProvider};
use crate::models::{normalize_ticker, CalendarRecord, Source};

const FMP_BASE: &str = "https://financialmodelingprep.com/api/v3";
const CALENDAR_TIMEOUT: Duration = Duration::from_secs(15);
const PROFILE_TIMEOUT: Duration = Duration::from_secs(8);
/// Symbols per profile request.
pub const PROFILE_BATCH: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpCalendarRow {
    symbol: Option<String>,
    date: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    eps_estimated: Option<f64>,
    #[serde(default)]
    revenue_estimated: Option<f64>,
    #[serde(default)]
    fiscal_date_ending: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FmpProfileRow {
    symbol: Option<String>,
    #[serde(default, alias = "marketCap")]
    #[serde(rename = "mktCap")]
    market_cap: Option<f64>,
}

fn require_key(key: &Option<String>) -> Result<&str, ProviderError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(ProviderError::NotConfigured("FMP_API_KEY"))
}

/// FMP `earning_calendar` over an explicit date range.
pub struct FmpCalendar {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    base_url: String,
}

impl FmpCalendar {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            base_url: FMP_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_fetch_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<CalendarRecord>, ProviderError> {
        let api_key = require_key(&self.api_key)?;
        let from_str = from.format("%Y-%m-%d").to_string();
        let to_str = to.format("%Y-%m-%d").to_string();
        let url = url_with_query(
            &format!("{}/earning_calendar", self.base_url),
            &[
                ("from", from_str.as_str()),
                ("to", to_str.as_str()),
                ("apikey", api_key),
            ],
        )?;

        info!("Fetching FMP earnings from {} to {}", from, to);
        let rows: Vec<FmpCalendarRow> = self
            .transport
            .execute(HttpRequest::get(url).with_timeout(CALENDAR_TIMEOUT))
            .await?
            .json()?
            .unwrap_or_default();

        Ok(rows.into_iter().filter_map(calendar_record).collect())
    }
}

fn calendar_record(row: FmpCalendarRow) -> Option<CalendarRecord> {
    let symbol = row.symbol.filter(|s| !s.trim().is_empty())?;
    let Some(date) = parse_iso_date(row.date.as_deref()) else {
        debug!("Skipping FMP row for {} with bad date {:?}", symbol, row.date);
        return None;
    };

    let mut record = CalendarRecord::new(Source::Fmp, symbol, date);
    record.company_name = row.company_name;
    record.report_time = report_time(row.time.as_deref());
    record.eps_estimate = row.eps_estimated;
    record.revenue_estimate = row.revenue_estimated;
    record.fiscal_quarter = normalize_fiscal_quarter(row.fiscal_date_ending.as_deref());
    Some(record)
}

#[async_trait]
impl RangeCalendarProvider for FmpCalendar {
    async fn fetch_range(&self, from: NaiveDate, to: NaiveDate) -> Fetch<Vec<CalendarRecord>> {
        match self.try_fetch_range(from, to).await {
            Ok(records) => Fetch::rows(records),
            Err(err) => Fetch::Failed(err),
        }
    }
}

/// FMP company profiles, used for batch market-cap lookups.
pub struct FmpProfiles {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    base_url: String,
}

impl FmpProfiles {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            base_url: FMP_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_fetch(&self, tickers: &[String]) -> Result<HashMap<String, f64>, ProviderError> {
        let api_key = require_key(&self.api_key)?;
        let symbols = tickers
            .iter()
            .take(PROFILE_BATCH)
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = url_with_query(
            &format!("{}/profile/{}", self.base_url, symbols),
            &[("apikey", api_key)],
        )?;

        let rows: Vec<FmpProfileRow> = self
            .transport
            .execute(HttpRequest::get(url).with_timeout(PROFILE_TIMEOUT))
            .await?
            .json()?
            .unwrap_or_default();

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let cap = row.market_cap.filter(|c| c.is_finite() && *c > 0.0)?;
                Some((normalize_ticker(&row.symbol?), cap))
            })
            .collect())
    }
}

#[async_trait]
impl MarketCapProvider for FmpProfiles {
    fn max_batch(&self) -> usize {
        PROFILE_BATCH
    }

    async fn fetch(&self, tickers: &[String]) -> Fetch<HashMap<String, f64>> {
        if tickers.is_empty() {
            return Fetch::Empty;
        }
        match self.try_fetch(tickers).await {
            Ok(caps) if caps.is_empty() => Fetch::Empty,
            Ok(caps) => Fetch::Data(caps),
            Err(err) => Fetch::Failed(err),
        }
    }
}
