use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::http::{url_with_query, HttpRequest, HttpTransport, BROWSER_USER_AGENT};
use super::parse::{normalize_fiscal_quarter, parse_dollar, report_time};
use super::{DailyCalendarProvider, Fetch, ProviderError};
use crate::models::{CalendarRecord, Source};

const NASDAQ_CALENDAR_URL: &str = "https://api.nasdaq.com/api/calendar/earnings";
const NASDAQ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct NasdaqEnvelope {
    data: Option<NasdaqData>,
}

#[derive(Debug, Deserialize)]
struct NasdaqData {
    #[serde(default)]
    rows: Option<Vec<NasdaqRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NasdaqRow {
    symbol: Option<String>,
    name: Option<String>,
    time: Option<String>,
    eps_forecast: Option<String>,
    market_cap: Option<String>,
    fiscal_quarter_ending: Option<String>,
}

/// Nasdaq's public earnings calendar, one day per request.
pub struct NasdaqCalendar {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl NasdaqCalendar {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            base_url: NASDAQ_CALENDAR_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_fetch_day(&self, day: NaiveDate) -> Result<Vec<CalendarRecord>, ProviderError> {
        let date = day.format("%Y-%m-%d").to_string();
        let url = url_with_query(&self.base_url, &[("date", date.as_str())])?;
        let request = HttpRequest::get(url)
            .with_header("user-agent", BROWSER_USER_AGENT)
            .with_header("accept", "application/json")
            .with_timeout(NASDAQ_TIMEOUT);

        let envelope: Option<NasdaqEnvelope> = self.transport.execute(request).await?.json()?;
        let rows = envelope
            .and_then(|e| e.data)
            .and_then(|d| d.rows)
            .unwrap_or_default();

        Ok(rows.into_iter().filter_map(|row| day_record(row, day)).collect())
    }
}

fn day_record(row: NasdaqRow, day: NaiveDate) -> Option<CalendarRecord> {
    let symbol = row.symbol.filter(|s| !s.trim().is_empty())?;
    let mut record = CalendarRecord::new(Source::Nasdaq, symbol, day);
    record.company_name = row.name.filter(|n| !n.trim().is_empty());
    record.report_time = report_time(row.time.as_deref());
    record.eps_estimate = parse_dollar(row.eps_forecast.as_deref());
    record.market_cap = parse_dollar(row.market_cap.as_deref()).filter(|c| *c > 0.0);
    record.fiscal_quarter = normalize_fiscal_quarter(row.fiscal_quarter_ending.as_deref());
    Some(record)
}

#[async_trait]
impl DailyCalendarProvider for NasdaqCalendar {
    async fn fetch_day(&self, day: NaiveDate) -> Fetch<Vec<CalendarRecord>> {
        match self.try_fetch_day(day).await {
            Ok(records) => {
                debug!("Nasdaq returned {} rows for {}", records.len(), day);
                Fetch::rows(records)
            }
            Err(err) => Fetch::Failed(err),
        }
    }
}
