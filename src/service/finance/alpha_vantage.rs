use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::http::{url_with_query, HttpRequest, HttpTransport};
use super::parse::{normalize_fiscal_quarter, parse_iso_date, parse_number, report_time};
use super::{BulkCalendarProvider, Fetch, ProviderError, SymbolCalendarProvider};
use crate::models::{CalendarRecord, Source};

const AV_QUERY_URL: &str = "https://www.alphavantage.co/query";
const BULK_HORIZON: &str = "3month";
const SYMBOL_HORIZON: &str = "12month";
const AV_TIMEOUT: Duration = Duration::from_secs(15);

/// Alpha Vantage `EARNINGS_CALENDAR` (CSV). Serves both the bulk feed and
/// symbol-scoped lookups.
pub struct AlphaVantageClient {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            base_url: AV_QUERY_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_calendar(&self, horizon: &str, symbol: Option<&str>) -> Fetch<Vec<CalendarRecord>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Fetch::Failed(ProviderError::NotConfigured("ALPHA_VANTAGE_API_KEY"));
        };

        let mut params = vec![
            ("function", "EARNINGS_CALENDAR"),
            ("horizon", horizon),
            ("apikey", api_key),
        ];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol));
        }
        let url = match url_with_query(&self.base_url, &params) {
            Ok(url) => url,
            Err(err) => return Fetch::Failed(err),
        };

        info!(
            "Fetching Alpha Vantage earnings calendar (horizon={}, symbol={:?})",
            horizon, symbol
        );
        let request = HttpRequest::get(url).with_timeout(AV_TIMEOUT);
        let body = match self.transport.execute(request).await.and_then(|r| r.into_body()) {
            Ok(Some(body)) => body,
            Ok(None) => return Fetch::Empty,
            Err(err) => return Fetch::Failed(err),
        };

        match parse_calendar_csv(&body) {
            Ok(records) => {
                info!("Alpha Vantage returned {} calendar rows", records.len());
                Fetch::rows(records)
            }
            Err(err) => Fetch::Failed(err),
        }
    }
}

#[async_trait]
impl BulkCalendarProvider for AlphaVantageClient {
    async fn fetch_upcoming(&self) -> Fetch<Vec<CalendarRecord>> {
        self.fetch_calendar(BULK_HORIZON, None).await
    }
}

#[async_trait]
impl SymbolCalendarProvider for AlphaVantageClient {
    async fn fetch_symbol(&self, ticker: &str) -> Fetch<Vec<CalendarRecord>> {
        self.fetch_calendar(SYMBOL_HORIZON, Some(ticker)).await
    }
}

/// Parse the calendar CSV. Rows without a symbol or a valid `reportDate` are skipped.
///
/// Alpha Vantage answers quota and key problems with a small JSON note instead of CSV.
pub fn parse_calendar_csv(body: &str) -> Result<Vec<CalendarRecord>, ProviderError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        let preview: String = trimmed.chars().take(200).collect();
        warn!("Alpha Vantage returned a JSON note instead of CSV: {}", preview);
        return Err(ProviderError::Malformed(format!("expected csv, got: {preview}")));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(trimmed.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ProviderError::Malformed(format!("csv headers: {e}")))?
        .clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(symbol_col), Some(date_col)) = (column("symbol"), column("reportDate")) else {
        return Err(ProviderError::Malformed(format!(
            "csv missing symbol/reportDate columns: {:?}",
            headers
        )));
    };
    let name_col = column("name");
    let fiscal_col = column("fiscalDateEnding");
    let estimate_col = column("estimate");
    let time_col = column("timeOfTheDay");

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                debug!("Skipping unreadable Alpha Vantage row {}: {}", line + 1, err);
                continue;
            }
        };
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).filter(|s| !s.is_empty());

        let Some(symbol) = cell(Some(symbol_col)) else {
            continue;
        };
        let Some(report_date) = parse_iso_date(cell(Some(date_col))) else {
            debug!("Skipping {} row with bad reportDate {:?}", symbol, cell(Some(date_col)));
            continue;
        };

        let mut record = CalendarRecord::new(Source::AlphaVantage, symbol, report_date);
        record.company_name = cell(name_col).map(str::to_string);
        record.fiscal_quarter = normalize_fiscal_quarter(cell(fiscal_col));
        record.eps_estimate = parse_number(cell(estimate_col));
        record.report_time = report_time(cell(time_col));
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportTime;
    use crate::service::finance::http::testing::ScriptedTransport;
    use crate::service::finance::http::HttpResponse;
    use chrono::NaiveDate;

    const SAMPLE: &str = "symbol,name,reportDate,fiscalDateEnding,estimate,currency,timeOfTheDay
AAPL,Apple Inc.,2026-02-16,2025-12-31,2.35,USD,post-market
MSFT,Microsoft Corporation,2026-02-17,2025-12-31,3.12,USD,pre-market
GOOGL,Alphabet Inc.,2026-02-18,2025-12-31,,USD,
TSLA,Tesla Inc.,not-a-date,2025-12-31,0.95,USD,post-market
";

    #[test]
    fn parses_rows_and_skips_bad_dates() {
        let records = parse_calendar_csv(SAMPLE).unwrap();
        assert_eq!(records.len(), 3);

        let aapl = &records[0];
        assert_eq!(aapl.ticker, "AAPL");
        assert_eq!(aapl.report_date, NaiveDate::from_ymd_opt(2026, 2, 16).unwrap());
        assert_eq!(aapl.eps_estimate, Some(2.35));
        assert_eq!(aapl.report_time, ReportTime::PostMarket);
        assert_eq!(aapl.fiscal_quarter.as_deref(), Some("2025-12-31"));

        assert_eq!(records[1].report_time, ReportTime::PreMarket);
        assert_eq!(records[2].eps_estimate, None);
        assert_eq!(records[2].report_time, ReportTime::Unknown);
    }

    #[test]
    fn json_note_is_malformed() {
        let note = r#"{"Information": "Thank you for using Alpha Vantage! Please consider spreading out your free API requests"}"#;
        assert!(matches!(parse_calendar_csv(note), Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = AlphaVantageClient::new(transport.clone(), None);
        assert!(matches!(
            client.fetch_upcoming().await,
            Fetch::Failed(ProviderError::NotConfigured(_))
        ));
        assert!(transport.urls().is_empty());
    }

    #[tokio::test]
    async fn server_error_degrades_to_failed() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(HttpResponse::new(500, ""))]));
        let client = AlphaVantageClient::new(transport, Some("demo".into()));
        assert!(matches!(
            client.fetch_upcoming().await,
            Fetch::Failed(ProviderError::Status(500))
        ));
    }

    #[tokio::test]
    async fn symbol_lookup_uses_long_horizon() {
        let transport = Arc::new(ScriptedTransport::ok(SAMPLE));
        let client = AlphaVantageClient::new(transport.clone(), Some("demo".into()));
        let records = client.fetch_symbol("AAPL").await.data().unwrap();
        assert_eq!(records.len(), 3);

        let url = &transport.urls()[0];
        assert!(url.contains("horizon=12month"));
        assert!(url.contains("symbol=AAPL"));
    }
}
