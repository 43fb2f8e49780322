use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// When a company reports relative to the trading session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTime {
    PreMarket,
    PostMarket,
    #[default]
    Unknown,
}

impl ReportTime {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTime::PreMarket => "pre_market",
            ReportTime::PostMarket => "post_market",
            ReportTime::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ReportTime::Unknown)
    }
}

impl fmt::Display for ReportTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportTime {
    type Err = std::convert::Infallible;

    /// Parses the stored column value. Anything unrecognised reads back as `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pre_market" => ReportTime::PreMarket,
            "post_market" => ReportTime::PostMarket,
            _ => ReportTime::Unknown,
        })
    }
}

/// Which upstream a calendar row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    AlphaVantage,
    Fmp,
    Nasdaq,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::AlphaVantage => "alpha_vantage",
            Source::Fmp => "fmp",
            Source::Nasdaq => "nasdaq",
        }
    }
}

/// Normalized calendar row produced by a provider adapter.
///
/// Adapters validate and normalize once at their boundary; everything downstream
/// only ever sees this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub source: Source,
    pub ticker: String,
    pub company_name: Option<String>,
    pub report_date: NaiveDate,
    pub report_time: ReportTime,
    pub fiscal_quarter: Option<String>,
    pub eps_estimate: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub market_cap: Option<f64>,
}

impl CalendarRecord {
    /// Minimal record with only the key populated.
    pub fn new(source: Source, ticker: impl Into<String>, report_date: NaiveDate) -> Self {
        Self {
            source,
            ticker: normalize_ticker(&ticker.into()),
            company_name: None,
            report_date,
            report_time: ReportTime::Unknown,
            fiscal_quarter: None,
            eps_estimate: None,
            revenue_estimate: None,
            market_cap: None,
        }
    }

    pub fn key(&self) -> (String, NaiveDate) {
        (self.ticker.clone(), self.report_date)
    }
}

/// Canonical earnings event, one per (ticker, report_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsEvent {
    /// Store-assigned row id; `0` until the event has been written.
    pub id: i64,
    pub ticker: String,
    pub company_name: String,
    pub report_date: NaiveDate,
    pub report_time: ReportTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_quarter: Option<String>,
    pub eps_estimate: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub market_cap: Option<f64>,
}

impl EarningsEvent {
    /// Build a not-yet-persisted event from a provider record.
    pub fn from_record(record: &CalendarRecord) -> Self {
        let company_name = record
            .company_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| record.ticker.clone());

        Self {
            id: 0,
            ticker: record.ticker.clone(),
            company_name,
            report_date: record.report_date,
            report_time: record.report_time,
            fiscal_quarter: record.fiscal_quarter.clone(),
            eps_estimate: record.eps_estimate,
            revenue_estimate: record.revenue_estimate,
            market_cap: record.market_cap,
        }
    }

    /// Merge a provider record into this event.
    ///
    /// Fields the record supplies overwrite; fields it leaves empty never erase a
    /// known value. `ReportTime::Unknown` counts as not supplied.
    pub fn absorb(&mut self, record: &CalendarRecord) {
        debug_assert_eq!(self.key(), record.key());

        if let Some(name) = record.company_name.as_ref().filter(|n| !n.trim().is_empty()) {
            self.company_name = name.clone();
        }
        if record.report_time.is_known() {
            self.report_time = record.report_time;
        }
        coalesce(&mut self.fiscal_quarter, record.fiscal_quarter.clone());
        coalesce(&mut self.eps_estimate, record.eps_estimate);
        coalesce(&mut self.revenue_estimate, record.revenue_estimate);
        coalesce(&mut self.market_cap, record.market_cap);
    }

    /// Enrichment path: a fresher market cap always wins over the stored one.
    pub fn refresh_market_cap(&mut self, market_cap: Option<f64>) {
        if market_cap.is_some() {
            self.market_cap = market_cap;
        }
    }

    pub fn key(&self) -> (String, NaiveDate) {
        (self.ticker.clone(), self.report_date)
    }
}

/// Overwrite `slot` only when `incoming` carries a value.
pub fn coalesce<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Uppercase, trimmed ticker symbol.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
