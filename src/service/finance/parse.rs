//! Normalizers shared by the provider adapters.

use chrono::{Datelike, NaiveDate};

use crate::models::ReportTime;

const PRE_MARKET_MARKERS: &[&str] = &["bmo", "before", "pre-market", "premarket", "pre market"];
const POST_MARKET_MARKERS: &[&str] = &["amc", "after", "post-market", "postmarket", "post market"];

/// Map a provider's free-form timing label onto a session.
pub fn report_time(raw: Option<&str>) -> ReportTime {
    let Some(raw) = raw else {
        return ReportTime::Unknown;
    };
    let t = raw.trim().to_ascii_lowercase();
    if t.is_empty() {
        return ReportTime::Unknown;
    }

    if PRE_MARKET_MARKERS.iter().any(|m| t.contains(m)) {
        return ReportTime::PreMarket;
    }
    if POST_MARKET_MARKERS.iter().any(|m| t.contains(m)) {
        return ReportTime::PostMarket;
    }
    ReportTime::Unknown
}

/// Parse a dollar amount such as `"$2.35"`, `"($0.13)"` or `"$3,759,435,415,339"`.
///
/// Blank or unparsable input is `None`, never zero.
pub fn parse_dollar(raw: Option<&str>) -> Option<f64> {
    let t = raw?.trim();
    if t.is_empty() {
        return None;
    }

    let (negative, inner) = match t.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, t),
    };
    let cleaned: String = inner
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let value = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;

    Some(if negative { -value.abs() } else { value })
}

/// Plain numeric cell (CSV estimate columns). Blank means missing.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let t = raw?.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("none") {
        return None;
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_iso_date(raw: Option<&str>) -> Option<NaiveDate> {
    let t = raw?.trim();
    NaiveDate::parse_from_str(t.get(..10).unwrap_or(t), "%Y-%m-%d").ok()
}

/// Turn a fiscal-quarter label into the ISO date of the quarter's last day.
///
/// `"Dec/2025"` becomes `"2025-12-31"`; ISO dates pass through; anything else is kept as given.
pub fn normalize_fiscal_quarter(raw: Option<&str>) -> Option<String> {
    let t = raw?.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(date) = parse_iso_date(Some(t)) {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let Some((month_label, year)) = t.split_once('/') else {
        return Some(t.to_string());
    };
    let month = month_number(month_label);
    let year = year.trim().parse::<i32>().ok();
    match (month, year) {
        (Some(month), Some(year)) => {
            last_day_of_month(year, month).map(|d| d.format("%Y-%m-%d").to_string())
        }
        _ => Some(t.to_string()),
    }
}

fn month_number(label: &str) -> Option<u32> {
    let label = label.trim().to_ascii_lowercase();
    let prefix = label.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Weekdays from `from` through `to` inclusive.
pub fn weekdays(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| d.weekday().num_days_from_monday() < 5)
        .collect()
}
