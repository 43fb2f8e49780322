//! Cache key layout (`domain:entity:identifier[:sub]`) and per-entity lifetimes.

use std::time::Duration;

use chrono::NaiveDate;

const HOUR: u64 = 60 * 60;

pub const CALENDAR_TTL: Duration = Duration::from_secs(4 * HOUR);
pub const MARKET_CAP_TTL: Duration = Duration::from_secs(24 * HOUR);
pub const ANALYSIS_REPORTED_TTL: Duration = Duration::from_secs(7 * 24 * HOUR);
pub const ANALYSIS_PENDING_TTL: Duration = Duration::from_secs(4 * HOUR);
pub const HIGHLIGHTS_TTL: Duration = Duration::from_secs(4 * HOUR);
pub const SPARKLINE_TTL: Duration = Duration::from_secs(12 * HOUR);
/// Minimum spacing between two bulk calendar syncs.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(4 * HOUR);
pub const BACKFILL_TTL: Duration = Duration::from_secs(4 * HOUR);
pub const NEWS_TTL: Duration = Duration::from_secs(HOUR);

pub const HIGHLIGHTS_KEY: &str = "earnings:highlights";
pub const LAST_SYNC_KEY: &str = "earnings:av_last_sync";

pub fn calendar_key(monday: NaiveDate) -> String {
    format!("earnings:calendar:{}", monday.format("%Y-%m-%d"))
}

pub fn market_cap_key(ticker: &str) -> String {
    format!("earnings:mcap:{}", ticker.to_ascii_uppercase())
}

pub fn analysis_key(ticker: &str, quarter: &str) -> String {
    format!("earnings:analysis:{}:{}", ticker.to_ascii_uppercase(), quarter)
}

pub fn sparkline_key(ticker: &str) -> String {
    format!("earnings:sparkline:{}", ticker.to_ascii_uppercase())
}

pub fn backfill_key(monday: NaiveDate) -> String {
    format!("earnings:backfill:{}", monday.format("%Y-%m-%d"))
}

/// Headlines live outside the `earnings:` namespace.
pub fn news_key(ticker: &str, days: u32) -> String {
    format!("news:{}:{}", ticker.to_ascii_uppercase(), days)
}

pub fn analysis_ttl(has_reported: bool) -> Duration {
    if has_reported {
        ANALYSIS_REPORTED_TTL
    } else {
        ANALYSIS_PENDING_TTL
    }
}
