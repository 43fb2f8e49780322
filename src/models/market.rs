use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::EarningsEvent;

/// Top events of one Monday..Friday week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekHighlights {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub events: Vec<EarningsEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlights {
    pub last_week: WeekHighlights,
    pub this_week: WeekHighlights,
}

/// Recent daily closes, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sparkline {
    pub ticker: String,
    pub closes: Vec<f64>,
}
