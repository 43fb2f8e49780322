use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bullish" => Ok(Sentiment::Bullish),
            "bearish" => Ok(Sentiment::Bearish),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment {other:?}")),
        }
    }
}

fn default_has_reported() -> bool {
    true
}

/// Fixed-shape record returned by the structured-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default = "default_has_reported")]
    pub has_reported: bool,
    #[serde(default)]
    pub eps_estimate: Option<f64>,
    #[serde(default)]
    pub eps_actual: Option<f64>,
    #[serde(default)]
    pub eps_surprise_pct: Option<f64>,
    #[serde(default)]
    pub revenue_estimate: Option<f64>,
    #[serde(default)]
    pub revenue_actual: Option<f64>,
    #[serde(default)]
    pub revenue_surprise_pct: Option<f64>,
    #[serde(default)]
    pub guidance_summary: Option<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub price_reaction_pct: Option<f64>,
}

impl AnalysisRecord {
    /// True unless a pre-report record carries any "actual" figure.
    pub fn respects_report_status(&self) -> bool {
        self.has_reported
            || (self.eps_actual.is_none()
                && self.revenue_actual.is_none()
                && self.eps_surprise_pct.is_none()
                && self.revenue_surprise_pct.is_none()
                && self.price_reaction_pct.is_none())
    }
}

/// Analysis as handed back to callers and written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings_event_id: Option<i64>,
    pub ticker: String,
    pub quarter: String,
    #[serde(flatten)]
    pub record: AnalysisRecord,
}

/// Persisted analysis row. Rows are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsAnalysis {
    pub id: i64,
    pub earnings_event_id: i64,
    pub ticker: String,
    pub eps_estimate: Option<f64>,
    pub eps_actual: Option<f64>,
    pub eps_surprise_pct: Option<f64>,
    pub revenue_estimate: Option<f64>,
    pub revenue_actual: Option<f64>,
    pub revenue_surprise_pct: Option<f64>,
    pub guidance_summary: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub sentiment_score: Option<f64>,
    pub price_reaction_pct: Option<f64>,
    pub raw_analysis: Option<Value>,
    pub analyzed_at: DateTime<Utc>,
}

impl EarningsAnalysis {
    /// `has_reported` as recorded in the raw payload; rows without one count as reported.
    pub fn has_reported(&self) -> bool {
        self.raw_analysis
            .as_ref()
            .and_then(|raw| raw.get("has_reported"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_has_reported_defaults_to_true() {
        let record: AnalysisRecord = serde_json::from_value(json!({
            "eps_actual": 2.4,
            "sentiment": "bullish"
        }))
        .unwrap();
        assert!(record.has_reported);
        assert_eq!(record.sentiment, Some(Sentiment::Bullish));
    }

    #[test]
    fn pre_report_record_with_actuals_is_flagged() {
        let record: AnalysisRecord = serde_json::from_value(json!({
            "has_reported": false,
            "eps_estimate": 2.35,
            "eps_actual": 2.40
        }))
        .unwrap();
        assert!(!record.respects_report_status());
    }

    #[test]
    fn pre_report_record_without_actuals_passes() {
        let record: AnalysisRecord = serde_json::from_value(json!({
            "has_reported": false,
            "eps_estimate": 2.35,
            "guidance_summary": "Management expects services growth to continue."
        }))
        .unwrap();
        assert!(record.respects_report_status());
    }

    #[test]
    fn report_flattens_record_fields() {
        let report = AnalysisReport {
            id: Some(7),
            earnings_event_id: Some(3),
            ticker: "AAPL".into(),
            quarter: "Q4-2025".into(),
            record: AnalysisRecord {
                has_reported: true,
                eps_estimate: Some(2.35),
                eps_actual: Some(2.4),
                eps_surprise_pct: Some(2.13),
                revenue_estimate: None,
                revenue_actual: None,
                revenue_surprise_pct: None,
                guidance_summary: None,
                sentiment: Some(Sentiment::Neutral),
                sentiment_score: Some(0.6),
                price_reaction_pct: Some(-1.2),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["has_reported"], json!(true));
        assert_eq!(value["sentiment"], json!("neutral"));
        assert_eq!(value["ticker"], json!("AAPL"));

        let back: AnalysisReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn stored_row_reads_has_reported_from_raw() {
        let row = EarningsAnalysis {
            id: 1,
            earnings_event_id: 1,
            ticker: "AAPL".into(),
            eps_estimate: None,
            eps_actual: None,
            eps_surprise_pct: None,
            revenue_estimate: None,
            revenue_actual: None,
            revenue_surprise_pct: None,
            guidance_summary: None,
            sentiment: None,
            sentiment_score: None,
            price_reaction_pct: None,
            raw_analysis: Some(json!({ "has_reported": false })),
            analyzed_at: Utc::now(),
        };
        assert!(!row.has_reported());
    }
}
