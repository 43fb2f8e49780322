use crate::models::AnalysisReport;
use crate::service::caching::keys::{analysis_key, analysis_ttl};
use crate::service::caching::Cache;

pub async fn load(cache: &Cache, ticker: &str, quarter: &str) -> Option<AnalysisReport> {
    cache.get_json(&analysis_key(ticker, quarter)).await
}

/// Reported analyses are stable and kept for a week; pre-report ones expire within hours.
pub async fn store(cache: &Cache, report: &AnalysisReport) {
    let key = analysis_key(&report.ticker, &report.quarter);
    cache
        .set_json(&key, report, analysis_ttl(report.record.has_reported))
        .await;
}
