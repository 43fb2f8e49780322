use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{AnalysisRecord, CalendarRecord, EarningsAnalysis, EarningsEvent, ReportTime};

const SCHEMA: &str = include_str!("../../../schema.sql");

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_COLUMNS: &str = "id, ticker, company_name, report_date, report_time, fiscal_quarter, \
     eps_estimate, revenue_estimate, market_cap";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode raw analysis: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    ticker: String,
    company_name: String,
    report_date: NaiveDate,
    report_time: String,
    fiscal_quarter: Option<String>,
    eps_estimate: Option<f64>,
    revenue_estimate: Option<f64>,
    market_cap: Option<f64>,
}

impl From<EventRow> for EarningsEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            ticker: row.ticker,
            company_name: row.company_name,
            report_date: row.report_date,
            report_time: row.report_time.parse().unwrap_or(ReportTime::Unknown),
            fiscal_quarter: row.fiscal_quarter,
            eps_estimate: row.eps_estimate,
            revenue_estimate: row.revenue_estimate,
            market_cap: row.market_cap,
        }
    }
}

#[derive(Debug, FromRow)]
struct AnalysisRow {
    id: i64,
    earnings_event_id: i64,
    ticker: String,
    eps_estimate: Option<f64>,
    eps_actual: Option<f64>,
    eps_surprise_pct: Option<f64>,
    revenue_estimate: Option<f64>,
    revenue_actual: Option<f64>,
    revenue_surprise_pct: Option<f64>,
    guidance_summary: Option<String>,
    sentiment: Option<String>,
    sentiment_score: Option<f64>,
    price_reaction_pct: Option<f64>,
    raw_analysis: Option<String>,
    analyzed_at: DateTime<Utc>,
}

impl From<AnalysisRow> for EarningsAnalysis {
    fn from(row: AnalysisRow) -> Self {
        Self {
            id: row.id,
            earnings_event_id: row.earnings_event_id,
            ticker: row.ticker,
            eps_estimate: row.eps_estimate,
            eps_actual: row.eps_actual,
            eps_surprise_pct: row.eps_surprise_pct,
            revenue_estimate: row.revenue_estimate,
            revenue_actual: row.revenue_actual,
            revenue_surprise_pct: row.revenue_surprise_pct,
            guidance_summary: row.guidance_summary,
            sentiment: row.sentiment.as_deref().and_then(|s| s.parse().ok()),
            sentiment_score: row.sentiment_score,
            price_reaction_pct: row.price_reaction_pct,
            raw_analysis: row
                .raw_analysis
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
            analyzed_at: row.analyzed_at,
        }
    }
}

/// Counts from one [`EarningsStore::upsert_records`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

/// SQLite-backed event and analysis tables.
#[derive(Clone)]
pub struct EarningsStore {
    pool: SqlitePool,
}

impl EarningsStore {
    /// Connect and apply the bootstrap schema.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Earnings store ready at {}", database_url);
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        // sqlx runs one statement per query.
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Merge provider records into the event table.
    ///
    /// Records sharing a (ticker, report_date) key are folded together first, then
    /// merged onto any stored row with the coalesce rules of [`EarningsEvent::absorb`].
    /// Replaying the same batch leaves the table unchanged.
    pub async fn upsert_records(&self, records: &[CalendarRecord]) -> Result<UpsertSummary, StoreError> {
        if records.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let mut order: Vec<(String, NaiveDate)> = Vec::new();
        let mut grouped: HashMap<(String, NaiveDate), Vec<&CalendarRecord>> = HashMap::new();
        for record in records {
            let key = record.key();
            grouped
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(record);
        }

        let mut summary = UpsertSummary::default();
        // Reads below are followed by writes; take the write lock before the first read
        // so concurrent syncs queue on the busy timeout instead of failing to upgrade.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        for key in &order {
            let Some(batch) = grouped.get(key) else {
                continue;
            };
            let existing = fetch_event(&mut tx, &key.0, key.1).await?;
            let is_new = existing.is_none();

            let mut event = match existing {
                Some(event) => event,
                None => EarningsEvent::from_record(batch[0]),
            };
            for record in batch {
                event.absorb(record);
            }

            write_event(&mut tx, &event).await?;
            if is_new {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        tx.commit().await?;
        debug!(
            "Upserted {} calendar records ({} new, {} merged)",
            records.len(),
            summary.inserted,
            summary.updated
        );
        Ok(summary)
    }

    /// Events with `from <= report_date <= to`, by date then ticker.
    pub async fn events_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<EarningsEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM earnings_events \
             WHERE report_date >= ? AND report_date <= ? \
             ORDER BY report_date ASC, ticker ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EarningsEvent::from).collect())
    }

    pub async fn events_for_ticker(&self, ticker: &str) -> Result<Vec<EarningsEvent>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM earnings_events WHERE ticker = ? ORDER BY report_date ASC"
        ))
        .bind(ticker.to_ascii_uppercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EarningsEvent::from).collect())
    }

    /// Most recent event by report date.
    pub async fn latest_event_for_ticker(&self, ticker: &str) -> Result<Option<EarningsEvent>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM earnings_events WHERE ticker = ? \
             ORDER BY report_date DESC LIMIT 1"
        ))
        .bind(ticker.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EarningsEvent::from))
    }

    pub async fn count_events(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM earnings_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Write refreshed market caps in one transaction; any failure rolls back all of them.
    pub async fn update_market_caps(&self, caps: &[(i64, f64)]) -> Result<usize, StoreError> {
        if caps.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        let mut updated = 0;
        for (id, cap) in caps {
            let result = sqlx::query("UPDATE earnings_events SET market_cap = ? WHERE id = ?")
                .bind(cap)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            updated += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Append an analysis row. Earlier rows for the event are kept.
    pub async fn insert_analysis(
        &self,
        earnings_event_id: i64,
        record: &AnalysisRecord,
        raw: &Value,
        analyzed_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let raw_text = serde_json::to_string(raw)?;
        let result = sqlx::query(
            "INSERT INTO earnings_analyses (earnings_event_id, eps_estimate, eps_actual, \
             eps_surprise_pct, revenue_estimate, revenue_actual, revenue_surprise_pct, \
             guidance_summary, sentiment, sentiment_score, price_reaction_pct, raw_analysis, \
             analyzed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(earnings_event_id)
        .bind(record.eps_estimate)
        .bind(record.eps_actual)
        .bind(record.eps_surprise_pct)
        .bind(record.revenue_estimate)
        .bind(record.revenue_actual)
        .bind(record.revenue_surprise_pct)
        .bind(record.guidance_summary.as_deref())
        .bind(record.sentiment.map(|s| s.as_str()))
        .bind(record.sentiment_score)
        .bind(record.price_reaction_pct)
        .bind(raw_text)
        .bind(analyzed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Newest analysis across all of the ticker's events.
    pub async fn latest_analysis_for_ticker(&self, ticker: &str) -> Result<Option<EarningsAnalysis>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            "SELECT a.id, a.earnings_event_id, e.ticker, a.eps_estimate, a.eps_actual, \
             a.eps_surprise_pct, a.revenue_estimate, a.revenue_actual, a.revenue_surprise_pct, \
             a.guidance_summary, a.sentiment, a.sentiment_score, a.price_reaction_pct, \
             a.raw_analysis, a.analyzed_at \
             FROM earnings_analyses a JOIN earnings_events e ON e.id = a.earnings_event_id \
             WHERE e.ticker = ? ORDER BY a.analyzed_at DESC, a.id DESC LIMIT 1",
        )
        .bind(ticker.to_ascii_uppercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EarningsAnalysis::from))
    }
}

async fn fetch_event(
    tx: &mut Transaction<'_, Sqlite>,
    ticker: &str,
    report_date: NaiveDate,
) -> Result<Option<EarningsEvent>, StoreError> {
    let row = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM earnings_events WHERE ticker = ? AND report_date = ?"
    ))
    .bind(ticker)
    .bind(report_date)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(EarningsEvent::from))
}

async fn write_event(tx: &mut Transaction<'_, Sqlite>, event: &EarningsEvent) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO earnings_events (ticker, company_name, report_date, report_time, \
         fiscal_quarter, eps_estimate, revenue_estimate, market_cap) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (ticker, report_date) DO UPDATE SET \
         company_name = excluded.company_name, \
         report_time = excluded.report_time, \
         fiscal_quarter = excluded.fiscal_quarter, \
         eps_estimate = excluded.eps_estimate, \
         revenue_estimate = excluded.revenue_estimate, \
         market_cap = excluded.market_cap",
    )
    .bind(&event.ticker)
    .bind(&event.company_name)
    .bind(event.report_date)
    .bind(event.report_time.as_str())
    .bind(event.fiscal_quarter.as_deref())
    .bind(event.eps_estimate)
    .bind(event.revenue_estimate)
    .bind(event.market_cap)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sentiment, Source};
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    async fn store() -> EarningsStore {
        EarningsStore::open("sqlite::memory:").await.unwrap()
    }

    fn aapl() -> CalendarRecord {
        let mut record = CalendarRecord::new(Source::AlphaVantage, "AAPL", day(16));
        record.company_name = Some("Apple Inc.".into());
        record.eps_estimate = Some(2.35);
        record.report_time = ReportTime::PostMarket;
        record
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = store().await;
        let batch = vec![aapl()];

        let first = store.upsert_records(&batch).await.unwrap();
        assert_eq!(first, UpsertSummary { inserted: 1, updated: 0 });
        let before = store.events_between(day(16), day(20)).await.unwrap();

        let second = store.upsert_records(&batch).await.unwrap();
        assert_eq!(second, UpsertSummary { inserted: 0, updated: 1 });
        let after = store.events_between(day(16), day(20)).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sparse_update_keeps_known_fields() {
        let store = store().await;
        store.upsert_records(&[aapl()]).await.unwrap();

        let sparse = CalendarRecord::new(Source::Nasdaq, "AAPL", day(16));
        store.upsert_records(&[sparse]).await.unwrap();

        let event = store.latest_event_for_ticker("aapl").await.unwrap().unwrap();
        assert_eq!(event.company_name, "Apple Inc.");
        assert_eq!(event.eps_estimate, Some(2.35));
        assert_eq!(event.report_time, ReportTime::PostMarket);
    }

    #[tokio::test]
    async fn duplicates_within_a_batch_are_folded() {
        let store = store().await;
        let mut later = CalendarRecord::new(Source::Fmp, "AAPL", day(16));
        later.revenue_estimate = Some(1.24e11);

        let summary = store.upsert_records(&[aapl(), later]).await.unwrap();
        assert_eq!(summary.inserted, 1);

        let events = store.events_for_ticker("AAPL").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].eps_estimate, Some(2.35));
        assert_eq!(events[0].revenue_estimate, Some(1.24e11));
    }

    #[tokio::test]
    async fn market_caps_update_by_id() {
        let store = store().await;
        store.upsert_records(&[aapl()]).await.unwrap();
        let event = store.latest_event_for_ticker("AAPL").await.unwrap().unwrap();

        let updated = store.update_market_caps(&[(event.id, 3.7e12)]).await.unwrap();
        assert_eq!(updated, 1);
        let event = store.latest_event_for_ticker("AAPL").await.unwrap().unwrap();
        assert_eq!(event.market_cap, Some(3.7e12));
    }

    #[tokio::test]
    async fn latest_analysis_wins_and_history_is_kept() {
        let store = store().await;
        store.upsert_records(&[aapl()]).await.unwrap();
        let event = store.latest_event_for_ticker("AAPL").await.unwrap().unwrap();

        let mut record: AnalysisRecord =
            serde_json::from_value(json!({"has_reported": false, "sentiment": "neutral"})).unwrap();
        let t0 = Utc::now() - chrono::Duration::hours(1);
        store
            .insert_analysis(event.id, &record, &json!({"has_reported": false}), t0)
            .await
            .unwrap();

        record.has_reported = true;
        record.eps_actual = Some(2.40);
        record.sentiment = Some(Sentiment::Bullish);
        let newest = store
            .insert_analysis(event.id, &record, &json!({"has_reported": true}), Utc::now())
            .await
            .unwrap();

        let latest = store.latest_analysis_for_ticker("aapl").await.unwrap().unwrap();
        assert_eq!(latest.id, newest);
        assert_eq!(latest.eps_actual, Some(2.40));
        assert_eq!(latest.sentiment, Some(Sentiment::Bullish));
        assert!(latest.has_reported());

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM earnings_analyses")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn no_analysis_is_none() {
        let store = store().await;
        assert!(store.latest_analysis_for_ticker("AAPL").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_on_a_file_database_all_commit() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("earnings-store-{}-{nanos}.db", std::process::id()));
        let store = EarningsStore::open(&format!("sqlite://{}", path.display())).await.unwrap();

        let batch: Vec<CalendarRecord> = (0..500)
            .map(|i| CalendarRecord::new(Source::AlphaVantage, &format!("T{i:04}"), day(16 + (i % 5) as u32)))
            .collect();
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let batch = batch.clone();
                tokio::spawn(async move { store.upsert_records(&batch).await })
            })
            .collect();

        let mut inserted = 0;
        for writer in writers {
            let summary = writer.await.unwrap().unwrap();
            assert_eq!(summary.inserted + summary.updated, 500);
            inserted += summary.inserted;
        }
        assert_eq!(inserted, 500);
        assert_eq!(store.count_events().await.unwrap(), 500);

        store.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
