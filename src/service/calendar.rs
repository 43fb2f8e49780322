use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::America::New_York;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{normalize_ticker, CalendarRecord, EarningsEvent, Highlights, Sparkline, WeekHighlights};
use crate::service::caching::collections::{calendar as calendar_cache, highlights as highlights_cache, sparkline as sparkline_cache};
use crate::service::caching::Cache;
use crate::service::enrichment::Enricher;
use crate::service::finance::parse::weekdays;
use crate::service::finance::{
    BulkCalendarProvider, DailyCalendarProvider, Fetch, PriceHistoryProvider,
    RangeCalendarProvider, SymbolCalendarProvider,
};
use crate::service::storage::{EarningsStore, UpsertSummary};

const HIGHLIGHTS_PER_WEEK: usize = 10;

/// Monday and Friday of the trading week for `anchor`.
///
/// Saturday and Sunday belong to the week that follows them.
pub fn week_bounds(anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = match anchor.weekday() {
        Weekday::Sat => anchor + Duration::days(2),
        Weekday::Sun => anchor + Duration::days(1),
        weekday => anchor - Duration::days(weekday.num_days_from_monday() as i64),
    };
    (monday, monday + Duration::days(4))
}

/// Today's date on the US equity calendar.
pub fn today_eastern() -> NaiveDate {
    Utc::now().with_timezone(&New_York).date_naive()
}

/// Report date ascending, then market cap descending (unknown counts as zero), then ticker.
pub fn sort_events(events: &mut [EarningsEvent]) {
    events.sort_by(|a, b| {
        a.report_date
            .cmp(&b.report_date)
            .then_with(|| cap_desc(a, b))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}

fn cap_desc(a: &EarningsEvent, b: &EarningsEvent) -> Ordering {
    b.market_cap
        .unwrap_or(0.0)
        .total_cmp(&a.market_cap.unwrap_or(0.0))
}

/// The largest `limit` events by market cap, ties kept in calendar order.
pub fn top_by_market_cap(events: &[EarningsEvent], limit: usize) -> Vec<EarningsEvent> {
    let mut ranked = events.to_vec();
    ranked.sort_by(cap_desc);
    ranked.truncate(limit);
    ranked
}

/// Upstream feeds the calendar draws on.
#[derive(Clone)]
pub struct CalendarProviders {
    pub bulk: Arc<dyn BulkCalendarProvider>,
    pub range: Arc<dyn RangeCalendarProvider>,
    pub daily: Arc<dyn DailyCalendarProvider>,
    pub symbol: Arc<dyn SymbolCalendarProvider>,
    pub prices: Arc<dyn PriceHistoryProvider>,
}

#[derive(Clone)]
pub struct CalendarService {
    store: EarningsStore,
    cache: Cache,
    providers: CalendarProviders,
    enricher: Enricher,
}

impl CalendarService {
    pub fn new(store: EarningsStore, cache: Cache, providers: CalendarProviders, enricher: Enricher) -> Self {
        Self {
            store,
            cache,
            providers,
            enricher,
        }
    }

    pub async fn get_week_earnings(&self, anchor: NaiveDate) -> Result<Vec<EarningsEvent>> {
        self.get_week_earnings_as_of(anchor, today_eastern()).await
    }

    /// Week view for `anchor`, treating `today` as the current date.
    pub async fn get_week_earnings_as_of(
        &self,
        anchor: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<EarningsEvent>> {
        let (monday, friday) = week_bounds(anchor);
        if let Some(events) = calendar_cache::load_week(&self.cache, monday).await {
            debug!("Calendar snapshot hit for week of {}", monday);
            return Ok(events);
        }

        self.sync_if_due().await;

        let mut events = self.store.events_between(monday, friday).await?;
        if events.is_empty() {
            if friday < today {
                self.backfill_week(monday, friday).await;
            } else {
                self.fill_from_range(monday, friday).await;
            }
            events = self.store.events_between(monday, friday).await?;
        }

        let mut events = self.enricher.enrich(events).await;
        sort_events(&mut events);

        if !events.is_empty() {
            calendar_cache::store_week(&self.cache, monday, &events).await;
        }
        info!("Week of {} has {} earnings events", monday, events.len());
        Ok(events)
    }

    /// Bulk calendar sync, at most once per sync interval.
    ///
    /// Best effort: neither a provider failure nor a failed merge reaches the caller,
    /// and both leave the marker unset so the next request tries again.
    async fn sync_if_due(&self) {
        if !calendar_cache::sync_due(&self.cache).await {
            return;
        }

        match self.providers.bulk.fetch_upcoming().await {
            Fetch::Data(records) => {
                if let Some(summary) = self.merge(&records, "Bulk calendar sync").await {
                    info!(
                        "Bulk calendar sync stored {} new and {} merged events",
                        summary.inserted, summary.updated
                    );
                    calendar_cache::mark_synced(&self.cache, Utc::now()).await;
                }
            }
            Fetch::Empty => {
                info!("Bulk calendar sync returned no rows");
                calendar_cache::mark_synced(&self.cache, Utc::now()).await;
            }
            Fetch::Failed(err) => warn!("Bulk calendar sync failed, will retry on next request: {}", err),
        }
    }

    /// Upsert provider rows, logging a failed merge instead of returning it.
    async fn merge(&self, records: &[CalendarRecord], what: &str) -> Option<UpsertSummary> {
        match self.store.upsert_records(records).await {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("{} could not store {} records: {}", what, records.len(), err);
                None
            }
        }
    }

    /// One pass over a past week's trading days, skipped while the week's marker is live.
    async fn backfill_week(&self, monday: NaiveDate, friday: NaiveDate) {
        if calendar_cache::backfill_done(&self.cache, monday).await {
            debug!("Backfill for week of {} already attempted", monday);
            return;
        }

        info!("Backfilling historical earnings for {} to {}", monday, friday);
        let mut records = Vec::new();
        for day in weekdays(monday, friday) {
            match self.providers.daily.fetch_day(day).await {
                Fetch::Data(rows) => records.extend(rows),
                Fetch::Empty => debug!("No historical earnings on {}", day),
                Fetch::Failed(err) => warn!("Historical earnings for {} failed: {}", day, err),
            }
        }

        if !records.is_empty() && self.merge(&records, "Historical backfill").await.is_none() {
            return;
        }
        calendar_cache::mark_backfilled(&self.cache, monday, Utc::now()).await;
    }

    async fn fill_from_range(&self, monday: NaiveDate, friday: NaiveDate) {
        if let Some(records) = self
            .providers
            .range
            .fetch_range(monday, friday)
            .await
            .or_warn("Range calendar lookup")
        {
            self.merge(&records, "Range calendar lookup").await;
        }
    }

    /// Refresh one ticker from the symbol-scoped feed and return everything stored for it.
    pub async fn search_ticker(&self, ticker: &str) -> Result<Vec<EarningsEvent>> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(records) = self
            .providers
            .symbol
            .fetch_symbol(&ticker)
            .await
            .or_warn("Symbol calendar lookup")
        {
            let records: Vec<_> = records.into_iter().filter(|r| r.ticker == ticker).collect();
            if self.merge(&records, "Symbol calendar lookup").await.is_some() {
                self.invalidate_weeks(&records).await;
            }
        }

        let events = self.store.events_for_ticker(&ticker).await?;
        Ok(self.enricher.enrich(events).await)
    }

    /// Drop week snapshots (and the highlights built from them) that `records` touch.
    async fn invalidate_weeks(&self, records: &[CalendarRecord]) {
        let mondays: BTreeSet<NaiveDate> = records.iter().map(|r| week_bounds(r.report_date).0).collect();
        if mondays.is_empty() {
            return;
        }
        for monday in &mondays {
            calendar_cache::invalidate_week(&self.cache, *monday).await;
        }
        highlights_cache::invalidate(&self.cache).await;
        debug!("Invalidated {} week snapshots", mondays.len());
    }

    pub async fn highlights(&self) -> Result<Highlights> {
        self.highlights_as_of(today_eastern()).await
    }

    /// Largest reporters of last week and this week.
    pub async fn highlights_as_of(&self, today: NaiveDate) -> Result<Highlights> {
        if let Some(cached) = highlights_cache::load(&self.cache).await {
            return Ok(cached);
        }

        let (this_monday, this_friday) = week_bounds(today);
        let (last_monday, last_friday) = week_bounds(this_monday - Duration::days(7));

        let last_events = self.get_week_earnings_as_of(last_monday, today).await?;
        let this_events = self.get_week_earnings_as_of(this_monday, today).await?;

        let highlights = Highlights {
            last_week: WeekHighlights {
                week_start: last_monday,
                week_end: last_friday,
                events: top_by_market_cap(&last_events, HIGHLIGHTS_PER_WEEK),
            },
            this_week: WeekHighlights {
                week_start: this_monday,
                week_end: this_friday,
                events: top_by_market_cap(&this_events, HIGHLIGHTS_PER_WEEK),
            },
        };

        if !highlights.last_week.events.is_empty() || !highlights.this_week.events.is_empty() {
            highlights_cache::store(&self.cache, &highlights).await;
        }
        Ok(highlights)
    }

    /// Recent daily closes. A provider miss yields an empty, uncached series.
    pub async fn sparkline(&self, ticker: &str) -> Sparkline {
        let ticker = normalize_ticker(ticker);
        if let Some(cached) = sparkline_cache::load(&self.cache, &ticker).await {
            return cached;
        }

        match self
            .providers
            .prices
            .daily_closes(&ticker)
            .await
            .or_warn("Price history lookup")
        {
            Some(closes) => {
                let sparkline = Sparkline { ticker, closes };
                sparkline_cache::store(&self.cache, &sparkline).await;
                sparkline
            }
            None => Sparkline {
                ticker,
                closes: Vec::new(),
            },
        }
    }
}
