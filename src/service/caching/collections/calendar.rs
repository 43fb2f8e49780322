use chrono::{DateTime, NaiveDate, Utc};

use crate::models::EarningsEvent;
use crate::service::caching::keys::{
    backfill_key, calendar_key, BACKFILL_TTL, CALENDAR_TTL, LAST_SYNC_KEY, SYNC_INTERVAL,
};
use crate::service::caching::Cache;

pub async fn load_week(cache: &Cache, monday: NaiveDate) -> Option<Vec<EarningsEvent>> {
    cache.get_json(&calendar_key(monday)).await
}

pub async fn store_week(cache: &Cache, monday: NaiveDate, events: &[EarningsEvent]) {
    cache.set_json(&calendar_key(monday), &events, CALENDAR_TTL).await;
}

pub async fn invalidate_week(cache: &Cache, monday: NaiveDate) {
    cache.delete(&calendar_key(monday)).await;
}

/// True when no bulk sync has been recorded within the sync interval.
///
/// The marker is advisory: two callers can both see it missing and both sync.
pub async fn sync_due(cache: &Cache) -> bool {
    cache.get(LAST_SYNC_KEY).await.is_none()
}

pub async fn mark_synced(cache: &Cache, at: DateTime<Utc>) {
    cache.set(LAST_SYNC_KEY, &at.to_rfc3339(), SYNC_INTERVAL).await;
}

pub async fn backfill_done(cache: &Cache, monday: NaiveDate) -> bool {
    cache.get(&backfill_key(monday)).await.is_some()
}

pub async fn mark_backfilled(cache: &Cache, monday: NaiveDate, at: DateTime<Utc>) {
    cache.set(&backfill_key(monday), &at.to_rfc3339(), BACKFILL_TTL).await;
}
