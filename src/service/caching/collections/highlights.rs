use crate::models::Highlights;
use crate::service::caching::keys::{HIGHLIGHTS_KEY, HIGHLIGHTS_TTL};
use crate::service::caching::Cache;

pub async fn load(cache: &Cache) -> Option<Highlights> {
    cache.get_json(HIGHLIGHTS_KEY).await
}

pub async fn store(cache: &Cache, highlights: &Highlights) {
    cache.set_json(HIGHLIGHTS_KEY, highlights, HIGHLIGHTS_TTL).await;
}

pub async fn invalidate(cache: &Cache) {
    cache.delete(HIGHLIGHTS_KEY).await;
}
