use std::collections::HashSet;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info};
use url::Url;

use crate::models::{ClassifiedHit, SearchHit, SourceKind};
use crate::service::finance::WebSearchProvider;

const PRIMARY_DOMAINS: &[&str] = &[
    "businesswire.com",
    "prnewswire.com",
    "globenewswire.com",
    "sec.gov",
];

const IR_HOST_PREFIXES: &[&str] = &["investor.", "investors.", "ir."];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Pause between consecutive search queries.
    pub query_delay: Duration,
    pub results_per_query: usize,
    /// Pages fetched concurrently for article text.
    pub max_pages: usize,
    pub primary_chars: usize,
    pub secondary_chars: usize,
    pub total_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query_delay: Duration::from_millis(1100),
            results_per_query: 8,
            max_pages: 6,
            primary_chars: 6000,
            secondary_chars: 3000,
            total_chars: 15000,
        }
    }
}

/// Press-release query first, then the price-reaction query.
pub fn build_queries(ticker: &str, quarter: &str, company_name: Option<&str>) -> [(String, SourceKind); 2] {
    let name_part = match company_name {
        Some(name) if !name.trim().is_empty() && !name.eq_ignore_ascii_case(ticker) => {
            format!("\"{}\" {}", name.trim(), ticker)
        }
        _ => ticker.to_string(),
    };
    [
        (
            format!("{name_part} {quarter} earnings press release results revenue EPS guidance"),
            SourceKind::Secondary,
        ),
        (
            format!("{ticker} stock price reaction {quarter} earnings"),
            SourceKind::PriceReaction,
        ),
    ]
}

/// Press-release wires, SEC filings and investor-relations hosts count as primary.
pub fn is_primary_source(url: &str) -> bool {
    let Some(host) = Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) else {
        return false;
    };
    let host = host.trim_start_matches("www.");
    PRIMARY_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
        || IR_HOST_PREFIXES.iter().any(|prefix| host.starts_with(prefix))
}

pub fn classify(hit: SearchHit, query_kind: SourceKind) -> ClassifiedHit {
    let kind = if is_primary_source(&hit.url) {
        SourceKind::Primary
    } else {
        query_kind
    };
    ClassifiedHit {
        hit,
        kind,
        content: None,
    }
}

/// Runs both queries one after another, dedupes by URL and fetches article text.
///
/// Primary hits are fetched first; pages that fail to load keep `content: None`.
pub async fn gather(
    provider: &dyn WebSearchProvider,
    config: &SearchConfig,
    ticker: &str,
    quarter: &str,
    company_name: Option<&str>,
) -> Vec<ClassifiedHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for (i, (query, kind)) in build_queries(ticker, quarter, company_name).into_iter().enumerate() {
        if i > 0 && !config.query_delay.is_zero() {
            tokio::time::sleep(config.query_delay).await;
        }
        let results = provider
            .search(&query, config.results_per_query)
            .await
            .or_warn("Web search")
            .unwrap_or_default();
        debug!("Query {:?} returned {} results", query, results.len());

        for hit in results {
            if hit.url.is_empty() || !seen.insert(hit.url.clone()) {
                continue;
            }
            hits.push(classify(hit, kind));
        }
    }

    // stable: search order is kept within each bucket
    hits.sort_by_key(|h| h.kind != SourceKind::Primary);

    let fetch_count = hits.len().min(config.max_pages);
    let pages = join_all(
        hits[..fetch_count]
            .iter()
            .map(|h| provider.fetch_page(&h.hit.url)),
    )
    .await;

    for (hit, page) in hits.iter_mut().zip(pages) {
        hit.content = page.data().filter(|text| !text.trim().is_empty());
    }

    info!(
        "Gathered {} search results for {} {}, {} pages readable",
        hits.len(),
        ticker,
        quarter,
        hits.iter().filter(|h| h.content.is_some()).count()
    );
    hits
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Plain-text context for the extractor: the hit list, then article bodies under
/// per-page and total character budgets.
pub fn build_digest(ticker: &str, quarter: &str, hits: &[ClassifiedHit], config: &SearchConfig) -> String {
    let mut lines = vec![format!("Search results for {ticker} {quarter} earnings:"), String::new()];

    for (i, h) in hits.iter().enumerate() {
        lines.push(format!("{}. [{}] {}", i + 1, kind_label(h.kind), h.hit.title));
        lines.push(format!("   URL: {}", h.hit.url));
        if let Some(description) = &h.hit.description {
            lines.push(format!("   {description}"));
        }
        lines.push(String::new());
    }

    let mut remaining = config.total_chars;
    for (i, h) in hits.iter().enumerate() {
        let Some(content) = &h.content else { continue };
        if remaining == 0 {
            break;
        }
        let per_page = match h.kind {
            SourceKind::Primary => config.primary_chars,
            _ => config.secondary_chars,
        };
        let trimmed = truncate_chars(content, per_page.min(remaining));
        remaining -= trimmed.chars().count();

        lines.push(format!("--- Article {} ({}) {} ---", i + 1, kind_label(h.kind), h.hit.url));
        lines.push(trimmed.to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn kind_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Primary => "primary",
        SourceKind::Secondary => "secondary",
        SourceKind::PriceReaction => "price reaction",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            title: format!("title for {url}"),
            url: url.into(),
            description: None,
        }
    }

    fn with_content(url: &str, kind: SourceKind, content: &str) -> ClassifiedHit {
        ClassifiedHit {
            hit: hit(url),
            kind,
            content: Some(content.into()),
        }
    }

    #[test]
    fn queries_quote_the_company_name() {
        let [(press, press_kind), (reaction, reaction_kind)] =
            build_queries("AAPL", "Q1-2026", Some("Apple Inc."));
        assert!(press.starts_with("\"Apple Inc.\" AAPL Q1-2026"));
        assert_eq!(press_kind, SourceKind::Secondary);
        assert!(reaction.contains("price reaction"));
        assert_eq!(reaction_kind, SourceKind::PriceReaction);

        let [(press, _), _] = build_queries("AAPL", "Q1-2026", Some("AAPL"));
        assert!(press.starts_with("AAPL Q1-2026"));
    }

    #[test]
    fn primary_sources_are_recognised() {
        assert!(is_primary_source("https://www.businesswire.com/news/home/1"));
        assert!(is_primary_source("https://www.sec.gov/Archives/edgar/data/1"));
        assert!(is_primary_source("https://investor.apple.com/news"));
        assert!(is_primary_source("https://ir.tesla.com/press-release"));
        assert!(!is_primary_source("https://www.cnbc.com/2026/01/30/apple-earnings.html"));
        assert!(!is_primary_source("https://notsec.gov.example.com/x"));
        assert!(!is_primary_source("not a url"));
    }

    #[test]
    fn classify_keeps_query_bucket_for_other_hosts() {
        let c = classify(hit("https://www.reuters.com/markets/aapl"), SourceKind::PriceReaction);
        assert_eq!(c.kind, SourceKind::PriceReaction);
        let c = classify(hit("https://www.prnewswire.com/x"), SourceKind::PriceReaction);
        assert_eq!(c.kind, SourceKind::Primary);
    }

    #[test]
    fn digest_applies_page_and_total_budgets() {
        let config = SearchConfig::default();
        let hits = vec![
            with_content("https://www.businesswire.com/a", SourceKind::Primary, &"p".repeat(10_000)),
            with_content("https://www.cnbc.com/b", SourceKind::Secondary, &"s".repeat(10_000)),
            with_content("https://www.reuters.com/c", SourceKind::PriceReaction, &"r".repeat(10_000)),
            with_content("https://www.wsj.com/d", SourceKind::Secondary, &"w".repeat(10_000)),
            with_content("https://www.ft.com/e", SourceKind::Secondary, &"f".repeat(10_000)),
        ];
        let digest = build_digest("AAPL", "Q1-2026", &hits, &config);

        let bodies: Vec<usize> = digest
            .lines()
            .filter(|l| l.len() > 1 && l.chars().all(|c| Some(c) == l.chars().next()))
            .map(str::len)
            .collect();
        assert_eq!(bodies, [6000, 3000, 3000, 3000]);
        assert!(!digest.contains("Article 5"));
    }

    #[test]
    fn digest_skips_unreadable_pages() {
        let config = SearchConfig::default();
        let hits = vec![
            ClassifiedHit {
                hit: hit("https://www.cnbc.com/a"),
                kind: SourceKind::Secondary,
                content: None,
            },
            with_content("https://www.reuters.com/b", SourceKind::PriceReaction, "Shares rose 3%."),
        ];
        let digest = build_digest("AAPL", "Q1-2026", &hits, &config);
        assert!(digest.contains("1. [secondary] title for https://www.cnbc.com/a"));
        assert!(!digest.contains("--- Article 1"));
        assert!(digest.contains("--- Article 2 (price reaction) https://www.reuters.com/b ---"));
        assert!(digest.contains("Shares rose 3%."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
