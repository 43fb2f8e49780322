use serde::{Deserialize, Serialize};

/// One headline from a news provider, normalized across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Publisher name or host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// As the provider reports it: an RFC 3339 timestamp or a relative age like "2 hours ago".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub ticker: String,
    pub articles: Vec<NewsArticle>,
}
