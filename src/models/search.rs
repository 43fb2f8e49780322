use serde::{Deserialize, Serialize};

/// Which bucket a search hit lands in when building the analysis context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Press release or investor-relations page.
    Primary,
    Secondary,
    PriceReaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A search hit after classification, with whatever article text could be fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedHit {
    pub hit: SearchHit,
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
