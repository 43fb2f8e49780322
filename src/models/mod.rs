pub mod analysis;
pub mod earnings;
pub mod market;
pub mod news;
pub mod search;

pub use analysis::{AnalysisRecord, AnalysisReport, EarningsAnalysis, Sentiment};
pub use earnings::{normalize_ticker, CalendarRecord, EarningsEvent, ReportTime, Source};
pub use market::{Highlights, Sparkline, WeekHighlights};
pub use news::{NewsArticle, NewsFeed};
pub use search::{ClassifiedHit, SearchHit, SourceKind};
