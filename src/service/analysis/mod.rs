pub mod orchestrator;
pub mod search;

pub use orchestrator::{AnalysisEvent, AnalysisService, Phase};
pub use search::SearchConfig;
