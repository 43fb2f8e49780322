use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::{normalize_ticker, AnalysisReport, EarningsAnalysis, EarningsEvent};
use crate::service::analysis::search::{build_digest, gather, SearchConfig};
use crate::service::caching::collections::analysis as analysis_cache;
use crate::service::caching::Cache;
use crate::service::finance::{ExtractionRequest, StructuredExtractor, WebSearchProvider};
use crate::service::storage::EarningsStore;

const EVENT_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CacheCheck,
    Search,
    Analyze,
    Save,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::CacheCheck => "cache_check",
            Phase::Search => "search",
            Phase::Analyze => "analyze",
            Phase::Save => "save",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item on the analysis stream. A stream always ends with a single
/// `Result` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Status { phase: Phase, message: String },
    Result { report: AnalysisReport },
    Error { phase: Phase, message: String },
}

impl AnalysisEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisEvent::Status { .. })
    }
}

/// Sender half of a run; `false` from `send` means the caller went away.
struct Stream {
    tx: mpsc::Sender<AnalysisEvent>,
}

impl Stream {
    async fn send(&self, event: AnalysisEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn status(&self, phase: Phase, message: &str) -> bool {
        debug!("Analysis phase {}: {}", phase, message);
        self.send(AnalysisEvent::Status {
            phase,
            message: message.to_string(),
        })
        .await
    }

    async fn fail(&self, phase: Phase, message: String) {
        warn!("Analysis failed during {}: {}", phase, message);
        self.send(AnalysisEvent::Error { phase, message }).await;
    }
}

#[derive(Clone)]
pub struct AnalysisService {
    store: EarningsStore,
    cache: Cache,
    search: Arc<dyn WebSearchProvider>,
    extractor: Arc<dyn StructuredExtractor>,
    config: SearchConfig,
}

impl AnalysisService {
    pub fn new(
        store: EarningsStore,
        cache: Cache,
        search: Arc<dyn WebSearchProvider>,
        extractor: Arc<dyn StructuredExtractor>,
    ) -> Self {
        Self {
            store,
            cache,
            search,
            extractor,
            config: SearchConfig::default(),
        }
    }

    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Start an analysis run and return its event stream.
    ///
    /// The run happens on a spawned task; dropping the receiver stops it at the
    /// next phase boundary.
    pub fn run_analysis_streaming(&self, ticker: &str, quarter: &str) -> mpsc::Receiver<AnalysisEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let service = self.clone();
        let ticker = normalize_ticker(ticker);
        let quarter = quarter.trim().to_string();

        tokio::spawn(async move {
            service.run(Stream { tx }, ticker, quarter).await;
        });
        rx
    }

    /// Latest stored analysis for the ticker, across all of its events.
    pub async fn get_cached_analysis(&self, ticker: &str) -> Result<Option<EarningsAnalysis>> {
        Ok(self
            .store
            .latest_analysis_for_ticker(&normalize_ticker(ticker))
            .await?)
    }

    async fn run(&self, stream: Stream, ticker: String, quarter: String) {
        if !stream.status(Phase::CacheCheck, "Checking cache").await {
            return;
        }
        if let Some(report) = analysis_cache::load(&self.cache, &ticker, &quarter).await {
            info!("Serving cached analysis for {} {}", ticker, quarter);
            stream.send(AnalysisEvent::Result { report }).await;
            return;
        }

        if !stream.status(Phase::Search, "Searching for earnings coverage").await {
            return;
        }
        let event = match self.store.latest_event_for_ticker(&ticker).await {
            Ok(event) => event,
            Err(err) => {
                error!("Could not load the earnings event for {}: {}", ticker, err);
                stream.fail(Phase::Search, err.to_string()).await;
                return;
            }
        };
        let company_name = event.as_ref().map(|e| e.company_name.as_str());
        let hits = gather(self.search.as_ref(), &self.config, &ticker, &quarter, company_name).await;
        if hits.is_empty() {
            stream
                .fail(Phase::Search, format!("No search results found for {ticker} {quarter} earnings"))
                .await;
            return;
        }
        let digest = build_digest(&ticker, &quarter, &hits, &self.config);

        if !stream.status(Phase::Analyze, "Reading articles and extracting figures").await {
            return;
        }
        let request = extraction_request(&ticker, &quarter, digest, event.as_ref());
        let record = match self.extractor.extract(&request).await {
            Ok(record) => record,
            Err(err) => {
                stream.fail(Phase::Analyze, err.to_string()).await;
                return;
            }
        };
        info!(
            "Extracted analysis for {} {}, has_reported={}",
            ticker, quarter, record.has_reported
        );

        if !stream.status(Phase::Save, "Saving results").await {
            return;
        }
        let mut report = AnalysisReport {
            id: None,
            earnings_event_id: None,
            ticker,
            quarter,
            record,
        };

        if let Some(event) = &event {
            let raw = match serde_json::to_value(&report.record) {
                Ok(raw) => raw,
                Err(err) => {
                    stream.fail(Phase::Save, err.to_string()).await;
                    return;
                }
            };
            match self
                .store
                .insert_analysis(event.id, &report.record, &raw, Utc::now())
                .await
            {
                Ok(id) => {
                    report.id = Some(id);
                    report.earnings_event_id = Some(event.id);
                }
                Err(err) => {
                    error!("Could not save analysis for {}: {}", report.ticker, err);
                    stream.fail(Phase::Save, err.to_string()).await;
                    return;
                }
            }
        } else {
            debug!("No earnings event for {}, analysis is cached only", report.ticker);
        }

        analysis_cache::store(&self.cache, &report).await;
        stream.send(AnalysisEvent::Result { report }).await;
    }
}

fn extraction_request(
    ticker: &str,
    quarter: &str,
    digest: String,
    event: Option<&EarningsEvent>,
) -> ExtractionRequest {
    let mut request = ExtractionRequest {
        ticker: ticker.to_string(),
        quarter: quarter.to_string(),
        digest,
        ..Default::default()
    };
    if let Some(event) = event {
        request.company_name = Some(event.company_name.clone());
        request.report_date = Some(event.report_date);
        request.eps_estimate = event.eps_estimate;
        request.revenue_estimate = event.revenue_estimate;
        request.fiscal_quarter = event.fiscal_quarter.clone();
    }
    request
}
