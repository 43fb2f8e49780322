use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::http::{HttpRequest, HttpTransport};
use super::retry::{execute_with_retry, RetryPolicy};
use super::{ExtractionError, ExtractionRequest, StructuredExtractor};
use crate::models::AnalysisRecord;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const TOOL_NAME: &str = "earnings_analysis_result";
const MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are a financial analyst extracting earnings metrics from web search results. \
Return your answer only through the earnings_analysis_result tool. \
Set has_reported to false when the results show the company has not reported yet for the quarter, \
and in that case leave every actual, surprise and price reaction field null. \
Revenue is in raw dollars, EPS in dollars per share, surprise as ((actual - estimate) / |estimate|) * 100.";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

/// Structured extraction through a forced tool call on the Anthropic messages API.
pub struct AnthropicExtractor {
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
    url: String,
}

impl AnthropicExtractor {
    pub fn new(transport: Arc<dyn HttpTransport>, api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            transport,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry: RetryPolicy {
                max_retries: 2,
                ..RetryPolicy::default()
            },
            url: MESSAGES_URL.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn request_body(&self, request: &ExtractionRequest) -> Value {
        let mut user = format!(
            "Analyze the {} earnings for {} using the material below.\n\n",
            request.quarter, request.ticker
        );
        let context = json!({
            "company_name": request.company_name,
            "report_date": request.report_date,
            "eps_estimate": request.eps_estimate,
            "revenue_estimate": request.revenue_estimate,
            "fiscal_quarter": request.fiscal_quarter,
        });
        if request.company_name.is_some() || request.report_date.is_some() {
            user.push_str(&format!("Known calendar data: {context}\n\n"));
        }
        user.push_str(&request.digest);

        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PROMPT,
            "tools": [tool_definition()],
            "tool_choice": { "type": "tool", "name": TOOL_NAME },
            "messages": [{ "role": "user", "content": user }],
        })
    }
}

fn tool_definition() -> Value {
    let number = |description: &str| json!({ "type": ["number", "null"], "description": description });
    json!({
        "name": TOOL_NAME,
        "description": "Return a structured earnings analysis with all extracted financial metrics.",
        "input_schema": {
            "type": "object",
            "properties": {
                "has_reported": { "type": "boolean", "description": "Whether results for the quarter are out" },
                "eps_estimate": number("Consensus EPS estimate before the report"),
                "eps_actual": number("Actual reported EPS"),
                "eps_surprise_pct": number("EPS surprise percentage"),
                "revenue_estimate": number("Consensus revenue estimate in dollars"),
                "revenue_actual": number("Actual reported revenue in dollars"),
                "revenue_surprise_pct": number("Revenue surprise percentage"),
                "guidance_summary": { "type": ["string", "null"], "description": "1-3 sentence summary of forward guidance" },
                "sentiment": { "type": ["string", "null"], "enum": ["bullish", "bearish", "neutral", null] },
                "sentiment_score": number("Confidence from 0.0 to 1.0"),
                "price_reaction_pct": number("Price change after the report, in percent"),
            },
            "required": ["has_reported", "sentiment", "guidance_summary"],
        },
    })
}

/// Pull the forced tool call's input out of a messages response.
fn tool_input(body: &str) -> Result<Value, ExtractionError> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "tool_use" && block.name.as_deref() == Some(TOOL_NAME))
        .and_then(|block| block.input)
        .ok_or(ExtractionError::Refused)
}

#[async_trait]
impl StructuredExtractor for AnthropicExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<AnalysisRecord, ExtractionError> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(ExtractionError::NotConfigured);
        };

        let http = HttpRequest::post_json(&self.url, &self.request_body(request))
            .with_header("x-api-key", api_key)
            .with_header("anthropic-version", API_VERSION)
            .with_timeout(REQUEST_TIMEOUT);

        info!(
            "Requesting structured analysis for {} {} ({} chars of context)",
            request.ticker,
            request.quarter,
            request.digest.len()
        );
        let resp = execute_with_retry(self.transport.as_ref(), http, &self.retry, "Anthropic messages").await?;
        let Some(body) = resp.into_body()? else {
            return Err(ExtractionError::Refused);
        };

        let input = tool_input(&body).inspect_err(|err| {
            warn!("No usable tool output for {} {}: {}", request.ticker, request.quarter, err);
        })?;
        serde_json::from_value(input).map_err(|e| ExtractionError::Malformed(e.to_string()))
    }
}
