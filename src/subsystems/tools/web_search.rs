//! Tavily-backed web search.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::WebSearchConfig;
use crate::error::AppError;
use crate::subsystems::gateway::ToolDescriptor;

pub const TOOL_NAME: &str = "web_search";
pub const MAX_RESULTS: usize = 10;
pub const PROVIDER: &str = "tavily";

pub type SearchFuture<'a> = Pin<Box<dyn Future<Output = Result<SearchResponse, AppError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: &'static str,
    pub query: String,
}

pub trait WebSearch: Send + Sync {
    /// `top_k` is clamped to `1..=MAX_RESULTS`.
    fn search<'a>(&'a self, query: &'a str, top_k: usize, recency_days: Option<u32>) -> SearchFuture<'a>;
}

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: TOOL_NAME.to_string(),
        description: format!(
            "Search the web. Arguments: query, top_k (1-{MAX_RESULTS}), recency_days (optional)"
        ),
    }
}

pub fn clamp_top_k(top_k: usize) -> usize {
    top_k.clamp(1, MAX_RESULTS)
}

/// Tavily `time_range` window for a recency filter in days.
pub fn time_range(recency_days: u32) -> Option<&'static str> {
    match recency_days {
        0 => None,
        1 => Some("day"),
        2..=7 => Some("week"),
        8..=30 => Some("month"),
        _ => Some("year"),
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Deserialize)]
struct RawResult {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    snippet: Option<String>,
    score: Option<f64>,
}

fn parse_response(query: &str, body: &str) -> Result<SearchResponse, AppError> {
    let raw: RawResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Http(format!("malformed search response: {e}")))?;
    let results = raw
        .results
        .into_iter()
        .map(|r| SearchResult {
            title: r.title,
            url: r.url,
            snippet: r.content.filter(|c| !c.is_empty()).or(r.snippet),
            score: r.score,
        })
        .collect();
    Ok(SearchResponse { results, provider: PROVIDER, query: query.to_string() })
}

fn request_body(query: &str, top_k: usize, recency_days: Option<u32>) -> Value {
    let mut body = json!({
        "query": query,
        "max_results": clamp_top_k(top_k),
    });
    if let Some(range) = recency_days.and_then(time_range) {
        body["time_range"] = Value::from(range);
    }
    body
}

pub struct TavilyClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl TavilyClient {
    pub fn new(cfg: &WebSearchConfig) -> Result<Self, AppError> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Config("missing TAVILY_API_KEY environment variable".into()))?;
        crate::identity::ensure_verified_transport(&cfg.endpoint)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, endpoint: cfg.endpoint.clone(), api_key })
    }
}

impl WebSearch for TavilyClient {
    fn search<'a>(&'a self, query: &'a str, top_k: usize, recency_days: Option<u32>) -> SearchFuture<'a> {
        Box::pin(async move {
            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body(query, top_k, recency_days))
                .send()
                .await
                .map_err(|e| AppError::Http(format!("search request failed: {e}")))?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| AppError::Http(format!("search response unreadable: {e}")))?;
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(AppError::Auth(format!("search provider rejected the api key ({status})")));
            }
            if !status.is_success() {
                return Err(AppError::Http(format!("search provider returned {status}")));
            }
            let parsed = parse_response(query, &body)?;
            debug!(results = parsed.results.len(), "web search done");
            Ok(parsed)
        })
    }
}
