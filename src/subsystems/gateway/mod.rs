//! Gateway client — lists the tools exposed by the MCP gateway.
//!
//! The gateway speaks MCP JSON-RPC over HTTPS and may answer either with a
//! plain JSON body or with a one-event SSE stream; both are accepted.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::a2a::jsonrpc::JsonRpcResponse;
use crate::error::AppError;
use crate::identity::{OAuthFlow, TokenProvider};
use crate::params::ParameterStore;
use crate::sse::SseLineBuffer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

/// Gateway URL, read from the parameter store on first use and kept for the process.
pub struct GatewayUrl {
    param: String,
    url: OnceCell<String>,
}

impl GatewayUrl {
    pub fn new(param: &str) -> Self {
        Self { param: param.to_string(), url: OnceCell::new() }
    }

    pub async fn resolve(&self, params: &dyn ParameterStore) -> Result<String, AppError> {
        self.url
            .get_or_try_init(|| async {
                let url = params.get(&self.param)?;
                info!(param = %self.param, "gateway url resolved");
                Ok::<_, AppError>(url)
            })
            .await
            .cloned()
    }
}

pub struct GatewayClient {
    http: Client,
    url: String,
    provider_name: String,
    tokens: Arc<TokenProvider>,
}

impl GatewayClient {
    pub fn new(
        url: &str,
        provider_name: &str,
        tokens: Arc<TokenProvider>,
        timeout_seconds: u64,
    ) -> Result<Self, AppError> {
        crate::identity::ensure_verified_transport(url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, url: url.to_string(), provider_name: provider_name.to_string(), tokens })
    }

    /// `tools/list`.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AppError> {
        let token = self
            .tokens
            .get_token(&self.provider_name, &[], OAuthFlow::M2m, false)
            .await?;

        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("gateway unreachable: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Auth(format!("gateway rejected token: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(AppError::Http(format!("gateway returned HTTP {status}")));
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Http(format!("gateway body read failed: {e}")))?;

        let tools = parse_tools_response(&text, is_sse)?;
        debug!(count = tools.len(), "gateway tools listed");
        Ok(tools)
    }
}

fn parse_tools_response(body: &str, is_sse: bool) -> Result<Vec<ToolDescriptor>, AppError> {
    let payload = if is_sse {
        let mut lines = SseLineBuffer::new();
        let mut events = lines.push(body.as_bytes());
        events.extend(lines.finish());
        events
            .pop()
            .ok_or_else(|| AppError::Http("gateway stream carried no data".into()))?
    } else {
        body.to_string()
    };

    let rpc: JsonRpcResponse = serde_json::from_str(&payload)
        .map_err(|e| AppError::Http(format!("malformed gateway response: {e}")))?;
    if let Some(err) = rpc.error {
        return Err(AppError::Http(format!("gateway error {}: {}", err.code, err.message)));
    }
    let result: ToolsListResult = serde_json::from_value(rpc.result.unwrap_or(Value::Null))
        .map_err(|e| AppError::Http(format!("malformed tools/list result: {e}")))?;
    Ok(result.tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::JsonFileParams;

    #[test]
    fn parses_plain_json() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"get_metrics","description":"CloudWatch metrics"}]}}"#;
        let tools = parse_tools_response(body, false).unwrap();
        assert_eq!(tools[0].name, "get_metrics");
    }

    #[test]
    fn parses_sse_body() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"a\"}]}}\n\n";
        let tools = parse_tools_response(body, true).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "");
    }

    #[test]
    fn rpc_error_surfaces() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#;
        assert!(parse_tools_response(body, false).is_err());
    }

    #[tokio::test]
    async fn gateway_url_cached_after_first_read() {
        let params = JsonFileParams::in_memory();
        params.put("/gw/url", "https://gw.example/mcp", false).unwrap();
        let cache = GatewayUrl::new("/gw/url");
        assert_eq!(cache.resolve(&params).await.unwrap(), "https://gw.example/mcp");
        params.put("/gw/url", "https://other.example/mcp", false).unwrap();
        assert_eq!(cache.resolve(&params).await.unwrap(), "https://gw.example/mcp");
    }

    #[tokio::test]
    async fn missing_gateway_param_is_config_error() {
        let params = JsonFileParams::in_memory();
        let cache = GatewayUrl::new("/gw/url");
        assert!(matches!(cache.resolve(&params).await, Err(AppError::Config(_))));
    }
}
