//! Peer agents reached over A2A through the agent runtime service.
//!
//! A peer lives at `{runtime_endpoint}/runtimes/{escaped ARN}/invocations`.
//! Every request carries `Authorization: Bearer <token>` for the peer's
//! credential provider and the caller's session header. A 401 is retried
//! once with a freshly forced token.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::a2a::jsonrpc::{JsonRpcRequest, JsonRpcResponse, MESSAGE_SEND};
use crate::a2a::{AgentCard, Message, Part, Task, AGENT_CARD_PATH, SESSION_HEADER};
use crate::config::{with_region, PeerConfig, PeersConfig};
use crate::encoding::percent_encode;
use crate::error::AppError;
use crate::identity::{OAuthFlow, TokenProvider};
use crate::params::ParameterStore;
use crate::sse::{self, SseLineBuffer};
use crate::subsystems::agents::AgentFuture;

/// Something the host agent can delegate a prompt to.
pub trait PeerAgent: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// One non-streamed exchange; returns the peer's reply text.
    fn send<'a>(&'a self, prompt: &'a str) -> AgentFuture<'a, String>;
}

/// Where a peer lives and which provider mints its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTarget {
    pub name: String,
    pub description: String,
    pub base_url: String,
    pub provider_name: String,
}

pub fn runtime_arn(region: &str, account_id: &str, runtime_id: &str) -> String {
    format!("arn:aws:bedrock-agentcore:{region}:{account_id}:runtime/{runtime_id}")
}

pub fn invocation_url(runtime_endpoint: &str, arn: &str) -> String {
    format!("{}/runtimes/{}/invocations", runtime_endpoint.trim_end_matches('/'), percent_encode(arn))
}

/// Resolve one configured peer through the parameter store.
pub fn resolve_target(
    peers: &PeersConfig,
    peer: &PeerConfig,
    params: &dyn ParameterStore,
) -> Result<PeerTarget, AppError> {
    let region = peers
        .region
        .as_deref()
        .ok_or_else(|| AppError::Config("peer lookup needs a region".into()))?;
    let account = peers
        .account_id
        .as_deref()
        .ok_or_else(|| AppError::Config("peer lookup needs an account id".into()))?;
    let runtime_id = params.get(&peer.runtime_id_param)?;
    let provider_name = params.get(&peer.provider_name_param)?;
    let endpoint = with_region(&peers.runtime_endpoint, Some(region));
    Ok(PeerTarget {
        name: peer.name.clone(),
        description: peer.description.clone(),
        base_url: invocation_url(&endpoint, &runtime_arn(region, account, &runtime_id)),
        provider_name,
    })
}

pub struct PeerClient {
    http: Client,
    target: PeerTarget,
    tokens: Arc<TokenProvider>,
    session_id: String,
    card: OnceCell<AgentCard>,
}

impl PeerClient {
    pub fn new(
        target: PeerTarget,
        tokens: Arc<TokenProvider>,
        session_id: &str,
        timeout_seconds: u64,
    ) -> Result<Self, AppError> {
        crate::identity::ensure_verified_transport(&target.base_url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, target, tokens, session_id: session_id.to_string(), card: OnceCell::new() })
    }

    pub fn target(&self) -> &PeerTarget {
        &self.target
    }

    /// Mint (or reuse) this peer's bearer token ahead of the first call.
    pub async fn warm_token(&self) -> Result<(), AppError> {
        self.token(false).await.map(|_| ())
    }

    async fn token(&self, force: bool) -> Result<String, AppError> {
        self.tokens
            .get_token(&self.target.provider_name, &[], OAuthFlow::M2m, force)
            .await
    }

    /// Send with auth + session headers; on 401 force a new token and retry once.
    async fn send_authorized<F>(&self, build: F) -> Result<Response, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.token(false).await?;
        let response = build()
            .bearer_auth(token)
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("peer '{}' unreachable: {e}", self.target.name)))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(&self.target.name, response);
        }

        warn!(peer = %self.target.name, "peer rejected token, retrying with a fresh one");
        let token = self.token(true).await?;
        let response = build()
            .bearer_auth(token)
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .map_err(|e| AppError::Http(format!("peer '{}' unreachable: {e}", self.target.name)))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::Auth(format!("peer '{}' rejected a fresh token", self.target.name)));
        }
        check_status(&self.target.name, response)
    }

    /// The peer's agent card, fetched once per client.
    pub async fn card(&self) -> Result<&AgentCard, AppError> {
        self.card
            .get_or_try_init(|| async {
                let url = format!("{}{}", self.target.base_url, AGENT_CARD_PATH);
                let response = self.send_authorized(|| self.http.get(&url)).await?;
                let card: AgentCard = response
                    .json()
                    .await
                    .map_err(|e| AppError::Http(format!("malformed agent card: {e}")))?;
                info!(peer = %self.target.name, card_name = %card.name, "agent card resolved");
                Ok::<_, AppError>(card)
            })
            .await
    }

    /// `message/send` and reduce the result to plain text.
    pub async fn send_message(&self, prompt: &str) -> Result<String, AppError> {
        let mut message = Message::user_text(prompt);
        message.context_id = Some(self.session_id.clone());
        let request = JsonRpcRequest::new(
            Uuid::new_v4().to_string(),
            MESSAGE_SEND,
            json!({ "message": message }),
        );
        let url = format!("{}/", self.target.base_url);
        debug!(peer = %self.target.name, "message/send");
        let response = self.send_authorized(|| self.http.post(&url).json(&request)).await?;
        let rpc: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| AppError::Http(format!("malformed JSON-RPC response: {e}")))?;
        if let Some(err) = rpc.error {
            return Err(AppError::Http(format!(
                "peer '{}' error {}: {}",
                self.target.name, err.code, err.message
            )));
        }
        Ok(result_text(rpc.result.unwrap_or(Value::Null)))
    }

    /// Streamed `/invocations` call; each unwrapped text fragment goes to `on_fragment`.
    pub async fn invoke_stream<F>(&self, prompt: &str, mut on_fragment: F) -> Result<(), AppError>
    where
        F: FnMut(&str),
    {
        let body = json!({ "prompt": prompt });
        let url = self.target.base_url.clone();
        let response = self
            .send_authorized(|| {
                self.http
                    .post(&url)
                    .header(reqwest::header::ACCEPT, "text/event-stream")
                    .json(&body)
            })
            .await?;

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::Http(format!("stream read failed: {e}")))?;
            for data in lines.push(&chunk) {
                if let Some(text) = sse::unwrap_text(&data) {
                    on_fragment(&text);
                }
            }
        }
        if let Some(text) = lines.finish().and_then(|d| sse::unwrap_text(&d)) {
            on_fragment(&text);
        }
        Ok(())
    }
}

fn check_status(peer: &str, response: Response) -> Result<Response, AppError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(AppError::Auth(format!("peer '{peer}' returned HTTP {status}"))),
        _ => Err(AppError::Http(format!("peer '{peer}' returned HTTP {status}"))),
    }
}

/// Text of a `message/send` result: a Task's artifacts (or its status
/// message when it has none) or a bare Message.
pub fn result_text(result: Value) -> String {
    if result.get("kind").and_then(Value::as_str) == Some("message") {
        return serde_json::from_value::<Message>(result)
            .map(|m| m.text())
            .unwrap_or_default();
    }
    match serde_json::from_value::<Task>(result) {
        Ok(task) => {
            let from_artifacts: String = task
                .artifacts
                .iter()
                .flat_map(|a| a.parts.iter())
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Data { .. } => None,
                })
                .collect();
            if !from_artifacts.is_empty() {
                return from_artifacts;
            }
            task.status.message.map(|m| m.text()).unwrap_or_default()
        }
        Err(_) => String::new(),
    }
}

impl PeerAgent for PeerClient {
    fn name(&self) -> &str {
        &self.target.name
    }

    fn description(&self) -> &str {
        &self.target.description
    }

    fn send<'a>(&'a self, prompt: &'a str) -> AgentFuture<'a, String> {
        Box::pin(self.send_message(prompt))
    }
}
