//! `http` backend — JSON memory API.
//!
//! ```text
//! GET  /memories/{id}/strategies                                  -> {"strategies": [{type, namespace}]}
//! POST /memories/{id}/retrieve   {namespace, query, topK}         -> {"records": [{type, text, score?}]}
//! POST /memories/{id}/events     {actorId, sessionId, messages}   -> 2xx
//! GET  /memories/{id}/actors/{actor}/sessions/{session}/turns?k=N -> {"turns": [[{role, text}]]}
//! ```
//!
//! A 404 on `strategies` means the memory resource does not exist.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoding::percent_encode;
use crate::error::AppError;
use crate::subsystems::memory::service::{MemoryError, MemoryFuture, MemoryService};
use crate::subsystems::memory::types::{MemoryRecord, Strategy, Turn, TurnGroup};

#[derive(Debug, Clone)]
pub struct HttpMemoryService {
    client: Client,
    base: String,
}

impl HttpMemoryService {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base: endpoint.trim_end_matches('/').to_string() })
    }

    fn memory_url(&self, memory_id: &str) -> String {
        format!("{}/memories/{}", self.base, percent_encode(memory_id))
    }
}

#[derive(Deserialize)]
struct StrategiesResponse {
    #[serde(default)]
    strategies: Vec<Strategy>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveBody<'a> {
    namespace: &'a str,
    query: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    records: Vec<MemoryRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventBody<'a> {
    actor_id: &'a str,
    session_id: &'a str,
    messages: &'a [Turn],
}

#[derive(Deserialize)]
struct TurnsResponse {
    #[serde(default)]
    turns: Vec<TurnGroup>,
}

fn transport(e: reqwest::Error) -> MemoryError {
    MemoryError::Service(e.to_string())
}

fn status_error(status: StatusCode) -> MemoryError {
    MemoryError::Service(format!("memory service returned HTTP {status}"))
}

impl MemoryService for HttpMemoryService {
    fn strategies<'a>(&'a self, memory_id: &'a str) -> MemoryFuture<'a, Vec<Strategy>> {
        Box::pin(async move {
            let url = format!("{}/strategies", self.memory_url(memory_id));
            let response = self.client.get(&url).send().await.map_err(transport)?;
            match response.status() {
                StatusCode::NOT_FOUND => Err(MemoryError::ResourceNotFound(memory_id.to_string())),
                s if !s.is_success() => Err(status_error(s)),
                _ => {
                    let parsed: StrategiesResponse = response.json().await.map_err(transport)?;
                    Ok(parsed.strategies)
                }
            }
        })
    }

    fn retrieve<'a>(
        &'a self,
        memory_id: &'a str,
        namespace: &'a str,
        query: &'a str,
        top_k: usize,
    ) -> MemoryFuture<'a, Vec<MemoryRecord>> {
        Box::pin(async move {
            let url = format!("{}/retrieve", self.memory_url(memory_id));
            let body = RetrieveBody { namespace, query, top_k };
            let response = self.client.post(&url).json(&body).send().await.map_err(transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status));
            }
            let parsed: RetrieveResponse = response.json().await.map_err(transport)?;
            debug!(namespace, hits = parsed.records.len(), "memory retrieve");
            Ok(parsed.records)
        })
    }

    fn create_event<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        turns: &'a [Turn],
    ) -> MemoryFuture<'a, ()> {
        Box::pin(async move {
            let url = format!("{}/events", self.memory_url(memory_id));
            let body = EventBody { actor_id, session_id, messages: turns };
            let response = self.client.post(&url).json(&body).send().await.map_err(transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status));
            }
            Ok(())
        })
    }

    fn last_turns<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        k: usize,
    ) -> MemoryFuture<'a, Vec<TurnGroup>> {
        Box::pin(async move {
            let url = format!(
                "{}/actors/{}/sessions/{}/turns",
                self.memory_url(memory_id),
                percent_encode(actor_id),
                percent_encode(session_id)
            );
            let response = self
                .client
                .get(&url)
                .query(&[("k", k)])
                .send()
                .await
                .map_err(transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status));
            }
            let parsed: TurnsResponse = response.json().await.map_err(transport)?;
            Ok(parsed.turns)
        })
    }
}
