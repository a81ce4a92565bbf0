//! Local tools run by the agent itself, as opposed to gateway tools.
//!
//! The chat driver has no model-side tool calls, so a tool runs as a
//! pre-turn hook: its result is attached to the user message as a
//! tool-result block the model reads alongside the question.

pub mod web_search;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::subsystems::agents::transcript::{ContentBlock, Role, TranscriptMessage};
use crate::subsystems::agents::{AgentHook, HookFuture};
pub use web_search::{SearchResponse, SearchResult, TavilyClient, WebSearch};

/// Searches the web with each new user message.
pub struct WebSearchHook {
    search: Arc<dyn WebSearch>,
    top_k: usize,
    recency_days: Option<u32>,
}

impl WebSearchHook {
    pub fn new(search: Arc<dyn WebSearch>, top_k: usize) -> Self {
        Self { search, top_k: web_search::clamp_top_k(top_k), recency_days: None }
    }

    pub fn with_recency_days(mut self, days: Option<u32>) -> Self {
        self.recency_days = days;
        self
    }
}

impl AgentHook for WebSearchHook {
    fn on_message_added<'a>(&'a self, transcript: &'a mut [TranscriptMessage]) -> HookFuture<'a> {
        Box::pin(async move {
            let Some(last) = transcript.last_mut() else { return };
            if last.role != Role::User || last.is_tool_result() {
                return;
            }
            let Some(query) = last.first_text().map(str::to_string) else { return };

            let response = match self.search.search(&query, self.top_k, self.recency_days).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(class = e.class(), error = %e, "web search failed, continuing without results");
                    return;
                }
            };
            if response.results.is_empty() {
                debug!("web search returned nothing");
                return;
            }
            let content = match serde_json::to_string(&response) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "cannot encode search results");
                    return;
                }
            };
            last.content.push(ContentBlock::ToolResult {
                tool_use_id: web_search::TOOL_NAME.to_string(),
                content,
            });
            debug!(results = response.results.len(), "web results attached");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::web_search::SearchFuture;
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    struct Canned {
        results: Vec<SearchResult>,
        seen: Mutex<Vec<(String, usize, Option<u32>)>>,
    }

    impl WebSearch for Canned {
        fn search<'a>(&'a self, query: &'a str, top_k: usize, recency_days: Option<u32>) -> SearchFuture<'a> {
            Box::pin(async move {
                self.seen.lock().unwrap().push((query.to_string(), top_k, recency_days));
                Ok(SearchResponse { results: self.results.clone(), provider: "tavily", query: query.to_string() })
            })
        }
    }

    struct Down;

    impl WebSearch for Down {
        fn search<'a>(&'a self, _query: &'a str, _top_k: usize, _recency_days: Option<u32>) -> SearchFuture<'a> {
            Box::pin(async { Err(AppError::Http("search provider returned 502".into())) })
        }
    }

    fn hit() -> SearchResult {
        SearchResult {
            title: Some("RDS timeouts".into()),
            url: Some("https://docs.example/rds".into()),
            snippet: Some("Raise max_connections.".into()),
            score: Some(0.8),
        }
    }

    #[tokio::test]
    async fn results_attached_after_question() {
        let search = Arc::new(Canned { results: vec![hit()], seen: Mutex::new(vec![]) });
        let hook = WebSearchHook::new(search.clone(), 50).with_recency_days(Some(7));
        let mut transcript = vec![TranscriptMessage::user("rds connection timeout")];
        hook.on_message_added(&mut transcript).await;

        assert_eq!(search.seen.lock().unwrap()[0], ("rds connection timeout".to_string(), 10, Some(7)));
        let msg = &transcript[0];
        assert_eq!(msg.first_text(), Some("rds connection timeout"));
        assert!(!msg.is_tool_result());
        let Some(ContentBlock::ToolResult { tool_use_id, content }) = msg.content.get(1) else {
            panic!("expected a tool result block, got {:?}", msg.content)
        };
        assert_eq!(tool_use_id, "web_search");
        assert!(content.contains("https://docs.example/rds"));
    }

    #[tokio::test]
    async fn failure_and_empty_leave_message_alone() {
        let mut transcript = vec![TranscriptMessage::user("anything")];
        WebSearchHook::new(Arc::new(Down), 5).on_message_added(&mut transcript).await;
        assert_eq!(transcript, vec![TranscriptMessage::user("anything")]);

        let empty = Arc::new(Canned { results: vec![], seen: Mutex::new(vec![]) });
        WebSearchHook::new(empty, 5).on_message_added(&mut transcript).await;
        assert_eq!(transcript, vec![TranscriptMessage::user("anything")]);
    }

    #[tokio::test]
    async fn assistant_turns_not_searched() {
        let search = Arc::new(Canned { results: vec![hit()], seen: Mutex::new(vec![]) });
        let mut transcript = vec![TranscriptMessage::assistant("done")];
        WebSearchHook::new(search.clone(), 5).on_message_added(&mut transcript).await;
        assert!(search.seen.lock().unwrap().is_empty());
    }
}
