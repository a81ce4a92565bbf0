//! Lifecycle hooks invoked around every agent turn.
//!
//! Hooks are an enhancement: they log their own failures and always return
//! normally, so a broken memory service never fails a turn.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use super::transcript::{Role, TranscriptMessage};
use crate::subsystems::memory::{types::render_namespace, MemoryStore, Turn};

pub type HookFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Hook points of the agent-turn driver. Every method defaults to a no-op.
pub trait AgentHook: Send + Sync {
    /// Once, when the agent is constructed.
    fn on_agent_initialized<'a>(&'a self, _system_prompt: &'a mut String) -> HookFuture<'a> {
        Box::pin(async {})
    }

    /// After a message is appended, before the model sees the transcript.
    fn on_message_added<'a>(&'a self, _transcript: &'a mut [TranscriptMessage]) -> HookFuture<'a> {
        Box::pin(async {})
    }

    /// After the assistant reply has been appended.
    fn after_invocation<'a>(&'a self, _transcript: &'a [TranscriptMessage]) -> HookFuture<'a> {
        Box::pin(async {})
    }
}

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Memory-backed implementation of all three hook points.
pub struct MemoryHooks {
    memory: MemoryStore,
    actor_id: String,
    session_id: String,
    top_k: usize,
    history_turns: usize,
    context_label: String,
    /// (decorated, original) text of the last user message rewritten by the pre-turn hook.
    last_rewrite: Mutex<Option<(String, String)>>,
}

impl MemoryHooks {
    pub fn new(memory: MemoryStore, actor_id: &str, session_id: &str) -> Self {
        Self {
            memory,
            actor_id: actor_id.to_string(),
            session_id: session_id.to_string(),
            top_k: DEFAULT_TOP_K,
            history_turns: DEFAULT_HISTORY_TURNS,
            context_label: "Memory Context".to_string(),
            last_rewrite: Mutex::new(None),
        }
    }

    pub fn with_limits(mut self, top_k: usize, history_turns: usize) -> Self {
        self.top_k = top_k.max(1);
        self.history_turns = history_turns;
        self
    }

    /// Heading placed above injected context, e.g. `"Monitoring Context"`.
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = label.to_string();
        self
    }

    /// Retrieve across every namespace; `None` on any retrieval error.
    async fn gather_context(&self, query: &str) -> Option<String> {
        let mut lines = Vec::new();
        for (strategy_type, template) in self.memory.namespaces() {
            let namespace = render_namespace(template, &self.actor_id, None);
            match self.memory.retrieve(&namespace, query, self.top_k).await {
                Ok(records) => {
                    for r in records {
                        lines.push(format!("[{}] {}", strategy_type.to_uppercase(), r.text));
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "memory retrieval failed, continuing without context");
                    return None;
                }
            }
        }
        Some(lines.join("\n"))
    }

    /// The undecorated text behind `text`, if the pre-turn hook rewrote it.
    fn original_of(&self, text: &str) -> String {
        self.last_rewrite
            .lock()
            .ok()
            .and_then(|r| {
                r.as_ref()
                    .filter(|(decorated, _)| decorated == text)
                    .map(|(_, original)| original.clone())
            })
            .unwrap_or_else(|| text.to_string())
    }
}

/// Most recent (user, assistant) text pair, scanning backward.
///
/// Tool-result user messages are skipped; the scan stops at the first real
/// user message. Either half may be missing.
pub fn last_exchange(transcript: &[TranscriptMessage]) -> (Option<&str>, Option<&str>) {
    let mut response = None;
    let mut query = None;
    for msg in transcript.iter().rev() {
        match msg.role {
            Role::Assistant => {
                if response.is_none() {
                    response = msg.first_text();
                }
            }
            Role::User => {
                if msg.is_tool_result() {
                    continue;
                }
                query = msg.first_text();
                break;
            }
        }
    }
    (query, response)
}

impl AgentHook for MemoryHooks {
    fn on_agent_initialized<'a>(&'a self, system_prompt: &'a mut String) -> HookFuture<'a> {
        Box::pin(async move {
            let groups = match self
                .memory
                .recent_turns(&self.actor_id, &self.session_id, self.history_turns)
                .await
            {
                Ok(g) => g,
                Err(e) => {
                    warn!(session_id = %self.session_id, error = %e, "failed to load conversation history");
                    return;
                }
            };
            let lines: Vec<String> = groups
                .iter()
                .flatten()
                .map(|t| format!("{}: {}", t.role.label(), t.text))
                .collect();
            if lines.is_empty() {
                return;
            }
            system_prompt.push_str("\n\nRecent conversation:\n");
            system_prompt.push_str(&lines.join("\n"));
            info!(session_id = %self.session_id, turns = lines.len(), "loaded conversation history");
        })
    }

    fn on_message_added<'a>(&'a self, transcript: &'a mut [TranscriptMessage]) -> HookFuture<'a> {
        Box::pin(async move {
            let Some(last) = transcript.last_mut() else { return };
            if last.role != Role::User || last.is_tool_result() {
                return;
            }
            let Some(query) = last.first_text().map(str::to_string) else { return };

            let Some(context) = self.gather_context(&query).await else { return };
            if context.is_empty() {
                debug!("no memory context for this turn");
                return;
            }

            let decorated = format!("{}:\n{context}\n\n{query}", self.context_label);
            if let Ok(mut slot) = self.last_rewrite.lock() {
                *slot = Some((decorated.clone(), query));
            }
            last.set_first_text(decorated);
            debug!(actor_id = %self.actor_id, "memory context injected");
        })
    }

    fn after_invocation<'a>(&'a self, transcript: &'a [TranscriptMessage]) -> HookFuture<'a> {
        Box::pin(async move {
            if transcript.last().map(|m| m.role) != Some(Role::Assistant) {
                return;
            }
            let (Some(query), Some(response)) = last_exchange(transcript) else {
                debug!("no complete user/assistant pair, skipping persistence");
                return;
            };
            let turns = [Turn::user(self.original_of(query)), Turn::assistant(response)];
            match self.memory.append_turn(&self.actor_id, &self.session_id, &turns).await {
                Ok(()) => debug!(session_id = %self.session_id, "turn persisted"),
                Err(e) => warn!(session_id = %self.session_id, error = %e, "failed to persist turn"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::agents::transcript::ContentBlock;
    use crate::subsystems::memory::stores::local::LocalMemoryService;
    use crate::subsystems::memory::{MemoryService, Strategy};
    use std::sync::Arc;

    async fn hooks() -> (Arc<LocalMemoryService>, MemoryHooks) {
        let svc = Arc::new(LocalMemoryService::new(
            "mem-1",
            vec![
                Strategy { strategy_type: "SemanticMemory".into(), namespace: "/sem/{actorId}".into() },
                Strategy { strategy_type: "UserPreference".into(), namespace: "/pref/{actorId}".into() },
            ],
        ));
        let store = MemoryStore::connect(svc.clone(), "mem-1").await.unwrap();
        let hooks = MemoryHooks::new(store, "u1", "s1").with_context_label("Monitoring Context");
        (svc, hooks)
    }

    #[tokio::test]
    async fn pre_turn_prepends_labeled_context() {
        let (svc, hooks) = hooks().await;
        svc.seed("/sem/u1", "SemanticMemory", "cpu alarm on web-2 last week");
        svc.seed("/pref/u1", "UserPreference", "prefers cpu graphs");
        let mut transcript = vec![TranscriptMessage::user("any cpu issues?")];
        hooks.on_message_added(&mut transcript).await;
        let text = transcript[0].first_text().unwrap();
        assert!(text.starts_with("Monitoring Context:\n"));
        assert!(text.contains("[SEMANTICMEMORY] cpu alarm on web-2 last week"));
        assert!(text.contains("[USERPREFERENCE] prefers cpu graphs"));
        assert!(text.ends_with("\n\nany cpu issues?"));
    }

    #[tokio::test]
    async fn pre_turn_ignores_tool_results_and_assistant_messages() {
        let (svc, hooks) = hooks().await;
        svc.seed("/sem/u1", "SemanticMemory", "cpu");
        let tool = TranscriptMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult { tool_use_id: "t".into(), content: "cpu".into() }],
        };
        let mut transcript = vec![tool.clone()];
        hooks.on_message_added(&mut transcript).await;
        assert_eq!(transcript[0], tool);

        let mut transcript = vec![TranscriptMessage::assistant("cpu")];
        hooks.on_message_added(&mut transcript).await;
        assert_eq!(transcript[0].first_text(), Some("cpu"));
    }

    #[tokio::test]
    async fn post_turn_persists_undecorated_pair() {
        let (svc, hooks) = hooks().await;
        svc.seed("/sem/u1", "SemanticMemory", "disk full on db-1");
        let mut transcript = vec![TranscriptMessage::user("disk status?")];
        hooks.on_message_added(&mut transcript).await;
        transcript.push(TranscriptMessage::assistant("db-1 disk is full"));
        hooks.after_invocation(&transcript).await;

        let groups = svc.last_turns("mem-1", "u1", "s1", 5).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0][0], Turn::user("disk status?"));
        assert_eq!(groups[0][1], Turn::assistant("db-1 disk is full"));
    }

    #[tokio::test]
    async fn on_init_appends_history() {
        let (svc, hooks) = hooks().await;
        svc.create_event("mem-1", "u1", "s1", &[Turn::user("q1"), Turn::assistant("a1")])
            .await
            .unwrap();
        let mut prompt = "You are a monitor.".to_string();
        hooks.on_agent_initialized(&mut prompt).await;
        assert_eq!(prompt, "You are a monitor.\n\nRecent conversation:\nuser: q1\nassistant: a1");
    }

    #[tokio::test]
    async fn on_init_with_empty_history_is_noop() {
        let (_svc, hooks) = hooks().await;
        let mut prompt = "base".to_string();
        hooks.on_agent_initialized(&mut prompt).await;
        assert_eq!(prompt, "base");
    }

    #[test]
    fn last_exchange_skips_tool_results() {
        let transcript = vec![
            TranscriptMessage::user("check alarms"),
            TranscriptMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "list_alarms".into(),
                    input: serde_json::Value::Null,
                }],
            },
            TranscriptMessage {
                role: Role::User,
                content: vec![ContentBlock::ToolResult { tool_use_id: "t1".into(), content: "[]".into() }],
            },
            TranscriptMessage::assistant("no alarms"),
        ];
        assert_eq!(last_exchange(&transcript), (Some("check alarms"), Some("no alarms")));
    }
}
