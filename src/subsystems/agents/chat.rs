//! `ChatAgent` — LLM-backed agent with a per-session transcript and hooks.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use super::hooks::AgentHook;
use super::transcript::{Role, TranscriptMessage};
use super::{AgentFuture, ConversationalAgent};
use crate::error::AppError;
use crate::llm::{ChatMessage, LlmProvider, ProviderError};
use crate::subsystems::gateway::ToolDescriptor;

pub struct ChatAgent {
    llm: LlmProvider,
    system_prompt: String,
    hooks: Vec<Arc<dyn AgentHook>>,
    /// Held for a whole turn, so turns within a session never interleave.
    transcript: Mutex<Vec<TranscriptMessage>>,
}

impl ChatAgent {
    /// Build the agent and run every `on_agent_initialized` hook once.
    pub async fn create(
        llm: LlmProvider,
        base_prompt: &str,
        tools: &[ToolDescriptor],
        hooks: Vec<Arc<dyn AgentHook>>,
    ) -> Self {
        let mut system_prompt = base_prompt.to_string();
        if !tools.is_empty() {
            system_prompt.push_str("\n\nAvailable tools:");
            for t in tools {
                system_prompt.push_str(&format!("\n- {}: {}", t.name, t.description));
            }
        }
        for h in &hooks {
            h.on_agent_initialized(&mut system_prompt).await;
        }
        info!(tools = tools.len(), hooks = hooks.len(), "chat agent created");
        Self { llm, system_prompt, hooks, transcript: Mutex::new(Vec::new()) }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub async fn transcript(&self) -> Vec<TranscriptMessage> {
        self.transcript.lock().await.clone()
    }
}

fn to_chat(transcript: &[TranscriptMessage]) -> Vec<ChatMessage> {
    transcript
        .iter()
        .filter_map(|m| {
            let text = m.model_text()?;
            Some(match m.role {
                Role::User => ChatMessage::user(text),
                Role::Assistant => ChatMessage::assistant(text),
            })
        })
        .collect()
}

impl ConversationalAgent for ChatAgent {
    fn stream<'a>(&'a self, prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
        Box::pin(async move {
            let mut transcript = self.transcript.lock().await;
            transcript.push(TranscriptMessage::user(prompt));
            for h in &self.hooks {
                h.on_message_added(&mut transcript).await;
            }

            let messages = to_chat(&transcript);
            let (llm_tx, mut llm_rx) = mpsc::channel::<String>(32);
            // Owns llm_rx so an early return closes the provider's channel.
            let forward = async move {
                let mut full = String::new();
                while let Some(piece) = llm_rx.recv().await {
                    full.push_str(&piece);
                    if tx.send(piece).await.is_err() {
                        return (full, false);
                    }
                }
                (full, true)
            };
            let (llm_res, (full, delivered)) =
                tokio::join!(self.llm.stream(Some(&self.system_prompt), &messages, llm_tx), forward);

            if !delivered {
                debug!("reply receiver dropped, abandoning turn");
                transcript.pop();
                return Ok(());
            }
            match llm_res {
                Ok(()) | Err(ProviderError::Closed) => {}
                Err(e) => {
                    transcript.pop();
                    return Err(AppError::Internal(format!("llm stream failed: {e}")));
                }
            }

            transcript.push(TranscriptMessage::assistant(full));
            for h in &self.hooks {
                h.after_invocation(&transcript).await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;

    #[tokio::test]
    async fn tools_listed_in_system_prompt() {
        let tools = vec![ToolDescriptor { name: "list_alarms".into(), description: "List alarms".into() }];
        let agent = ChatAgent::create(LlmProvider::Dummy(DummyProvider), "base", &tools, Vec::new()).await;
        assert_eq!(agent.system_prompt(), "base\n\nAvailable tools:\n- list_alarms: List alarms");
    }

    #[tokio::test]
    async fn turn_appends_user_and_assistant() {
        let agent = ChatAgent::create(LlmProvider::Dummy(DummyProvider), "base", &[], Vec::new()).await;
        let reply = agent.invoke("hello").await.unwrap();
        assert_eq!(reply.text, "[echo] hello");
        let transcript = agent.transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].first_text(), Some("[echo] hello"));
    }

    #[tokio::test]
    async fn dropped_receiver_abandons_turn() {
        let agent = ChatAgent::create(LlmProvider::Dummy(DummyProvider), "base", &[], Vec::new()).await;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        agent.stream("one two three", tx).await.unwrap();
        assert!(agent.transcript().await.is_empty());
    }
}
