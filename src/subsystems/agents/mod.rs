//! Conversational agents — the opaque thing a task drives.
//!
//! An agent turns one prompt into a stream of text fragments pushed into an
//! `mpsc::Sender`. The consumer stops a turn early by dropping the receiver.
//!
//! ```text
//! ChatAgent  ── LlmProvider + hooks + transcript (monitor, websearch)
//! HostAgent  ── routes each prompt to one PeerAgent (host)
//! ```

pub mod chat;
pub mod hooks;
pub mod host;
pub mod transcript;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::AppError;

pub use chat::ChatAgent;
pub use hooks::{AgentHook, HookFuture, MemoryHooks};
pub use host::HostAgent;

pub type AgentFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Final text of one non-streamed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
}

pub trait ConversationalAgent: Send + Sync {
    /// Stream one turn's reply into `tx`.
    ///
    /// Returns `Ok(())` when the receiver goes away early; that is a
    /// cancellation, not a failure.
    fn stream<'a>(&'a self, prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()>;

    /// Run one turn and collect the whole reply.
    fn invoke<'a>(&'a self, prompt: &'a str) -> AgentFuture<'a, AgentReply> {
        Box::pin(async move {
            let (tx, mut rx) = mpsc::channel::<String>(64);
            let collect = async move {
                let mut text = String::new();
                while let Some(piece) = rx.recv().await {
                    text.push_str(&piece);
                }
                text
            };
            let (res, text) = tokio::join!(self.stream(prompt, tx), collect);
            res?;
            Ok(AgentReply { text })
        })
    }
}

/// Builds the agent for `(session_id, actor_id)` on first use.
pub type AgentFactory =
    Arc<dyn Fn(String, String) -> AgentFuture<'static, Arc<dyn ConversationalAgent>> + Send + Sync>;

/// Factory that hands out an agent built elsewhere.
pub fn prebuilt(agent: Arc<dyn ConversationalAgent>) -> AgentFactory {
    Arc::new(move |_: String, _: String| -> AgentFuture<'static, Arc<dyn ConversationalAgent>> {
        let agent = agent.clone();
        Box::pin(async move { Ok(agent) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl ConversationalAgent for Fixed {
        fn stream<'a>(&'a self, _prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
            Box::pin(async move {
                for p in ["Hel", "lo"] {
                    if tx.send(p.to_string()).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn invoke_collects_stream() {
        assert_eq!(Fixed.invoke("x").await.unwrap().text, "Hello");
    }

    #[tokio::test]
    async fn prebuilt_returns_same_instance() {
        let agent: Arc<dyn ConversationalAgent> = Arc::new(Fixed);
        let factory = prebuilt(agent.clone());
        let got = factory("s".into(), "a".into()).await.unwrap();
        assert!(Arc::ptr_eq(&agent, &got));
    }
}
