//! `HostAgent` — orchestrator that hands each prompt to one peer agent.
//!
//! The peer is picked by a short routing completion: the LLM is shown the
//! peer names and descriptions and asked to answer with a name. An answer
//! that names no known peer falls back to the first configured one.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{AgentFuture, ConversationalAgent};
use crate::error::AppError;
use crate::llm::{ChatMessage, LlmProvider};
use crate::subsystems::peers::PeerAgent;

pub struct HostAgent {
    llm: LlmProvider,
    instructions: String,
    peers: Vec<Arc<dyn PeerAgent>>,
}

impl HostAgent {
    pub fn new(llm: LlmProvider, instructions: &str, peers: Vec<Arc<dyn PeerAgent>>) -> Result<Self, AppError> {
        if peers.is_empty() {
            return Err(AppError::Config("host agent needs at least one peer".into()));
        }
        Ok(Self { llm, instructions: instructions.to_string(), peers })
    }

    fn routing_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        prompt.push_str("\n\nAvailable sub-agents:");
        for p in &self.peers {
            prompt.push_str(&format!("\n- {}: {}", p.name(), p.description()));
        }
        prompt.push_str("\n\nAnswer with the name of the single sub-agent best suited to the request, and nothing else.");
        prompt
    }

    /// Index of the peer named in `answer`.
    fn pick(&self, answer: &str) -> usize {
        let answer = answer.trim().to_lowercase();
        if let Some(i) = self.peers.iter().position(|p| p.name().to_lowercase() == answer) {
            return i;
        }
        self.peers
            .iter()
            .position(|p| answer.contains(&p.name().to_lowercase()))
            .unwrap_or(0)
    }

    async fn route(&self, prompt: &str) -> &Arc<dyn PeerAgent> {
        let choice = match self
            .llm
            .complete(Some(&self.routing_prompt()), &[ChatMessage::user(prompt)])
            .await
        {
            Ok(answer) => self.pick(&answer),
            Err(e) => {
                warn!(error = %e, "routing completion failed, using first peer");
                0
            }
        };
        &self.peers[choice]
    }
}

impl ConversationalAgent for HostAgent {
    fn stream<'a>(&'a self, prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
        Box::pin(async move {
            let peer = self.route(prompt).await;
            info!(peer = peer.name(), "delegating to peer agent");
            let reply = peer.send(prompt).await?;
            if !reply.is_empty() {
                // A closed receiver means the caller cancelled.
                let _ = tx.send(reply).await;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use std::sync::Mutex;

    struct FakePeer {
        name: &'static str,
        seen: Mutex<Vec<String>>,
    }

    impl PeerAgent for FakePeer {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "fake" }
        fn send<'a>(&'a self, prompt: &'a str) -> AgentFuture<'a, String> {
            Box::pin(async move {
                self.seen.lock().unwrap().push(prompt.to_string());
                Ok(format!("{} says hi", self.name))
            })
        }
    }

    fn host(peers: Vec<Arc<dyn PeerAgent>>) -> HostAgent {
        HostAgent::new(LlmProvider::Dummy(DummyProvider), "route things", peers).unwrap()
    }

    #[test]
    fn pick_exact_then_contains_then_first() {
        let a: Arc<dyn PeerAgent> = Arc::new(FakePeer { name: "monitor_agent", seen: Mutex::new(vec![]) });
        let b: Arc<dyn PeerAgent> = Arc::new(FakePeer { name: "websearch_agent", seen: Mutex::new(vec![]) });
        let h = host(vec![a, b]);
        assert_eq!(h.pick("websearch_agent"), 1);
        assert_eq!(h.pick("I'd use WEBSEARCH_AGENT here"), 1);
        assert_eq!(h.pick("no idea"), 0);
    }

    #[tokio::test]
    async fn delegates_and_streams_reply() {
        let peer = Arc::new(FakePeer { name: "monitor_agent", seen: Mutex::new(vec![]) });
        let h = host(vec![peer.clone() as Arc<dyn PeerAgent>]);
        let reply = h.invoke("cpu?").await.unwrap();
        assert_eq!(reply.text, "monitor_agent says hi");
        assert_eq!(peer.seen.lock().unwrap().as_slice(), ["cpu?".to_string()]);
    }

    #[test]
    fn no_peers_is_config_error() {
        let err = HostAgent::new(LlmProvider::Dummy(DummyProvider), "x", Vec::new()).err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
