//! Dummy LLM provider — echoes the last user message back prefixed with `[echo]`.
//! Used for running the full request pipeline without a real API key.

use tokio::sync::mpsc;

use crate::llm::{ChatMessage, ProviderError};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(format!("[echo] {last}"))
    }

    /// Streams the echo one word at a time, keeping the separating spaces.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        tx: mpsc::Sender<String>,
    ) -> Result<(), ProviderError> {
        let reply = self.complete(messages).await?;
        for piece in reply.split_inclusive(' ') {
            tx.send(piece.to_string()).await.map_err(|_| ProviderError::Closed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_prefixes_echo() {
        let p = DummyProvider;
        let reply = p.complete(&[ChatMessage::user("hello")]).await.unwrap();
        assert_eq!(reply, "[echo] hello");
    }

    #[tokio::test]
    async fn complete_without_user_message() {
        let p = DummyProvider;
        assert_eq!(p.complete(&[]).await.unwrap(), "[echo] ");
    }

    #[tokio::test]
    async fn stream_reassembles_to_complete_reply() {
        let p = DummyProvider;
        let (tx, mut rx) = mpsc::channel(16);
        p.stream(&[ChatMessage::user("hello there")], tx).await.unwrap();
        let mut out = String::new();
        while let Some(piece) = rx.recv().await {
            out.push_str(&piece);
        }
        assert_eq!(out, "[echo] hello there");
    }

    #[tokio::test]
    async fn stream_stops_when_receiver_dropped() {
        let p = DummyProvider;
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let err = p.stream(&[ChatMessage::user("a b c")], tx).await.unwrap_err();
        assert!(matches!(err, ProviderError::Closed));
    }
}
