//! Conversation transcript as seen by hooks.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl TranscriptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::Text(text.into())] }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::Text(text.into())] }
    }

    /// A user message whose first block is a tool result (not typed by a person).
    pub fn is_tool_result(&self) -> bool {
        matches!(self.content.first(), Some(ContentBlock::ToolResult { .. }))
    }

    /// First text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// First text block followed by any tool results attached after it.
    pub fn model_text(&self) -> Option<String> {
        let mut text = self.first_text()?.to_string();
        for block in &self.content {
            if let ContentBlock::ToolResult { tool_use_id, content } = block {
                text.push_str(&format!("\n\n[{tool_use_id} result]\n{content}"));
            }
        }
        Some(text)
    }

    /// Replace the first text block. No-op when there is none.
    pub fn set_first_text(&mut self, text: String) {
        if let Some(ContentBlock::Text(t)) = self
            .content
            .iter_mut()
            .find(|b| matches!(b, ContentBlock::Text(_)))
        {
            *t = text;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_detection_uses_first_block() {
        let msg = TranscriptMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult { tool_use_id: "t1".into(), content: "42".into() }],
        };
        assert!(msg.is_tool_result());
        assert!(msg.first_text().is_none());
        assert!(!TranscriptMessage::user("hi").is_tool_result());
    }

    #[test]
    fn model_text_appends_tool_results() {
        let mut msg = TranscriptMessage::user("rds timeout?");
        msg.content.push(ContentBlock::ToolResult { tool_use_id: "web_search".into(), content: "{}".into() });
        assert_eq!(msg.model_text().as_deref(), Some("rds timeout?\n\n[web_search result]\n{}"));
        assert_eq!(msg.first_text(), Some("rds timeout?"));
    }

    #[test]
    fn set_first_text_skips_tool_blocks() {
        let mut msg = TranscriptMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::ToolUse { id: "t1".into(), name: "list_alarms".into(), input: Value::Null },
                ContentBlock::Text("old".into()),
            ],
        };
        msg.set_first_text("new".into());
        assert_eq!(msg.first_text(), Some("new"));
    }
}
