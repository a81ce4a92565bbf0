//! Value types exchanged with the memory service.

use serde::{Deserialize, Serialize};

/// One configured extraction strategy and the namespace template it writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// e.g. `"SemanticMemory"`, `"UserPreference"`.
    #[serde(rename = "type")]
    pub strategy_type: String,
    /// Template with an `{actorId}` (and optionally `{sessionId}`) placeholder.
    pub namespace: String,
}

/// One similarity-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Strategy type the record was extracted by.
    #[serde(rename = "type")]
    pub strategy_type: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn label(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One half of a turn-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into() }
    }
}

/// Turns appended by one persistence call.
pub type TurnGroup = Vec<Turn>;

/// Substitute `{actorId}` / `{sessionId}` in a namespace template.
pub fn render_namespace(template: &str, actor_id: &str, session_id: Option<&str>) -> String {
    let rendered = template.replace("{actorId}", actor_id);
    match session_id {
        Some(s) => rendered.replace("{sessionId}", s),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_actor_placeholder() {
        assert_eq!(render_namespace("ns/{actorId}", "u1", None), "ns/u1");
        assert_eq!(
            render_namespace("/s/{actorId}/{sessionId}", "u1", Some("abc")),
            "/s/u1/abc"
        );
    }

    #[test]
    fn turn_role_wire_format() {
        assert_eq!(serde_json::to_value(TurnRole::Assistant).unwrap(), "ASSISTANT");
    }
}
