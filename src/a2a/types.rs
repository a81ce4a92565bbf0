//! A2A protocol objects as they appear on the wire (camelCase JSON).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub parts: Vec<Part>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default = "kind_message")]
    pub kind: String,
}

fn kind_message() -> String {
    "message".to_string()
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            parts: vec![Part::Text { text: text.into() }],
            message_id: Uuid::new_v4().to_string(),
            task_id: None,
            context_id: None,
            kind: kind_message(),
        }
    }

    pub fn agent_text(text: impl Into<String>, task_id: &str, context_id: &str) -> Self {
        Self {
            role: MessageRole::Agent,
            parts: vec![Part::Text { text: text.into() }],
            message_id: Uuid::new_v4().to_string(),
            task_id: Some(task_id.to_string()),
            context_id: Some(context_id.to_string()),
            kind: kind_message(),
        }
    }

    /// Concatenated text of every text part.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::Data { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Canceled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState, message: Option<Message>) -> Self {
        Self { state, message, timestamp: Some(chrono::Utc::now().to_rfc3339()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parts: Vec<Part>,
}

impl Artifact {
    pub fn text(name: &str, text: impl Into<String>) -> Self {
        Self {
            artifact_id: Uuid::new_v4().to_string(),
            name: Some(name.to_string()),
            parts: vec![Part::Text { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default = "kind_task")]
    pub kind: String,
}

fn kind_task() -> String {
    "task".to_string()
}

impl Task {
    /// Fresh `submitted` task seeded with the triggering message.
    pub fn submitted(id: &str, context_id: &str, message: Message) -> Self {
        Self {
            id: id.to_string(),
            context_id: context_id.to_string(),
            status: TaskStatus::new(TaskState::Submitted, None),
            artifacts: Vec::new(),
            history: vec![message],
            kind: kind_task(),
        }
    }
}

// ── Streaming events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(default = "kind_status_update")]
    pub kind: String,
}

fn kind_status_update() -> String {
    "status-update".to_string()
}

impl TaskStatusUpdateEvent {
    pub fn new(task_id: &str, context_id: &str, status: TaskStatus, is_final: bool) -> Self {
        Self {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            status,
            is_final,
            kind: kind_status_update(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub last_chunk: bool,
    #[serde(default = "kind_artifact_update")]
    pub kind: String,
}

fn kind_artifact_update() -> String {
    "artifact-update".to_string()
}

impl TaskArtifactUpdateEvent {
    pub fn new(task_id: &str, context_id: &str, artifact: Artifact) -> Self {
        Self {
            task_id: task_id.to_string(),
            context_id: context_id.to_string(),
            artifact,
            append: false,
            last_chunk: true,
            kind: kind_artifact_update(),
        }
    }
}

// ── Agent card ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub version: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_transport")]
    pub preferred_transport: String,
    #[serde(default)]
    pub default_input_modes: Vec<String>,
    #[serde(default)]
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

fn default_protocol_version() -> String {
    "0.3.0".to_string()
}

fn default_transport() -> String {
    "JSONRPC".to_string()
}

impl AgentCard {
    /// Card for this runtime: text in, text out, streaming on.
    pub fn for_runtime(
        name: &str,
        description: &str,
        url: &str,
        version: &str,
        skills: Vec<AgentSkill>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            url: url.to_string(),
            version: version.to_string(),
            protocol_version: default_protocol_version(),
            preferred_transport: default_transport(),
            default_input_modes: vec!["text/plain".into()],
            default_output_modes: vec!["text/plain".into()],
            capabilities: AgentCapabilities { streaming: true, push_notifications: false },
            skills,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_wire_names() {
        assert_eq!(serde_json::to_value(TaskState::Canceled).unwrap(), "canceled");
        assert_eq!(serde_json::to_value(TaskState::Working).unwrap(), "working");
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
    }

    #[test]
    fn message_parses_from_client_json() {
        let raw = r#"{"role":"user","parts":[{"kind":"text","text":"hi "},{"kind":"text","text":"there"}],"messageId":"m1"}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.text(), "hi there");
        assert_eq!(msg.kind, "message");
        assert!(msg.context_id.is_none());
    }

    #[test]
    fn status_update_serializes_final_flag() {
        let ev = TaskStatusUpdateEvent::new("t", "c", TaskStatus::new(TaskState::Working, None), false);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["final"], false);
        assert_eq!(json["kind"], "status-update");
        assert_eq!(json["taskId"], "t");
    }

    #[test]
    fn runtime_card_advertises_streaming() {
        let card = AgentCard::for_runtime("Monitor", "d", "http://x/", "0.1.0", Vec::new());
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["capabilities"]["streaming"], true);
        assert_eq!(json["preferredTransport"], "JSONRPC");
        assert_eq!(json["defaultInputModes"][0], "text/plain");
    }
}
