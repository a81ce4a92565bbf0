//! Agent-to-agent protocol vocabulary shared by the server surface and the peer client.

pub mod jsonrpc;
pub mod types;

pub use types::{
    AgentCapabilities, AgentCard, AgentSkill, Artifact, Message, MessageRole, Part, Task,
    TaskArtifactUpdateEvent, TaskState, TaskStatus, TaskStatusUpdateEvent,
};

/// Capability-discovery path served by every agent.
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

/// Header carrying the conversation id on every runtime request.
pub const SESSION_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-session-id";
/// Header carrying the runtime-issued workload identity token.
pub const WORKLOAD_TOKEN_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-workload-accesstoken";
/// Optional header naming the calling principal.
pub const ACTOR_HEADER: &str = "x-amzn-bedrock-agentcore-runtime-user-id";
