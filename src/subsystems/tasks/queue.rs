//! Task events, the queue they travel through, and the per-task updater.
//!
//! Every event is applied to the [`TaskStore`] first; only events the store
//! accepts are forwarded to the listener (an SSE response, if any).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::store::TaskStore;
use crate::a2a::{
    Artifact, Message, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus, TaskStatusUpdateEvent,
};

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Task(Task),
    Status(TaskStatusUpdateEvent),
    Artifact(TaskArtifactUpdateEvent),
}

impl TaskEvent {
    pub fn to_value(&self) -> Value {
        let res = match self {
            TaskEvent::Task(t) => serde_json::to_value(t),
            TaskEvent::Status(s) => serde_json::to_value(s),
            TaskEvent::Artifact(a) => serde_json::to_value(a),
        };
        res.unwrap_or(Value::Null)
    }

    /// Terminal status updates end a stream.
    pub fn is_final(&self) -> bool {
        matches!(self, TaskEvent::Status(s) if s.is_final)
    }
}

#[derive(Clone)]
pub struct EventQueue {
    store: Arc<TaskStore>,
    tx: Option<mpsc::Sender<TaskEvent>>,
}

impl EventQueue {
    /// Queue with a listener.
    pub fn new(store: Arc<TaskStore>, capacity: usize) -> (Self, mpsc::Receiver<TaskEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { store, tx: Some(tx) }, rx)
    }

    /// Queue that only updates the store.
    pub fn detached(store: Arc<TaskStore>) -> Self {
        Self { store, tx: None }
    }

    /// Returns `false` if the store rejected the event.
    pub async fn enqueue(&self, event: TaskEvent) -> bool {
        if !self.store.apply(&event) {
            return false;
        }
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                debug!("event listener gone");
            }
        }
        true
    }
}

/// Emits status and artifact events for one task.
pub struct TaskUpdater {
    queue: EventQueue,
    pub task_id: String,
    pub context_id: String,
}

impl TaskUpdater {
    pub fn new(queue: EventQueue, task_id: &str, context_id: &str) -> Self {
        Self { queue, task_id: task_id.to_string(), context_id: context_id.to_string() }
    }

    pub async fn update_status(&self, state: TaskState, message: Option<Message>) -> bool {
        let status = TaskStatus::new(state, message);
        let event = TaskStatusUpdateEvent::new(&self.task_id, &self.context_id, status, state.is_terminal());
        self.queue.enqueue(TaskEvent::Status(event)).await
    }

    /// `working` with the text so far.
    pub async fn working(&self, text: &str) -> bool {
        let message = Message::agent_text(text, &self.task_id, &self.context_id);
        self.update_status(TaskState::Working, Some(message)).await
    }

    pub async fn add_artifact(&self, artifact: Artifact) -> bool {
        let event = TaskArtifactUpdateEvent::new(&self.task_id, &self.context_id, artifact);
        self.queue.enqueue(TaskEvent::Artifact(event)).await
    }

    pub async fn complete(&self) -> bool {
        self.update_status(TaskState::Completed, None).await
    }

    pub async fn failed(&self, reason: &str) -> bool {
        let message = Message::agent_text(reason, &self.task_id, &self.context_id);
        self.update_status(TaskState::Failed, Some(message)).await
    }

    pub async fn cancel(&self) -> bool {
        self.update_status(TaskState::Canceled, None).await
    }
}
