//! In-memory task store. The one place the terminal-once rule is enforced.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use super::queue::TaskEvent;
use crate::a2a::Task;

#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().ok()?.get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold `event` into the stored task. Returns `false` when the event is
    /// rejected: unknown task, or any update to a task already terminal.
    pub fn apply(&self, event: &TaskEvent) -> bool {
        let Ok(mut tasks) = self.tasks.write() else { return false };
        match event {
            TaskEvent::Task(task) => {
                if tasks.contains_key(&task.id) {
                    debug!(task_id = %task.id, "task already stored");
                    return true;
                }
                tasks.insert(task.id.clone(), task.clone());
                true
            }
            TaskEvent::Status(update) => {
                let Some(task) = tasks.get_mut(&update.task_id) else {
                    warn!(task_id = %update.task_id, "status update for unknown task");
                    return false;
                };
                if task.status.state.is_terminal() {
                    debug!(
                        task_id = %update.task_id,
                        state = ?task.status.state,
                        ignored = ?update.status.state,
                        "task already terminal, update ignored"
                    );
                    return false;
                }
                task.status = update.status.clone();
                true
            }
            TaskEvent::Artifact(update) => {
                let Some(task) = tasks.get_mut(&update.task_id) else {
                    warn!(task_id = %update.task_id, "artifact for unknown task");
                    return false;
                };
                if task.status.state.is_terminal() {
                    return false;
                }
                let artifact = &update.artifact;
                match task.artifacts.iter_mut().find(|a| a.artifact_id == artifact.artifact_id) {
                    Some(existing) if update.append => existing.parts.extend(artifact.parts.iter().cloned()),
                    Some(existing) => *existing = artifact.clone(),
                    None => task.artifacts.push(artifact.clone()),
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::{
        Artifact, Message, TaskArtifactUpdateEvent, TaskState, TaskStatus, TaskStatusUpdateEvent,
    };

    fn status(state: TaskState) -> TaskEvent {
        TaskEvent::Status(TaskStatusUpdateEvent::new("t1", "c1", TaskStatus::new(state, None), state.is_terminal()))
    }

    fn stored() -> TaskStore {
        let store = TaskStore::new();
        assert!(store.apply(&TaskEvent::Task(Task::submitted("t1", "c1", Message::user_text("hi")))));
        store
    }

    #[test]
    fn working_repeats_then_terminal_once() {
        let store = stored();
        assert!(store.apply(&status(TaskState::Working)));
        assert!(store.apply(&status(TaskState::Working)));
        assert!(store.apply(&status(TaskState::Completed)));
        assert!(!store.apply(&status(TaskState::Canceled)));
        assert!(!store.apply(&status(TaskState::Working)));
        assert_eq!(store.get("t1").unwrap().status.state, TaskState::Completed);
    }

    #[test]
    fn artifacts_rejected_after_terminal() {
        let store = stored();
        let art = TaskEvent::Artifact(TaskArtifactUpdateEvent::new("t1", "c1", Artifact::text("agent_response", "x")));
        assert!(store.apply(&art));
        assert!(store.apply(&status(TaskState::Canceled)));
        assert!(!store.apply(&art));
        assert_eq!(store.get("t1").unwrap().artifacts.len(), 1);
    }

    #[test]
    fn unknown_task_updates_rejected() {
        let store = TaskStore::new();
        assert!(!store.apply(&status(TaskState::Working)));
        assert!(store.is_empty());
    }
}
