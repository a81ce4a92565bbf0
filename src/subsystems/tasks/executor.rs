//! Task executor — drives one agent turn as a cancellable A2A task.
//!
//! ```text
//! execute:  submitted ─► working* ─► artifact "agent_response" ─► completed
//!                                └──────── error ───────────────► failed
//! cancel:   clears the active flag; the stream loop stops at its next fragment
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, OnceCell};
use tracing::{error, info, warn};

use super::queue::{EventQueue, TaskEvent, TaskUpdater};
use crate::a2a::{Artifact, Message, Task};
use crate::error::AppError;
use crate::subsystems::agents::{AgentFactory, ConversationalAgent};

pub const ARTIFACT_NAME: &str = "agent_response";

/// Everything the executor knows about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub task_id: String,
    pub context_id: String,
    pub message: Option<Message>,
    pub current_task: Option<Task>,
    pub session_id: Option<String>,
    pub actor_id: String,
}

impl RequestContext {
    /// Text of the user message, if non-blank.
    pub fn user_input(&self) -> Option<String> {
        self.message
            .as_ref()
            .map(|m| m.text())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Clears a task's active-table entry however `execute` exits.
struct ActiveEntry<'a> {
    table: &'a Mutex<HashMap<String, bool>>,
    task_id: String,
}

impl Drop for ActiveEntry<'_> {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.lock() {
            table.remove(&self.task_id);
        }
    }
}

pub struct TaskExecutor {
    factory: AgentFactory,
    agent: OnceCell<Arc<dyn ConversationalAgent>>,
    /// task id -> still wanted. Entries exist only while a task executes.
    active: Mutex<HashMap<String, bool>>,
}

impl TaskExecutor {
    pub fn new(factory: AgentFactory) -> Self {
        Self { factory, agent: OnceCell::new(), active: Mutex::new(HashMap::new()) }
    }

    fn is_active(&self, task_id: &str) -> bool {
        self.active
            .lock()
            .map(|t| t.get(task_id).copied().unwrap_or(false))
            .unwrap_or(false)
    }

    /// True while `task_id` is being executed.
    pub fn is_running(&self, task_id: &str) -> bool {
        self.active.lock().map(|t| t.contains_key(task_id)).unwrap_or(false)
    }

    /// Number of tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.active.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// The session's agent, built by the factory on first call.
    pub async fn agent(&self, session_id: &str, actor_id: &str) -> Result<Arc<dyn ConversationalAgent>, AppError> {
        self.agent
            .get_or_try_init(|| {
                info!(session_id, "creating agent");
                (self.factory)(session_id.to_string(), actor_id.to_string())
            })
            .await
            .cloned()
    }

    /// Run the turn described by `ctx`, reporting progress through `queue`.
    ///
    /// Missing session id or user message is [`AppError::InvalidParams`];
    /// every other failure marks the task failed and comes back as
    /// [`AppError::Internal`].
    pub async fn execute(&self, ctx: RequestContext, queue: EventQueue) -> Result<(), AppError> {
        let session_id = ctx
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                error!("session id is not set");
                AppError::InvalidParams("missing session id".into())
            })?;
        let input = ctx.user_input().ok_or_else(|| {
            error!("no user message in request");
            AppError::InvalidParams("missing user message".into())
        })?;

        let task = match ctx.current_task.clone() {
            Some(t) => t,
            None => {
                let message = ctx.message.clone().unwrap_or_else(|| Message::user_text(input.clone()));
                let t = Task::submitted(&ctx.task_id, &ctx.context_id, message);
                queue.enqueue(TaskEvent::Task(t.clone())).await;
                t
            }
        };
        let updater = TaskUpdater::new(queue, &task.id, &task.context_id);

        info!(task_id = %task.id, session_id = %session_id, "executing task");
        let result = async {
            let agent = self.agent(&session_id, &ctx.actor_id).await?;
            {
                let mut table = self
                    .active
                    .lock()
                    .map_err(|_| AppError::Internal("active task table poisoned".into()))?;
                if table.contains_key(&task.id) {
                    warn!(task_id = %task.id, "task is already running, follow-up rejected");
                    return Err(AppError::InvalidParams(format!("task {} is still running", task.id)));
                }
                table.insert(task.id.clone(), true);
            }
            let _entry = ActiveEntry { table: &self.active, task_id: task.id.clone() };
            self.stream_turn(agent, &input, &updater).await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(AppError::InvalidParams(m)) => Err(AppError::InvalidParams(m)),
            Err(e) => {
                error!(task_id = %task.id, class = e.class(), error = %e, "task failed");
                updater.failed(e.class()).await;
                Err(AppError::Internal(e.to_string()))
            }
        }
    }

    async fn stream_turn(
        &self,
        agent: Arc<dyn ConversationalAgent>,
        input: &str,
        updater: &TaskUpdater,
    ) -> Result<(), AppError> {
        let task_id = updater.task_id.as_str();
        let (tx, mut rx) = mpsc::channel::<String>(32);
        let prompt = input.to_string();
        let producer = tokio::spawn(async move { agent.stream(&prompt, tx).await });

        let mut accumulated = String::new();
        while let Some(fragment) = rx.recv().await {
            if !self.is_active(task_id) {
                info!(task_id, "task cancelled during streaming");
                return Ok(());
            }
            if fragment.is_empty() {
                continue;
            }
            accumulated.push_str(&fragment);
            updater.working(&accumulated).await;
        }

        match producer.await {
            Ok(res) => res?,
            Err(e) => return Err(AppError::Internal(format!("agent task panicked: {e}"))),
        }

        if !self.is_active(task_id) {
            info!(task_id, "task cancelled before completion");
            return Ok(());
        }
        if !accumulated.is_empty() {
            updater.add_artifact(Artifact::text(ARTIFACT_NAME, accumulated)).await;
        }
        updater.complete().await;
        info!(task_id, "task completed");
        Ok(())
    }

    /// Request cancellation of `ctx.task_id`.
    pub async fn cancel(&self, ctx: RequestContext, queue: EventQueue) -> Result<(), AppError> {
        info!(task_id = %ctx.task_id, "cancelling task");
        if let Ok(mut table) = self.active.lock() {
            if let Some(flag) = table.get_mut(&ctx.task_id) {
                *flag = false;
            }
        }
        match ctx.current_task {
            Some(task) => {
                let updater = TaskUpdater::new(queue, &task.id, &task.context_id);
                if updater.cancel().await {
                    info!(task_id = %task.id, "task cancelled");
                }
            }
            None => warn!(task_id = %ctx.task_id, "no task found to cancel"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::TaskState;
    use crate::subsystems::agents::{prebuilt, AgentFuture};
    use crate::subsystems::tasks::store::TaskStore;

    struct Scripted(Vec<&'static str>);

    impl ConversationalAgent for Scripted {
        fn stream<'a>(&'a self, _prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
            Box::pin(async move {
                for p in &self.0 {
                    if tx.send(p.to_string()).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(())
            })
        }
    }

    struct Broken;

    impl ConversationalAgent for Broken {
        fn stream<'a>(&'a self, _prompt: &'a str, _tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
            Box::pin(async { Err(AppError::Http("model unreachable".into())) })
        }
    }

    fn ctx(session: Option<&str>, text: Option<&str>) -> RequestContext {
        RequestContext {
            task_id: "t1".into(),
            context_id: "c1".into(),
            message: text.map(Message::user_text),
            current_task: None,
            session_id: session.map(str::to_string),
            actor_id: "Actor1".into(),
        }
    }

    #[tokio::test]
    async fn missing_session_is_invalid_params() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec![]))));
        let store = Arc::new(TaskStore::new());
        let err = exec.execute(ctx(None, Some("hi")), EventQueue::detached(store.clone())).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidParams(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_message_is_invalid_params() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec![]))));
        let store = Arc::new(TaskStore::new());
        let err = exec.execute(ctx(Some("s"), Some("  ")), EventQueue::detached(store)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn agent_failure_fails_task_as_internal() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Broken)));
        let store = Arc::new(TaskStore::new());
        let err = exec.execute(ctx(Some("s"), Some("hi")), EventQueue::detached(store.clone())).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(store.get("t1").unwrap().status.state, TaskState::Failed);
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn empty_reply_completes_without_artifact() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec![]))));
        let store = Arc::new(TaskStore::new());
        exec.execute(ctx(Some("s"), Some("hi")), EventQueue::detached(store.clone())).await.unwrap();
        let task = store.get("t1").unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert!(task.artifacts.is_empty());
    }

    #[tokio::test]
    async fn agent_created_once_per_executor() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let factory: AgentFactory = Arc::new(move |_: String, _: String| -> AgentFuture<'static, Arc<dyn ConversationalAgent>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(Arc::new(Scripted(vec!["ok"])) as Arc<dyn ConversationalAgent>) })
        });
        let exec = TaskExecutor::new(factory);
        let store = Arc::new(TaskStore::new());
        for id in ["a", "b"] {
            let mut c = ctx(Some("s"), Some("hi"));
            c.task_id = id.into();
            exec.execute(c, EventQueue::detached(store.clone())).await.unwrap();
        }
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_noop() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec![]))));
        let store = Arc::new(TaskStore::new());
        exec.cancel(ctx(Some("s"), None), EventQueue::detached(store.clone())).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(exec.active_count(), 0);
    }

    #[tokio::test]
    async fn cancel_after_completion_keeps_completed() {
        let exec = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec!["done"]))));
        let store = Arc::new(TaskStore::new());
        exec.execute(ctx(Some("s"), Some("hi")), EventQueue::detached(store.clone())).await.unwrap();
        let mut c = ctx(Some("s"), None);
        c.current_task = store.get("t1");
        exec.cancel(c, EventQueue::detached(store.clone())).await.unwrap();
        assert_eq!(store.get("t1").unwrap().status.state, TaskState::Completed);
    }
}
