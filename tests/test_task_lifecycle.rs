//! Task executor driven through an event queue with a listener.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};

use a2a_relay::a2a::{Message, Part, TaskState};
use a2a_relay::error::AppError;
use a2a_relay::subsystems::agents::{AgentFuture, ConversationalAgent, prebuilt};
use a2a_relay::subsystems::tasks::{
    ARTIFACT_NAME, EventQueue, RequestContext, TaskEvent, TaskExecutor, TaskStore,
};

struct Scripted(Vec<&'static str>);

impl ConversationalAgent for Scripted {
    fn stream<'a>(&'a self, _prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
        Box::pin(async move {
            for piece in &self.0 {
                if tx.send(piece.to_string()).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        })
    }
}

/// Sends "first ", waits to be released, then sends "second".
struct Gated {
    release: Arc<Notify>,
}

impl ConversationalAgent for Gated {
    fn stream<'a>(&'a self, _prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
        Box::pin(async move {
            let _ = tx.send("first ".to_string()).await;
            self.release.notified().await;
            let _ = tx.send("second".to_string()).await;
            Ok(())
        })
    }
}

struct FailsMidway;

impl ConversationalAgent for FailsMidway {
    fn stream<'a>(&'a self, _prompt: &'a str, tx: mpsc::Sender<String>) -> AgentFuture<'a, ()> {
        Box::pin(async move {
            let _ = tx.send("partial".to_string()).await;
            Err(AppError::Http("model endpoint returned 500".into()))
        })
    }
}

fn context(task_id: &str, prompt: &str) -> RequestContext {
    RequestContext {
        task_id: task_id.to_string(),
        context_id: "ctx-1".to_string(),
        message: Some(Message::user_text(prompt)),
        current_task: None,
        session_id: Some("abc".to_string()),
        actor_id: "u1".to_string(),
    }
}

fn working_texts(events: &[TaskEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::Status(s) if s.status.state == TaskState::Working => {
                s.status.message.as_ref().map(|m| m.text())
            }
            _ => None,
        })
        .collect()
}

async fn drain(mut rx: mpsc::Receiver<TaskEvent>) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
        events.push(e);
    }
    events
}

#[tokio::test]
async fn test_streamed_fragments_accumulate() {
    let executor = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec!["Hel", "lo ", "world"]))));
    let store = Arc::new(TaskStore::new());
    let (queue, rx) = EventQueue::new(store.clone(), 64);

    executor.execute(context("t1", "greet me"), queue).await.unwrap();
    let events = drain(rx).await;

    assert!(matches!(events.first(), Some(TaskEvent::Task(t)) if t.id == "t1"));
    assert_eq!(working_texts(&events), vec!["Hel", "Hello ", "Hello world"]);

    let artifacts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::Artifact(a) => Some(&a.artifact),
            _ => None,
        })
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name.as_deref(), Some(ARTIFACT_NAME));

    let last = events.last().unwrap();
    assert!(last.is_final());
    assert!(matches!(last, TaskEvent::Status(s) if s.status.state == TaskState::Completed));

    let task = store.get("t1").unwrap();
    assert_eq!(task.status.state, TaskState::Completed);
    assert_eq!(task.artifacts.len(), 1);
    assert_eq!(executor.active_count(), 0);
}

#[tokio::test]
async fn test_empty_reply_completes_without_artifact() {
    let executor = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec![]))));
    let store = Arc::new(TaskStore::new());
    let (queue, rx) = EventQueue::new(store.clone(), 16);

    executor.execute(context("t1", "anything"), queue).await.unwrap();
    let events = drain(rx).await;

    assert!(events.iter().all(|e| !matches!(e, TaskEvent::Artifact(_))));
    assert_eq!(store.get("t1").unwrap().status.state, TaskState::Completed);
}

#[tokio::test]
async fn test_cancel_mid_stream_suppresses_completion() {
    let release = Arc::new(Notify::new());
    let executor = Arc::new(TaskExecutor::new(prebuilt(Arc::new(Gated { release: release.clone() }))));
    let store = Arc::new(TaskStore::new());
    let (queue, mut rx) = EventQueue::new(store.clone(), 64);

    let run = {
        let executor = executor.clone();
        let queue = queue.clone();
        tokio::spawn(async move { executor.execute(context("t1", "long job"), queue).await })
    };

    // Wait for the first working update, then cancel.
    let mut events = Vec::new();
    while let Some(e) = rx.recv().await {
        let working = matches!(&e, TaskEvent::Status(s) if s.status.state == TaskState::Working);
        events.push(e);
        if working {
            break;
        }
    }
    let mut cancel_ctx = context("t1", "long job");
    cancel_ctx.current_task = store.get("t1");
    executor.cancel(cancel_ctx, queue).await.unwrap();
    release.notify_one();

    run.await.unwrap().unwrap();
    events.extend(drain(rx).await);

    assert_eq!(working_texts(&events), vec!["first "]);
    assert!(events.iter().all(|e| !matches!(e, TaskEvent::Artifact(_))));
    assert!(!events.iter().any(|e| matches!(e, TaskEvent::Status(s) if s.status.state == TaskState::Completed)));
    assert_eq!(store.get("t1").unwrap().status.state, TaskState::Canceled);
    assert_eq!(executor.active_count(), 0);
}

#[tokio::test]
async fn test_agent_failure_marks_task_failed() {
    let executor = TaskExecutor::new(prebuilt(Arc::new(FailsMidway)));
    let store = Arc::new(TaskStore::new());
    let (queue, rx) = EventQueue::new(store.clone(), 16);

    let err = executor.execute(context("t1", "break"), queue).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    let events = drain(rx).await;

    let last = events.last().unwrap();
    let TaskEvent::Status(status) = last else { panic!("expected a status event, got {last:?}") };
    assert_eq!(status.status.state, TaskState::Failed);
    // Only the error class is exposed, never the raw message.
    assert_eq!(status.status.message.as_ref().unwrap().text(), "upstream_error");
}

#[tokio::test]
async fn test_missing_session_rejected_before_any_event() {
    let executor = TaskExecutor::new(prebuilt(Arc::new(Scripted(vec!["x"]))));
    let store = Arc::new(TaskStore::new());
    let (queue, rx) = EventQueue::new(store.clone(), 16);

    let mut ctx = context("t1", "hello");
    ctx.session_id = None;
    let err = executor.execute(ctx, queue).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidParams(_)));
    assert!(drain(rx).await.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_follow_up_on_running_task_rejected() {
    let release = Arc::new(Notify::new());
    let executor = Arc::new(TaskExecutor::new(prebuilt(Arc::new(Gated { release: release.clone() }))));
    let store = Arc::new(TaskStore::new());
    let (queue, mut rx) = EventQueue::new(store.clone(), 64);

    let run = {
        let executor = executor.clone();
        let queue = queue.clone();
        tokio::spawn(async move { executor.execute(context("t1", "long job"), queue).await })
    };
    while let Some(e) = rx.recv().await {
        if matches!(&e, TaskEvent::Status(s) if s.status.state == TaskState::Working) {
            break;
        }
    }
    assert!(executor.is_running("t1"));

    let mut follow_up = context("t1", "and another thing");
    follow_up.current_task = store.get("t1");
    let err = executor.execute(follow_up, queue).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidParams(_)));

    // The first run is untouched and still completes.
    release.notify_one();
    run.await.unwrap().unwrap();
    drop(rx);
    let task = store.get("t1").unwrap();
    assert_eq!(task.status.state, TaskState::Completed);
    assert_eq!(task.artifacts[0].parts, vec![Part::Text { text: "first second".into() }]);
    assert!(!executor.is_running("t1"));
}
