//! Per-session A2A sub-application.
//!
//! ```text
//! GET  /.well-known/agent-card.json
//! POST /               JSON-RPC: message/send, message/stream, tasks/get, tasks/cancel
//! POST /invocations    {"prompt": "..."} → SSE of `data: "<fragment>"`
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::a2a::jsonrpc::{
    self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MessageSendParams, TaskIdParams,
    TaskQueryParams,
};
use crate::a2a::{AGENT_CARD_PATH, AgentCard};
use crate::error::AppError;
use crate::subsystems::tasks::{EventQueue, RequestContext, TaskExecutor, TaskStore};

/// Shared state of one session's sub-application.
#[derive(Clone)]
pub struct A2aState {
    pub card: Arc<AgentCard>,
    pub executor: Arc<TaskExecutor>,
    pub tasks: Arc<TaskStore>,
    pub session_id: Arc<str>,
    pub actor_id: Arc<str>,
}

pub fn a2a_router(state: A2aState) -> Router {
    Router::new()
        .route(AGENT_CARD_PATH, get(agent_card))
        .route("/",             post(jsonrpc_entry))
        .route("/invocations",  post(invocations))
        .with_state(state)
}

async fn agent_card(State(state): State<A2aState>) -> Json<AgentCard> {
    Json((*state.card).clone())
}

// ── JSON-RPC ──────────────────────────────────────────────────────────────────

fn rpc_error(id: Value, code: i64, message: &str) -> Response {
    Json(JsonRpcResponse::failure(id, JsonRpcError::new(code, message))).into_response()
}

fn params<T: DeserializeOwned>(req: &JsonRpcRequest) -> Result<T, AppError> {
    serde_json::from_value(req.params.clone()).map_err(|e| AppError::InvalidParams(e.to_string()))
}

async fn jsonrpc_entry(State(state): State<A2aState>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "unparseable json-rpc body");
            return rpc_error(Value::Null, jsonrpc::PARSE_ERROR, "parse error");
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let req: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(_) => return rpc_error(id, jsonrpc::INVALID_REQUEST, "invalid request"),
    };
    if req.jsonrpc != "2.0" {
        return rpc_error(id, jsonrpc::INVALID_REQUEST, "invalid request");
    }

    debug!(method = %req.method, session_id = %state.session_id, "json-rpc request");
    let method = req.method.clone();
    match method.as_str() {
        jsonrpc::MESSAGE_SEND => message_send(state, req).await,
        jsonrpc::MESSAGE_STREAM => message_stream(state, req),
        jsonrpc::TASKS_GET => tasks_get(state, req),
        jsonrpc::TASKS_CANCEL => tasks_cancel(state, req).await,
        other => {
            warn!(method = other, "unknown json-rpc method");
            rpc_error(req.id, jsonrpc::METHOD_NOT_FOUND, "method not found")
        }
    }
}

/// Resolve task and context ids for an inbound message.
fn request_context(state: &A2aState, req: &JsonRpcRequest) -> Result<RequestContext, AppError> {
    let MessageSendParams { message, .. } = params(req)?;

    let current_task = message.task_id.as_deref().and_then(|id| state.tasks.get(id));
    if let Some(task) = &current_task {
        if task.status.state.is_terminal() {
            return Err(AppError::InvalidParams(format!("task {} is already {:?}", task.id, task.status.state)));
        }
        if state.executor.is_running(&task.id) {
            return Err(AppError::InvalidParams(format!("task {} is still running", task.id)));
        }
    }
    let task_id = current_task
        .as_ref()
        .map(|t| t.id.clone())
        .or_else(|| message.task_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let context_id = message
        .context_id
        .clone()
        .or_else(|| current_task.as_ref().map(|t| t.context_id.clone()))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(RequestContext {
        task_id,
        context_id,
        message: Some(message),
        current_task,
        session_id: Some(state.session_id.to_string()),
        actor_id: state.actor_id.to_string(),
    })
}

async fn message_send(state: A2aState, req: JsonRpcRequest) -> Response {
    let ctx = match request_context(&state, &req) {
        Ok(c) => c,
        Err(e) => return Json(JsonRpcResponse::failure(req.id, JsonRpcError::from_app(&e))).into_response(),
    };
    let task_id = ctx.task_id.clone();

    if let Err(e) = state.executor.execute(ctx, EventQueue::detached(state.tasks.clone())).await {
        return Json(JsonRpcResponse::failure(req.id, JsonRpcError::from_app(&e))).into_response();
    }
    match state.tasks.get(&task_id) {
        Some(task) => Json(JsonRpcResponse::success(req.id, json!(task))).into_response(),
        None => rpc_error(req.id, jsonrpc::TASK_NOT_FOUND, "task not found"),
    }
}

fn message_stream(state: A2aState, req: JsonRpcRequest) -> Response {
    let (out_tx, out_rx) = mpsc::channel::<JsonRpcResponse>(64);
    let id = req.id.clone();

    match request_context(&state, &req) {
        Err(e) => {
            let _ = out_tx.try_send(JsonRpcResponse::failure(id, JsonRpcError::from_app(&e)));
        }
        Ok(ctx) => {
            let (queue, mut events) = EventQueue::new(state.tasks.clone(), 64);
            let executor = state.executor.clone();
            tokio::spawn(async move {
                let forward = async {
                    while let Some(event) = events.recv().await {
                        let frame = JsonRpcResponse::success(id.clone(), event.to_value());
                        if out_tx.send(frame).await.is_err() {
                            debug!("stream client went away");
                            break;
                        }
                    }
                };
                let (res, ()) = tokio::join!(executor.execute(ctx, queue), forward);
                if let Err(e) = res {
                    let _ = out_tx.send(JsonRpcResponse::failure(id, JsonRpcError::from_app(&e))).await;
                }
            });
        }
    }

    let stream = ReceiverStream::new(out_rx).map(|frame| Event::default().json_data(frame));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn tasks_get(state: A2aState, req: JsonRpcRequest) -> Response {
    let query: TaskQueryParams = match params(&req) {
        Ok(q) => q,
        Err(e) => return Json(JsonRpcResponse::failure(req.id, JsonRpcError::from_app(&e))).into_response(),
    };
    let Some(mut task) = state.tasks.get(&query.id) else {
        return rpc_error(req.id, jsonrpc::TASK_NOT_FOUND, "task not found");
    };
    if let Some(n) = query.history_length {
        let skip = task.history.len().saturating_sub(n);
        task.history.drain(..skip);
    }
    Json(JsonRpcResponse::success(req.id, json!(task))).into_response()
}

async fn tasks_cancel(state: A2aState, req: JsonRpcRequest) -> Response {
    let TaskIdParams { id: task_id } = match params(&req) {
        Ok(p) => p,
        Err(e) => return Json(JsonRpcResponse::failure(req.id, JsonRpcError::from_app(&e))).into_response(),
    };
    let current_task = state.tasks.get(&task_id);
    let known = current_task.is_some();
    let ctx = RequestContext {
        context_id: current_task.as_ref().map(|t| t.context_id.clone()).unwrap_or_default(),
        task_id: task_id.clone(),
        message: None,
        current_task,
        session_id: Some(state.session_id.to_string()),
        actor_id: state.actor_id.to_string(),
    };
    if let Err(e) = state.executor.cancel(ctx, EventQueue::detached(state.tasks.clone())).await {
        return Json(JsonRpcResponse::failure(req.id, JsonRpcError::from_app(&e))).into_response();
    }
    match state.tasks.get(&task_id) {
        Some(task) if known => Json(JsonRpcResponse::success(req.id, json!(task))).into_response(),
        _ => rpc_error(req.id, jsonrpc::TASK_NOT_FOUND, "task not found"),
    }
}

// ── /invocations ──────────────────────────────────────────────────────────────

async fn invocations(State(state): State<A2aState>, body: Bytes) -> Response {
    let prompt = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("prompt").and_then(Value::as_str).map(str::to_string))
        .filter(|p| !p.trim().is_empty());
    let Some(prompt) = prompt else {
        let err = AppError::InvalidParams("missing prompt".into());
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.class(), "message": "request body must carry a non-empty \"prompt\"" })),
        )
            .into_response();
    };

    let agent = match state.executor.agent(&state.session_id, &state.actor_id).await {
        Ok(a) => a,
        Err(e) => {
            warn!(class = e.class(), error = %e, "agent unavailable");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.class() }))).into_response();
        }
    };

    info!(session_id = %state.session_id, "invocation");
    let (frag_tx, frag_rx) = mpsc::channel::<String>(32);
    let (err_tx, err_rx) = mpsc::channel::<AppError>(1);
    tokio::spawn(async move {
        if let Err(e) = agent.stream(&prompt, frag_tx).await {
            warn!(class = e.class(), error = %e, "invocation failed");
            let _ = err_tx.send(e).await;
        }
    });

    let fragments = ReceiverStream::new(frag_rx).map(|f| Event::default().json_data(f));
    let failures = ReceiverStream::new(err_rx).map(|e| Event::default().json_data(json!({ "error": e.class() })));
    Sse::new(fragments.chain(failures)).into_response()
}
