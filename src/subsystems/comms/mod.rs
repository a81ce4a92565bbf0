//! Comms subsystem — the runtime's HTTP surface.
//!
//! ## URL layout
//!
//! ```text
//! GET  /ping     — liveness, always 200
//! GET  /health   — liveness with agent name and version
//! *    /*path    — session proxy: single-flight init, then the session's
//!                  A2A sub-application (see [`a2a_app`])
//! ```
//!
//! [`HttpServer`] implements [`Component`]; `run()` drives axum and the
//! shared [`CancellationToken`] is wired to axum's graceful shutdown.

pub mod a2a_app;
mod proxy;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::identity::TokenProvider;
use crate::subsystems::runtime::{Component, ComponentFuture};
use crate::subsystems::sessions::{SessionKey, SessionRegistry};

// ── Session resources ─────────────────────────────────────────────────────────

/// What a READY session owns: its credentials and its A2A sub-application.
pub struct SessionResources {
    pub tokens: Arc<TokenProvider>,
    pub app: Router,
}

pub type InitFuture = Pin<Box<dyn Future<Output = Result<SessionResources, AppError>> + Send>>;

/// Builds [`SessionResources`] for a session seen for the first time.
pub trait SessionInitializer: Send + Sync {
    fn initialize(&self, key: SessionKey) -> InitFuture;
}

// ── Shared request state ──────────────────────────────────────────────────────

/// Router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub agent_name: Arc<str>,
    pub default_actor: Arc<str>,
    pub registry: Arc<SessionRegistry<SessionResources>>,
    pub initializer: Arc<dyn SessionInitializer>,
}

// ── HttpServer ────────────────────────────────────────────────────────────────

pub struct HttpServer {
    bind_addr: String,
    state: ServerState,
}

impl HttpServer {
    pub fn new(bind_addr: impl Into<String>, state: ServerState) -> Self {
        Self { bind_addr: bind_addr.into(), state }
    }
}

impl Component for HttpServer {
    fn id(&self) -> &str {
        "http"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_server(self.bind_addr, self.state, shutdown))
    }
}

async fn run_server(bind_addr: String, state: ServerState, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Http(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "http server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("http server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/ping",   get(ping))
        .route("/health", get(health))
        .fallback(proxy::forward)
        .with_state(state)
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn health(State(state): State<ServerState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agent": &*state.agent_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
