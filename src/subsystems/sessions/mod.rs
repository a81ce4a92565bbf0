//! Session registry — one entry per conversation, initialized exactly once.
//!
//! ```text
//! UNSEEN ──ensure_initialized──► INITIALIZING ──init Ok──► READY
//!   ▲                                  │
//!   └────────────── init Err ──────────┘
//! ```
//!
//! A single process-wide gate serializes first-time initialization. READY
//! sessions never touch the gate, so steady-state traffic for different
//! sessions runs fully concurrently. After acquiring the gate the table is
//! checked again, so callers that queued behind a successful init reuse its
//! result instead of running their own.
//!
//! Resources produced by a failed init are dropped, and the session stays
//! UNSEEN so the next request retries.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unseen,
    Initializing,
    Ready,
}

/// Identity of an inbound request, taken from its headers.
#[derive(Clone)]
pub struct SessionKey {
    pub session_id: String,
    pub actor_id: String,
    pub identity_token: Option<String>,
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("session_id", &self.session_id)
            .field("actor_id", &self.actor_id)
            .field("identity_token", &self.identity_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A READY session and the heavyweight resources built for it.
pub struct Session<T> {
    pub session_id: String,
    pub actor_id: String,
    identity_token: RwLock<Option<String>>,
    last_seen: Mutex<Instant>,
    resources: T,
}

impl<T> Session<T> {
    pub fn resources(&self) -> &T {
        &self.resources
    }

    pub fn identity_token(&self) -> Option<String> {
        self.identity_token.read().ok().and_then(|t| t.clone())
    }

    /// Store a newer identity credential. Returns `true` if it changed.
    pub fn refresh_identity_token(&self, token: &str) -> bool {
        match self.identity_token.write() {
            Ok(mut slot) if slot.as_deref() != Some(token) => {
                *slot = Some(token.to_string());
                true
            }
            _ => false,
        }
    }

    fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| seen.elapsed())
            .unwrap_or_default()
    }
}

/// Removes the INITIALIZING marker however the init attempt ends,
/// including when the caller's future is dropped mid-init.
struct InitializingGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    session_id: String,
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.session_id);
        }
    }
}

pub struct SessionRegistry<T> {
    sessions: RwLock<HashMap<String, Arc<Session<T>>>>,
    initializing: Mutex<HashSet<String>>,
    gate: tokio::sync::Mutex<()>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            initializing: Mutex::new(HashSet::new()),
            gate: tokio::sync::Mutex::new(()),
        }
    }
}

impl<T: Send + Sync + 'static> SessionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// READY session for `session_id`, if any.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session<T>>> {
        let found = self.sessions.read().ok()?.get(session_id).cloned();
        if let Some(s) = &found {
            s.touch();
        }
        found
    }

    pub fn state(&self, session_id: &str) -> SessionState {
        let ready = self
            .sessions
            .read()
            .map(|s| s.contains_key(session_id))
            .unwrap_or(false);
        if ready {
            return SessionState::Ready;
        }
        let initializing = self
            .initializing
            .lock()
            .map(|s| s.contains(session_id))
            .unwrap_or(false);
        if initializing { SessionState::Initializing } else { SessionState::Unseen }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the READY session for `key`, running `init` first if needed.
    ///
    /// At most one `init` runs per process at a time; see the module docs.
    pub async fn ensure_initialized<F, Fut>(
        &self,
        key: SessionKey,
        init: F,
    ) -> Result<Arc<Session<T>>, AppError>
    where
        F: FnOnce(SessionKey) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(session) = self.get(&key.session_id) {
            return Ok(session);
        }

        let _gate = self.gate.lock().await;

        if let Some(session) = self.get(&key.session_id) {
            debug!(session_id = %key.session_id, "initialized by a concurrent request");
            return Ok(session);
        }

        self.initializing
            .lock()
            .map_err(|_| AppError::Internal("session registry lock poisoned".into()))?
            .insert(key.session_id.clone());
        let _marker = InitializingGuard { set: &self.initializing, session_id: key.session_id.clone() };

        info!(session_id = %key.session_id, actor_id = %key.actor_id, "initializing session");
        let session_id = key.session_id.clone();
        let actor_id = key.actor_id.clone();
        let identity_token = key.identity_token.clone();

        let resources = match init(key).await {
            Ok(r) => r,
            Err(e) => {
                warn!(session_id = %session_id, class = e.class(), error = %e, "session initialization failed");
                return Err(e);
            }
        };

        let session = Arc::new(Session {
            session_id: session_id.clone(),
            actor_id,
            identity_token: RwLock::new(identity_token),
            last_seen: Mutex::new(Instant::now()),
            resources,
        });
        self.sessions
            .write()
            .map_err(|_| AppError::Internal("session registry lock poisoned".into()))?
            .insert(session_id.clone(), session.clone());
        info!(session_id = %session_id, "session ready");
        Ok(session)
    }

    /// Drop READY sessions idle for longer than `ttl`. Returns how many went.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let Ok(mut sessions) = self.sessions.write() else { return 0 };
        let before = sessions.len();
        sessions.retain(|id, s| {
            let keep = s.idle_for() <= ttl;
            if !keep {
                debug!(session_id = %id, "evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }
}

// ── Idle sweeper ──────────────────────────────────────────────────────────────

/// Background component that periodically calls [`SessionRegistry::evict_idle`].
pub struct SessionSweeper<T> {
    registry: Arc<SessionRegistry<T>>,
    ttl: Duration,
    every: Duration,
}

impl<T> SessionSweeper<T> {
    pub fn new(registry: Arc<SessionRegistry<T>>, ttl: Duration, every: Duration) -> Self {
        Self { registry, ttl, every }
    }
}

impl<T: Send + Sync + 'static> Component for SessionSweeper<T> {
    fn id(&self) -> &str {
        "session-sweeper"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            let mut tick = tokio::time::interval(self.every);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let evicted = self.registry.evict_idle(self.ttl);
                        if evicted > 0 {
                            info!(evicted, remaining = self.registry.len(), "idle sessions evicted");
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(id: &str) -> SessionKey {
        SessionKey { session_id: id.into(), actor_id: "u1".into(), identity_token: Some("wl".into()) }
    }

    #[tokio::test]
    async fn unseen_then_ready() {
        let reg: SessionRegistry<u32> = SessionRegistry::new();
        assert_eq!(reg.state("abc"), SessionState::Unseen);
        let s = reg.ensure_initialized(key("abc"), |_| async { Ok(7) }).await.unwrap();
        assert_eq!(*s.resources(), 7);
        assert_eq!(reg.state("abc"), SessionState::Ready);
    }

    #[tokio::test]
    async fn failed_init_leaves_session_unseen() {
        let reg: SessionRegistry<u32> = SessionRegistry::new();
        let err = reg
            .ensure_initialized(key("abc"), |_| async { Err(AppError::Auth("nope".into())) })
            .await;
        assert!(err.is_err());
        assert_eq!(reg.state("abc"), SessionState::Unseen);

        let s = reg.ensure_initialized(key("abc"), |_| async { Ok(1) }).await.unwrap();
        assert_eq!(*s.resources(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_init_once() {
        let reg: Arc<SessionRegistry<usize>> = Arc::new(SessionRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                reg.ensure_initialized(key("abc"), |_| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(calls.fetch_add(1, Ordering::SeqCst))
                })
                .await
                .map(|s| *s.resources())
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), 0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn identity_token_refresh() {
        let reg: SessionRegistry<()> = SessionRegistry::new();
        let s = reg.ensure_initialized(key("abc"), |_| async { Ok(()) }).await.unwrap();
        assert_eq!(s.identity_token().as_deref(), Some("wl"));
        assert!(!s.refresh_identity_token("wl"));
        assert!(s.refresh_identity_token("wl-2"));
        assert_eq!(s.identity_token().as_deref(), Some("wl-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_evicted_after_ttl() {
        let reg: SessionRegistry<()> = SessionRegistry::new();
        reg.ensure_initialized(key("old"), |_| async { Ok(()) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        reg.ensure_initialized(key("new"), |_| async { Ok(()) }).await.unwrap();

        assert_eq!(reg.evict_idle(Duration::from_secs(60)), 1);
        assert_eq!(reg.state("old"), SessionState::Unseen);
        assert_eq!(reg.state("new"), SessionState::Ready);
    }
}
