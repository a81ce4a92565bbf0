//! Memory subsystem — namespace-partitioned semantic memory around agent turns.
//!
//! [`MemoryStore`] is the adapter the hooks talk to. It resolves the
//! namespace map once at [`MemoryStore::connect`] and keeps it immutable;
//! everything else is a thin pass-through to a [`MemoryService`] backend:
//!
//! ```text
//! hooks ──► MemoryStore ──► Arc<dyn MemoryService>
//!                              ├── stores::local::LocalMemoryService
//!                              └── stores::http::HttpMemoryService
//! ```

pub mod service;
pub mod stores;
pub mod types;

pub use service::{MemoryError, MemoryService};
pub use types::{MemoryRecord, Strategy, Turn, TurnGroup, TurnRole};

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{MemoryBackend, MemoryConfig};
use crate::error::AppError;

/// Upper bound applied to every `top_k`.
pub const MAX_TOP_K: usize = 10;

/// Adapter over one memory resource.
#[derive(Clone)]
pub struct MemoryStore {
    service: Arc<dyn MemoryService>,
    memory_id: String,
    /// strategy type -> namespace template. Built once in `connect`.
    namespaces: Arc<BTreeMap<String, String>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("memory_id", &self.memory_id)
            .field("namespaces", &self.namespaces)
            .finish()
    }
}

impl MemoryStore {
    /// Query the strategies of `memory_id` and freeze the namespace map.
    ///
    /// A missing memory resource is a [`AppError::Config`].
    pub async fn connect(service: Arc<dyn MemoryService>, memory_id: &str) -> Result<Self, AppError> {
        if memory_id.is_empty() {
            return Err(AppError::Config("memory id is empty".into()));
        }
        let strategies = service.strategies(memory_id).await?;
        let namespaces: BTreeMap<String, String> = strategies
            .into_iter()
            .map(|s| (s.strategy_type, s.namespace))
            .collect();
        info!(memory_id, strategies = ?namespaces.keys().collect::<Vec<_>>(), "memory store connected");
        Ok(Self { service, memory_id: memory_id.to_string(), namespaces: Arc::new(namespaces) })
    }

    pub fn memory_id(&self) -> &str {
        &self.memory_id
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    /// Resolved namespace for `strategy_type` and `actor_id`.
    pub fn namespace_for(&self, strategy_type: &str, actor_id: &str) -> Result<String, MemoryError> {
        self.namespaces
            .get(strategy_type)
            .map(|t| types::render_namespace(t, actor_id, None))
            .ok_or_else(|| MemoryError::NotFound(strategy_type.to_string()))
    }

    /// Similarity search in a resolved namespace. `top_k` of zero is rejected;
    /// anything above [`MAX_TOP_K`] is clamped.
    pub async fn retrieve(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if top_k == 0 {
            return Err(MemoryError::InvalidArgument("top_k must be positive".into()));
        }
        let k = top_k.min(MAX_TOP_K);
        debug!(namespace, top_k = k, "retrieving memories");
        let mut records = self.service.retrieve(&self.memory_id, namespace, query, k).await?;
        records.truncate(k);
        Ok(records)
    }

    /// Append one turn-set. Each call appends; duplicates are possible on retry.
    pub async fn append_turn(
        &self,
        actor_id: &str,
        session_id: &str,
        turns: &[Turn],
    ) -> Result<(), MemoryError> {
        if turns.is_empty() {
            return Err(MemoryError::InvalidArgument("turn-set is empty".into()));
        }
        self.service
            .create_event(&self.memory_id, actor_id, session_id, turns)
            .await
    }

    /// Last `k` turn-groups, most-recent-last.
    pub async fn recent_turns(
        &self,
        actor_id: &str,
        session_id: &str,
        k: usize,
    ) -> Result<Vec<TurnGroup>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut groups = self
            .service
            .last_turns(&self.memory_id, actor_id, session_id, k)
            .await?;
        if groups.len() > k {
            groups.drain(..groups.len() - k);
        }
        Ok(groups)
    }
}

/// Construct the configured backend.
pub fn build_service(config: &MemoryConfig) -> Result<Arc<dyn MemoryService>, AppError> {
    match &config.backend {
        MemoryBackend::Local => {
            let memory_id = config.memory_id.clone().unwrap_or_default();
            let strategies = config
                .local_strategies
                .iter()
                .map(|(t, ns)| Strategy { strategy_type: t.clone(), namespace: ns.clone() })
                .collect();
            Ok(Arc::new(stores::local::LocalMemoryService::new(&memory_id, strategies)))
        }
        MemoryBackend::Http { endpoint } => Ok(Arc::new(stores::http::HttpMemoryService::new(
            endpoint,
            config.timeout_seconds,
        )?)),
    }
}
