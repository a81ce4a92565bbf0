//! The memory service seam.
//!
//! Backends live in `stores/`. Every method returns a boxed future so the
//! service can be held as `Arc<dyn MemoryService>` without `async-trait`.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use super::types::{MemoryRecord, Strategy, Turn, TurnGroup};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The memory resource itself does not exist.
    #[error("memory resource not found: {0}")]
    ResourceNotFound(String),
    /// A strategy type with no namespace in this memory.
    #[error("unknown memory strategy: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("memory service failed: {0}")]
    Service(String),
}

impl From<MemoryError> for AppError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::ResourceNotFound(m) => AppError::Config(format!("memory resource not found: {m}")),
            other => AppError::Memory(other.to_string()),
        }
    }
}

pub type MemoryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, MemoryError>> + Send + 'a>>;

pub trait MemoryService: Send + Sync {
    /// Strategies configured on `memory_id`.
    fn strategies<'a>(&'a self, memory_id: &'a str) -> MemoryFuture<'a, Vec<Strategy>>;

    /// Similarity search within one resolved namespace, best match first.
    fn retrieve<'a>(
        &'a self,
        memory_id: &'a str,
        namespace: &'a str,
        query: &'a str,
        top_k: usize,
    ) -> MemoryFuture<'a, Vec<MemoryRecord>>;

    /// Append one turn-set as a single event.
    fn create_event<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        turns: &'a [Turn],
    ) -> MemoryFuture<'a, ()>;

    /// Up to `k` most recent turn-groups, most-recent-last.
    fn last_turns<'a>(
        &'a self,
        memory_id: &'a str,
        actor_id: &'a str,
        session_id: &'a str,
        k: usize,
    ) -> MemoryFuture<'a, Vec<TurnGroup>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_resource_becomes_config_error() {
        let e: AppError = MemoryError::ResourceNotFound("mem-1".into()).into();
        assert_eq!(e.class(), "configuration_error");
    }

    #[test]
    fn other_failures_are_transient() {
        let e: AppError = MemoryError::Service("timeout".into()).into();
        assert_eq!(e.class(), "transient_memory_error");
    }
}
