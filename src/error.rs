//! Application-wide error types.
//!
//! The first five variants are the error classes a caller can observe.
//! [`AppError::class`] gives each one a stable label so response bodies never
//! carry raw internal error text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid environment / parameter / config values. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Token exchange failed. Callers must not fall back to unauthenticated requests.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Malformed or missing request fields.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Memory retrieval or persistence failed. Recovered locally, never propagated to callers.
    #[error("memory error: {0}")]
    Memory(String),

    /// Anything else that went wrong while running a task.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Stable class label for user-visible error bodies.
    pub fn class(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration_error",
            AppError::Auth(_) => "authentication_error",
            AppError::InvalidParams(_) => "invalid_params",
            AppError::Memory(_) => "transient_memory_error",
            AppError::Internal(_) | AppError::Logger(_) | AppError::Io(_) => "internal_error",
            AppError::Http(_) => "upstream_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing MEMORY_ID".into());
        assert!(e.to_string().contains("missing MEMORY_ID"));
        assert_eq!(e.class(), "configuration_error");
    }

    #[test]
    fn auth_error_display() {
        let e = AppError::Auth("provider unreachable".into());
        assert!(e.to_string().contains("provider unreachable"));
        assert_eq!(e.class(), "authentication_error");
    }

    #[test]
    fn invalid_params_is_distinct_from_internal() {
        let invalid = AppError::InvalidParams("no session id".into());
        let internal = AppError::Internal("boom".into());
        assert_ne!(invalid.class(), internal.class());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        assert_eq!(e.class(), "internal_error");
        let _: &dyn Error = &e;
    }
}
