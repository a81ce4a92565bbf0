//! Long-running components and the set that drives them.
//!
//! The server binary runs two kinds of [`Component`]: the HTTP server and,
//! when an idle TTL is configured, the session sweeper. Each one owns its
//! shared state and watches one [`CancellationToken`]. When a component
//! fails, the token is cancelled so the others wind down too.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

pub trait Component: Send + 'static {
    /// Name used in log fields.
    fn id(&self) -> &str;

    /// Run until `shutdown` fires or the work is done. Called once.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Handle to a running component set.
pub struct ComponentSet {
    inner: JoinHandle<Result<(), AppError>>,
}

impl ComponentSet {
    /// Wait for every component; the first failure wins.
    pub async fn join(self) -> Result<(), AppError> {
        self.inner
            .await
            .unwrap_or_else(|e| Err(AppError::Internal(format!("component supervisor panicked: {e}"))))
    }
}

/// Spawn every component on its own task.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> ComponentSet {
    let inner = tokio::spawn(async move {
        let mut set: JoinSet<(String, Result<(), AppError>)> = JoinSet::new();
        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "starting component");
            let run = component.run(shutdown.clone());
            set.spawn(async move { (id, run.await) });
        }

        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok((id, Ok(()))) => {
                    info!(component = %id, "component stopped");
                    continue;
                }
                Ok((id, Err(e))) => {
                    error!(component = %id, class = e.class(), error = %e, "component failed");
                    e
                }
                Err(e) => {
                    error!(error = %e, "component panicked");
                    AppError::Internal(format!("component panicked: {e}"))
                }
            };
            shutdown.cancel();
            first_err.get_or_insert(failure);
        }
        first_err.map_or(Ok(()), Err)
    });
    ComponentSet { inner }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UntilShutdown;

    impl Component for UntilShutdown {
        fn id(&self) -> &str {
            "http"
        }

        fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async move {
                shutdown.cancelled().await;
                Ok(())
            })
        }
    }

    struct BindFails;

    impl Component for BindFails {
        fn id(&self) -> &str {
            "sweeper"
        }

        fn run(self: Box<Self>, _shutdown: CancellationToken) -> ComponentFuture {
            Box::pin(async { Err(AppError::Http("address in use".into())) })
        }
    }

    #[tokio::test]
    async fn shutdown_stops_everything_cleanly() {
        let token = CancellationToken::new();
        let set = spawn_components(vec![Box::new(UntilShutdown), Box::new(UntilShutdown)], token.clone());
        token.cancel();
        assert!(set.join().await.is_ok());
    }

    #[tokio::test]
    async fn one_failure_cancels_the_rest() {
        let token = CancellationToken::new();
        let set = spawn_components(vec![Box::new(UntilShutdown), Box::new(BindFails)], token.clone());
        let err = set.join().await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)));
        assert!(token.is_cancelled());
    }
}
