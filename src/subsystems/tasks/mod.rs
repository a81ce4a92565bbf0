//! Task lifecycle — executor, event queue and store.

pub mod executor;
pub mod queue;
pub mod store;

pub use executor::{RequestContext, TaskExecutor, ARTIFACT_NAME};
pub use queue::{EventQueue, TaskEvent, TaskUpdater};
pub use store::TaskStore;
