//! Subsystem modules for the agent runtime.

pub mod agents;
pub mod comms;
pub mod gateway;
pub mod memory;
pub mod peers;
pub mod runtime;
pub mod sessions;
pub mod tasks;
pub mod tools;
