//! Agent-to-agent runtime library.
//!
//! Both binaries link this crate: `a2a-relay` serves one agent role over
//! HTTP, `agent-connect` is an interactive client for a deployed role.

pub mod a2a;
pub mod config;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod llm;
pub mod logger;
pub mod params;
pub mod sse;
pub mod subsystems;
pub mod supervisor;
