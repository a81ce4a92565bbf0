//! Memory service backends.

pub mod http;
pub mod local;
