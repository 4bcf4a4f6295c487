//! HTTP API surface: upload endpoint, SSE log stream, response types.

pub mod logs;
pub mod server;
pub mod types;
