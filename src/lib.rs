//! Forwarding HTTP proxy library.
//!
//! Requests to `/proxy/{target}` are re-issued against `target` through a
//! shared, hot-swappable outbound client, and the response is streamed back.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod memory;
pub mod observability;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
