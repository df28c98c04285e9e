//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request /proxy/{target}
//!     → server.rs (Axum setup, request ID, body limit)
//!     → request.rs (derive target, classify, read body, scrub headers)
//!     → upstream (lease a slot on the current client, dispatch)
//!     → response.rs (sanitize headers, stream body in chunks)
//!     → Send to client
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use error::ProxyError;
pub use request::{build_outbound, classify, derive_target, BodyPlan};
pub use response::{relay, RelayStream};
pub use server::{AppState, HttpServer};
