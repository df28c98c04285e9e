//! Outbound connection subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine
//!     → pool.rs (load the current handle, pin it for the request)
//!     → client.rs (acquire a lease within the pool timeout, send)
//!     → Response head + Lease handed back to the relay
//!
//! Memory monitor / admin cleanup
//!     → pool.rs replace(): build → publish → close old
//! ```
//!
//! # Design Decisions
//! - Handles are immutable; replacement swaps the whole `Arc`
//! - A lease pins its handle, so retired handles live until drained
//! - Connection limit is a semaphore, not an unbounded queue

pub mod client;
pub mod pool;
pub mod request;

pub use client::{DispatchError, Lease, OutboundClient, PoolError};
pub use pool::ClientPool;
pub use request::{FilePart, MultipartPayload, OutboundBody, OutboundRequest};
