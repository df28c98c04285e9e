//! Memory pressure subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → sampler.rs (resident memory)
//!     → classify: Normal | Elevated | Critical
//!     → Elevated: reclaim.rs (return free pages)
//!     → Critical: reclaim, resample, replace the client pool if still high
//!
//! POST /admin/cleanup
//!     → monitor.rs cleanup() (same routine as Critical)
//! ```
//!
//! # Design Decisions
//! - Monitor failures are logged, never propagated to request handling
//! - Sampler is a trait so tests can script readings

pub mod monitor;
pub mod reclaim;
pub mod sampler;

use thiserror::Error;

use crate::upstream::PoolError;

pub use monitor::{CleanupReport, MemoryMonitor, Pressure};
pub use sampler::{MemorySample, MemorySampler, ProcessMemory};

/// Errors raised inside the memory monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The platform did not report process memory.
    #[error("process memory statistics unavailable")]
    Unavailable,

    /// Replacing the outbound pool failed.
    #[error("pool replacement failed: {0}")]
    Pool(#[from] PoolError),
}
