//! Process memory sampling.

use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::memory::MonitorError;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A point-in-time resident memory measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    /// Resident set size in megabytes.
    pub resident_mb: f64,
    /// Wall-clock time of the measurement.
    pub taken_at: SystemTime,
}

impl MemorySample {
    pub fn new(resident_mb: f64) -> Self {
        Self {
            resident_mb,
            taken_at: SystemTime::now(),
        }
    }

    /// Seconds since the Unix epoch, with sub-second precision.
    pub fn timestamp_secs(&self) -> f64 {
        self.taken_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    /// Resident memory rounded to two decimals for API responses.
    pub fn rounded_mb(&self) -> f64 {
        (self.resident_mb * 100.0).round() / 100.0
    }
}

/// Source of memory samples.
pub trait MemorySampler: Send + Sync + Debug {
    fn sample(&self) -> Result<MemorySample, MonitorError>;
}

/// Samples the resident memory of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl MemorySampler for ProcessMemory {
    fn sample(&self) -> Result<MemorySample, MonitorError> {
        let stats = memory_stats::memory_stats().ok_or(MonitorError::Unavailable)?;
        Ok(MemorySample::new(stats.physical_mem as f64 / BYTES_PER_MB))
    }
}
