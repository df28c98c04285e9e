//! Periodic memory-pressure monitor.
//!
//! # Responsibilities
//! - Sample resident memory on a fixed interval
//! - Escalate: nothing → reclaim → reclaim + pool replacement
//! - Serve on-demand cleanups for the admin endpoint

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::MemoryConfig;
use crate::memory::reclaim::release_free_memory;
use crate::memory::sampler::{MemorySample, MemorySampler, ProcessMemory};
use crate::memory::MonitorError;
use crate::observability::metrics;
use crate::upstream::ClientPool;

/// Memory pressure level for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    /// At or below the cleanup threshold.
    Normal,
    /// Above the cleanup threshold.
    Elevated,
    /// Above the maximum allowed usage.
    Critical,
}

impl Pressure {
    pub fn classify(resident_mb: f64, config: &MemoryConfig) -> Self {
        if resident_mb > config.max_memory_mb as f64 {
            Pressure::Critical
        } else if resident_mb > config.cleanup_threshold_mb as f64 {
            Pressure::Elevated
        } else {
            Pressure::Normal
        }
    }
}

/// Outcome of a full cleanup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanupReport {
    pub before: MemorySample,
    pub after: MemorySample,
    /// Whether the allocator released any pages.
    pub released: bool,
    /// Whether the outbound pool was replaced.
    pub pool_replaced: bool,
}

pub struct MemoryMonitor {
    pool: Arc<ClientPool>,
    config: MemoryConfig,
    sampler: Arc<dyn MemorySampler>,
    // Serializes cleanups so the timer and the admin endpoint never both
    // replace the pool for the same spike.
    cleanup_lock: Mutex<()>,
}

impl MemoryMonitor {
    pub fn new(pool: Arc<ClientPool>, config: MemoryConfig) -> Self {
        Self::with_sampler(pool, config, Arc::new(ProcessMemory))
    }

    pub fn with_sampler(
        pool: Arc<ClientPool>,
        config: MemoryConfig,
        sampler: Arc<dyn MemorySampler>,
    ) -> Self {
        Self {
            pool,
            config,
            sampler,
            cleanup_lock: Mutex::new(()),
        }
    }

    /// Take a sample and publish it as a metric.
    pub fn sample(&self) -> Result<MemorySample, MonitorError> {
        let sample = self.sampler.sample()?;
        metrics::record_memory_usage(sample.resident_mb);
        Ok(sample)
    }

    /// Run the loop until the shutdown signal fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = self.config.check_interval();
        tracing::info!(
            interval_secs = period.as_secs(),
            max_memory_mb = self.config.max_memory_mb,
            cleanup_threshold_mb = self.config.cleanup_threshold_mb,
            "Memory monitor starting"
        );

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check().await {
                        tracing::error!(error = %e, "Memory check failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Memory monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One monitor iteration: sample, classify, act.
    pub async fn check(&self) -> Result<Pressure, MonitorError> {
        let sample = self.sample()?;
        let pressure = Pressure::classify(sample.resident_mb, &self.config);

        match pressure {
            Pressure::Critical => {
                tracing::warn!(
                    memory_mb = sample.resident_mb,
                    max_memory_mb = self.config.max_memory_mb,
                    "Memory usage too high, running cleanup"
                );
                self.cleanup_from(sample).await?;
            }
            Pressure::Elevated => {
                tracing::info!(
                    memory_mb = sample.resident_mb,
                    cleanup_threshold_mb = self.config.cleanup_threshold_mb,
                    "Memory usage near threshold, reclaiming free memory"
                );
                let released = release_free_memory();
                metrics::record_cleanup("light");
                tracing::debug!(released, "Light reclaim finished");
            }
            Pressure::Normal => {
                tracing::debug!(memory_mb = sample.resident_mb, "Memory usage normal");
            }
        }

        Ok(pressure)
    }

    /// Full cleanup on demand.
    pub async fn cleanup(&self) -> Result<CleanupReport, MonitorError> {
        let before = self.sample()?;
        self.cleanup_from(before).await
    }

    async fn cleanup_from(&self, before: MemorySample) -> Result<CleanupReport, MonitorError> {
        let _guard = self.cleanup_lock.lock().await;

        let released = release_free_memory();
        metrics::record_cleanup("full");
        let after = self.sample()?;

        let pool_replaced = after.resident_mb > self.config.cleanup_threshold_mb as f64;
        if pool_replaced {
            self.pool.replace()?;
            tracing::info!(
                memory_mb = after.resident_mb,
                "Outbound client replaced to release pooled connections"
            );
        }

        tracing::info!(
            before_mb = before.resident_mb,
            after_mb = after.resident_mb,
            released,
            pool_replaced,
            "Memory cleanup finished"
        );

        Ok(CleanupReport {
            before,
            after,
            released,
            pool_replaced,
        })
    }
}
