//! Shared outbound client pool with hot swap.
//!
//! # Responsibilities
//! - Publish the current [`OutboundClient`] handle to all requests
//! - Replace the handle atomically without disturbing pinned requests
//! - Tear the handle down at shutdown, draining in-flight leases
//! - Cut off open responses on every generation when the drain runs out of time

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::{PoolConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::upstream::client::{OutboundClient, PoolError};

/// Owner of the current outbound client handle.
///
/// Readers call [`ClientPool::current`] once per request and keep the returned
/// `Arc` for the rest of that request.
#[derive(Debug)]
pub struct ClientPool {
    pool: PoolConfig,
    timeouts: TimeoutConfig,
    current: ArcSwapOption<OutboundClient>,
    next_generation: AtomicU64,
    // Shared by every handle this pool has built, retired ones included.
    abort: watch::Sender<bool>,
}

impl ClientPool {
    /// Create an empty pool. Call [`ClientPool::create`] before serving.
    pub fn new(pool: PoolConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            pool,
            timeouts,
            current: ArcSwapOption::empty(),
            next_generation: AtomicU64::new(1),
            abort: watch::channel(false).0,
        }
    }

    /// Build the first handle and publish it.
    pub fn create(&self) -> Result<Arc<OutboundClient>, PoolError> {
        let client = self.build()?;
        if let Some(previous) = self.current.swap(Some(client.clone())) {
            previous.close();
        }

        if !self.pool.verify_ssl {
            tracing::warn!("Upstream TLS certificate verification is disabled");
        }
        tracing::info!(
            generation = client.generation(),
            max_connections = self.pool.max_connections,
            max_keepalive_connections = self.pool.max_keepalive_connections,
            "Outbound client pool created"
        );
        Ok(client)
    }

    /// The currently published handle, if any.
    pub fn current(&self) -> Option<Arc<OutboundClient>> {
        self.current.load_full()
    }

    /// Build a fresh handle, publish it, then retire the previous one.
    ///
    /// New requests see the new handle as soon as this returns; requests that
    /// already pinned the old handle finish on it.
    pub fn replace(&self) -> Result<Arc<OutboundClient>, PoolError> {
        let client = self.build()?;
        let previous = self.current.swap(Some(client.clone()));

        match &previous {
            Some(old) => {
                tracing::info!(
                    old_generation = old.generation(),
                    new_generation = client.generation(),
                    pinned = old.in_flight(),
                    "Outbound client replaced"
                );
                old.close();
            }
            None => tracing::info!(generation = client.generation(), "Outbound client created"),
        }

        metrics::record_pool_replacement();
        Ok(client)
    }

    /// Unpublish and close the handle, then wait for its leases to drain.
    ///
    /// Returns `true` if every lease was released within the grace period.
    pub async fn shutdown(&self) -> bool {
        let Some(client) = self.current.swap(None) else {
            return true;
        };
        client.close();

        let grace = self.timeouts.shutdown_grace();
        let drained = wait_for_drain(&client, grace).await;
        if drained {
            tracing::info!(generation = client.generation(), "Outbound client pool shut down");
        } else {
            tracing::warn!(
                generation = client.generation(),
                in_flight = client.in_flight(),
                grace_secs = grace.as_secs_f64(),
                "Outbound client pool shut down with leases still held"
            );
        }
        drained
    }

    /// End every open response relayed through any generation of this pool.
    ///
    /// Their leases are released as the relay streams notice. Irreversible.
    pub fn abort_in_flight(&self) {
        if !self.abort.send_replace(true) {
            let in_flight = self.current().map(|c| c.in_flight()).unwrap_or(0);
            tracing::warn!(in_flight, "Aborting in-flight upstream responses");
        }
    }

    /// Whether [`ClientPool::abort_in_flight`] has been called.
    pub fn is_aborted(&self) -> bool {
        *self.abort.borrow()
    }

    fn build(&self) -> Result<Arc<OutboundClient>, PoolError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let client = OutboundClient::build(generation, &self.pool, &self.timeouts)?
            .with_abort(self.abort.subscribe());
        Ok(Arc::new(client))
    }
}

async fn wait_for_drain(client: &OutboundClient, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    while client.in_flight() > 0 {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ClientPool {
        let timeouts = TimeoutConfig {
            shutdown_grace_secs: 0.2,
            ..TimeoutConfig::default()
        };
        ClientPool::new(PoolConfig::default(), timeouts)
    }

    #[test]
    fn empty_until_created() {
        let pool = pool();
        assert!(pool.current().is_none());

        let client = pool.create().unwrap();
        let current = pool.current().unwrap();
        assert!(Arc::ptr_eq(&client, &current));
    }

    #[tokio::test]
    async fn replace_publishes_new_identity_and_keeps_old_lease() {
        let pool = pool();
        let first = pool.create().unwrap();
        let lease = first.acquire().await.unwrap();

        let second = pool.replace().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.generation() > first.generation());
        assert!(first.is_closed());
        assert!(!second.is_closed());

        let current = pool.current().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert_eq!(first.in_flight(), 1);
        assert_eq!(second.in_flight(), 0);

        drop(lease);
        assert_eq!(first.in_flight(), 0);
    }

    #[tokio::test]
    async fn shutdown_unpublishes_and_drains() {
        let pool = pool();
        let client = pool.create().unwrap();
        let lease = client.acquire().await.unwrap();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            drop(lease);
        });

        assert!(pool.shutdown().await);
        assert!(pool.current().is_none());
        assert!(client.is_closed());
        release.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_reports_stuck_leases() {
        let pool = pool();
        let client = pool.create().unwrap();
        let _stuck = client.acquire().await.unwrap();

        assert!(!pool.shutdown().await);
    }

    #[tokio::test]
    async fn abort_reaches_current_and_retired_leases() {
        let pool = pool();
        let first = pool.create().unwrap();
        let old_lease = first.acquire().await.unwrap();
        let second = pool.replace().unwrap();
        let new_lease = second.acquire().await.unwrap();

        let old_cancelled = tokio::spawn(old_lease.cancelled());
        let new_cancelled = tokio::spawn(new_lease.cancelled());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!old_cancelled.is_finished());
        assert!(!pool.is_aborted());

        pool.abort_in_flight();
        assert!(pool.is_aborted());
        tokio::time::timeout(Duration::from_secs(1), old_cancelled)
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), new_cancelled)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_without_handle_is_noop() {
        assert!(pool().shutdown().await);
    }
}
