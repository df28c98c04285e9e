//! A single outbound client handle.
//!
//! # Responsibilities
//! - Own one `reqwest::Client` and its connection pool
//! - Enforce the total connection limit with a semaphore
//! - Hand out leases that are released exactly once on drop
//! - Classify dispatch failures

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::config::{PoolConfig, TimeoutConfig};
use crate::observability::metrics;
use crate::upstream::request::OutboundRequest;

/// Errors raised while acquiring a slot on a client handle.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No slot became free within the pool-acquire timeout.
    #[error("connection pool exhausted after waiting {0:?}")]
    Exhausted(Duration),

    /// The handle's slot semaphore was closed.
    #[error("connection pool is closed")]
    Closed,

    /// No handle has been published yet, or it has been shut down.
    #[error("connection pool is not initialized")]
    NotInitialized,

    /// The underlying client could not be built.
    #[error("failed to build outbound client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Errors raised while dispatching an outbound request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The request was not answered within the overall dispatch deadline.
    #[error("upstream did not respond within {0:?}")]
    Deadline(Duration),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// One generation of the outbound connection pool.
#[derive(Debug)]
pub struct OutboundClient {
    generation: u64,
    client: reqwest::Client,
    slots: Arc<Semaphore>,
    max_connections: usize,
    pool_timeout: Duration,
    dispatch_deadline: Duration,
    closed: AtomicBool,
    created_at: Instant,
    // Flips to `true` when open responses must be cut off.
    abort: watch::Receiver<bool>,
}

impl OutboundClient {
    /// Build a new client handle from configuration.
    pub fn build(
        generation: u64,
        pool: &PoolConfig,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, PoolError> {
        let redirect = if pool.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(pool.max_keepalive_connections)
            .pool_idle_timeout(pool.keepalive_expiry())
            .connect_timeout(timeouts.connect())
            .read_timeout(timeouts.read())
            .redirect(redirect)
            .danger_accept_invalid_certs(!pool.verify_ssl);
        if !pool.trust_env_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self {
            generation,
            client,
            slots: Arc::new(Semaphore::new(pool.max_connections)),
            max_connections: pool.max_connections,
            pool_timeout: timeouts.pool(),
            // reqwest has no per-write timeout; the write budget bounds the
            // whole exchange up to the response head instead.
            dispatch_deadline: timeouts.connect() + timeouts.write() + timeouts.read(),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
            abort: watch::channel(false).1,
        })
    }

    /// Tie this handle's leases to an abort signal owned by its pool.
    pub fn with_abort(mut self, abort: watch::Receiver<bool>) -> Self {
        self.abort = abort;
        self
    }

    /// Monotonic generation number of this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of leases currently held.
    pub fn in_flight(&self) -> usize {
        self.max_connections
            .saturating_sub(self.slots.available_permits())
    }

    /// Configured connection limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Whether this handle has been retired.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Retire this handle. In-flight leases keep working; the underlying
    /// connections are freed when the last holder drops its `Arc`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(
                generation = self.generation,
                in_flight = self.in_flight(),
                age_secs = self.created_at.elapsed().as_secs(),
                "Outbound client closed"
            );
        }
    }

    /// Wait for a free slot, bounded by the pool-acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<Lease, PoolError> {
        let permit = tokio::time::timeout(self.pool_timeout, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Exhausted(self.pool_timeout))?
            .map_err(|_| PoolError::Closed)?;

        metrics::record_lease_acquired();
        Ok(Lease {
            client: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Send a request, returning the response head together with the lease
    /// that must be held until the body is finished.
    ///
    /// On error the lease is dropped before returning, so a failed attempt
    /// never holds a slot.
    pub async fn dispatch(
        self: &Arc<Self>,
        request: OutboundRequest,
    ) -> Result<(reqwest::Response, Lease), DispatchError> {
        let lease = self.acquire().await?;

        let builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        let builder = request.body.apply(builder);

        let response = tokio::time::timeout(self.dispatch_deadline, builder.send())
            .await
            .map_err(|_| DispatchError::Deadline(self.dispatch_deadline))??;

        Ok((response, lease))
    }
}

/// A held slot on an [`OutboundClient`].
///
/// Pins the handle it came from, so a hot swap never frees connections that
/// are still streaming.
#[derive(Debug)]
pub struct Lease {
    client: Arc<OutboundClient>,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    /// The handle this lease pins.
    pub fn client(&self) -> &Arc<OutboundClient> {
        &self.client
    }

    /// Resolves once the owning pool aborts in-flight responses.
    /// Never resolves for a handle without a pool.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut abort = self.client.abort.clone();
        async move {
            if abort.wait_for(|aborted| *aborted).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        metrics::record_lease_released();
        tracing::trace!(generation = self.client.generation, "Upstream lease released");
    }
}
