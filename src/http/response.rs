//! Response handling and transformation.
//!
//! # Responsibilities
//! - Copy the target's status and headers to the caller
//! - Stream the target body back in bounded chunks
//! - Release the outbound lease exactly once, however the stream ends
//! - Cut the stream short when the pool aborts in-flight responses
//!
//! # Design Decisions
//! - The body is never buffered; a chunk is handed on as soon as it arrives
//! - `content-encoding` is dropped because the outbound client already decoded
//! - Hop-by-hop headers stripped automatically
//! - Failures after the head is sent end the stream; the status is not rewritten

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use futures_util::Stream;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use crate::upstream::Lease;

/// Response headers never relayed to the caller.
const SCRUBBED_RESPONSE_HEADERS: [HeaderName; 7] = [
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
    HeaderName::from_static("keep-alive"),
];

/// Body stream of a target response.
pub type UpstreamBody = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Copy target headers minus encoding and hop-by-hop headers.
pub fn sanitize_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut sanitized = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !SCRUBBED_RESPONSE_HEADERS.contains(name) {
            sanitized.append(name.clone(), value.clone());
        }
    }
    if !sanitized.contains_key(header::CONTENT_TYPE) {
        sanitized.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    sanitized
}

/// Build the caller's response from a target response.
///
/// The lease travels with the body and is released when the body ends,
/// fails, or the caller goes away.
pub fn relay(upstream: reqwest::Response, lease: Lease, chunk_size: usize, target: &str) -> Response {
    let status = upstream.status();
    let headers = sanitize_response_headers(upstream.headers());
    let body: UpstreamBody = Box::pin(upstream.bytes_stream());

    let stream = RelayStream::new(body, lease, chunk_size, target);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Streams a target body in chunks of at most `chunk_size` bytes while
/// holding the outbound lease.
pub struct RelayStream<S> {
    upstream: Option<S>,
    lease: Option<Lease>,
    pending: Bytes,
    chunk_size: usize,
    relayed: u64,
    target: String,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl<S> RelayStream<S> {
    pub fn new(upstream: S, lease: Lease, chunk_size: usize, target: &str) -> Self {
        Self {
            upstream: Some(upstream),
            cancelled: Box::pin(lease.cancelled()),
            lease: Some(lease),
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            relayed: 0,
            target: target.to_string(),
        }
    }

    /// Bytes handed to the caller so far.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    fn release(&mut self, outcome: &'static str) {
        self.upstream = None;
        if let Some(lease) = self.lease.take() {
            tracing::debug!(
                target_url = %self.target,
                generation = lease.client().generation(),
                bytes = self.relayed,
                outcome,
                "Upstream response released"
            );
        }
    }

    fn next_chunk(&mut self) -> Bytes {
        let take = self.pending.len().min(self.chunk_size);
        let chunk = self.pending.split_to(take);
        self.relayed += chunk.len() as u64;
        chunk
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Bytes, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if this.lease.is_some() && this.cancelled.as_mut().poll(cx).is_ready() {
                tracing::warn!(
                    target_url = %this.target,
                    bytes = this.relayed,
                    "Upstream response cut off by shutdown"
                );
                this.pending = Bytes::new();
                this.release("cancelled");
                return Poll::Ready(Some(Err(io::Error::other("proxy shutting down"))));
            }

            if !this.pending.is_empty() {
                return Poll::Ready(Some(Ok(this.next_chunk())));
            }

            let Some(upstream) = this.upstream.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(Pin::new(upstream).poll_next(cx)) {
                Some(Ok(bytes)) => this.pending = bytes,
                Some(Err(e)) => {
                    tracing::error!(
                        target_url = %this.target,
                        bytes = this.relayed,
                        error = %e,
                        "Upstream stream failed"
                    );
                    this.release("error");
                    return Poll::Ready(Some(Err(io::Error::other(e.to_string()))));
                }
                None => this.release("complete"),
            }
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        if self.lease.is_some() {
            self.release("aborted");
        }
    }
}
