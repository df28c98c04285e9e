//! Request handling and transformation.
//!
//! # Responsibilities
//! - Derive the target URL from the inbound path
//! - Classify {method × content type} into a body plan
//! - Read the inbound body once and re-encode it for the target
//! - Scrub headers that the outbound transport must recompute
//!
//! # Design Decisions
//! - Classification is a pure function; rejected requests never touch the body
//! - The body is fully read before dispatch, bounded by `max_body_size`
//! - Re-encoded bodies drop the inbound `content-type` so the encoder sets it

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
};

use crate::config::ForwardingConfig;
use crate::http::error::ProxyError;
use crate::upstream::{FilePart, MultipartPayload, OutboundBody, OutboundRequest};

/// Path prefix under which targets are embedded.
pub const PROXY_PREFIX: &str = "/proxy/";

/// Headers never forwarded to the target.
///
/// `host` and `content-length` are recomputed by the outbound transport.
/// `accept-encoding` is replaced by the encodings the client can decode,
/// which keeps stripping `content-encoding` from relayed responses correct.
const SCRUBBED_REQUEST_HEADERS: [HeaderName; 10] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::ACCEPT_ENCODING,
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
];

/// How the inbound body is carried to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPlan {
    /// No body; query string forwarded.
    Query,
    /// No body and no query.
    Bare,
    /// Raw bytes under the inbound content type.
    Raw,
    Json,
    Form,
    Multipart,
}

impl BodyPlan {
    /// Whether the outbound encoder chooses its own content type.
    pub fn reencodes(self) -> bool {
        matches!(self, BodyPlan::Json | BodyPlan::Form | BodyPlan::Multipart)
    }
}

/// Derive the target URL from the literal path remainder.
pub fn derive_target(remainder: &str) -> String {
    if remainder.starts_with("http://") || remainder.starts_with("https://") {
        remainder.to_string()
    } else {
        format!("http://{}", remainder)
    }
}

/// Media type essence of a `content-type` value, lowercased, parameters dropped.
pub fn content_type_essence(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Decide how a request is forwarded, or reject it.
pub fn classify(method: &Method, content_type: &str) -> Result<BodyPlan, ProxyError> {
    match *method {
        Method::GET => Ok(BodyPlan::Query),
        Method::DELETE => Ok(BodyPlan::Bare),
        Method::POST | Method::PUT => match content_type {
            "application/json" => Ok(BodyPlan::Json),
            "application/x-www-form-urlencoded" => Ok(BodyPlan::Form),
            "multipart/form-data" => Ok(BodyPlan::Multipart),
            _ if *method == Method::PUT => Ok(BodyPlan::Raw),
            "" | "text/plain" => Ok(BodyPlan::Raw),
            other => Err(ProxyError::UnsupportedContentType(other.to_string())),
        },
        _ => Err(ProxyError::MethodNotAllowed(method.clone())),
    }
}

/// Copy inbound headers minus everything the target must not see.
pub fn scrub_request_headers(headers: &HeaderMap, drop_content_type: bool) -> HeaderMap {
    // Headers named in `Connection` are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut scrubbed = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if SCRUBBED_REQUEST_HEADERS.contains(name) || listed.contains(name) {
            continue;
        }
        if drop_content_type && name == header::CONTENT_TYPE {
            continue;
        }
        scrubbed.append(name.clone(), value.clone());
    }
    scrubbed
}

/// Reject targets outside the allowlist. An empty list allows everything.
pub fn check_allowed_host(target: &str, allowed: &[String]) -> Result<(), ProxyError> {
    if allowed.is_empty() {
        return Ok(());
    }

    let host = url::Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .ok_or_else(|| ProxyError::HostNotAllowed(target.to_string()))?;

    if allowed.iter().any(|h| h == "*" || h.eq_ignore_ascii_case(&host)) {
        Ok(())
    } else {
        Err(ProxyError::HostNotAllowed(host))
    }
}

/// Turn an inbound `/proxy/...` request into an outbound request.
pub async fn build_outbound(
    request: Request,
    config: &ForwardingConfig,
) -> Result<OutboundRequest, ProxyError> {
    let remainder = request
        .uri()
        .path()
        .strip_prefix(PROXY_PREFIX)
        .unwrap_or_default();
    let mut url = derive_target(remainder);
    check_allowed_host(&url, &config.allowed_hosts)?;

    let method = request.method().clone();
    let content_type = content_type_essence(request.headers());
    let plan = classify(&method, &content_type)?;

    if plan == BodyPlan::Query {
        if let Some(query) = request.uri().query().filter(|q| !q.is_empty()) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(query);
        }
    }

    let headers = scrub_request_headers(request.headers(), plan.reencodes());
    let limit = config.max_body_size;

    let body = match plan {
        BodyPlan::Query | BodyPlan::Bare => OutboundBody::Empty,
        BodyPlan::Raw => {
            let bytes = read_body(request, limit).await?;
            if bytes.is_empty() {
                OutboundBody::Empty
            } else {
                OutboundBody::Raw(bytes)
            }
        }
        BodyPlan::Json => {
            let bytes = read_body(request, limit).await?;
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| ProxyError::MalformedBody(format!("invalid JSON: {}", e)))?;
            OutboundBody::Json(value)
        }
        BodyPlan::Form => {
            let bytes = read_body(request, limit).await?;
            OutboundBody::Form(parse_form(&bytes))
        }
        BodyPlan::Multipart => OutboundBody::Multipart(read_multipart(request, limit).await?),
    };

    Ok(OutboundRequest {
        method,
        url,
        headers,
        body,
    })
}

async fn read_body(request: Request, limit: usize) -> Result<Bytes, ProxyError> {
    Bytes::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::PayloadTooLarge(limit)
        } else {
            ProxyError::MalformedBody(rejection.body_text())
        }
    })
}

/// Flat field map: the last value for a key wins, first-seen order is kept.
fn parse_form(bytes: &[u8]) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(bytes).into_owned() {
        upsert_field(&mut fields, key, value);
    }
    fields
}

fn upsert_field(fields: &mut Vec<(String, String)>, key: String, value: String) {
    match fields.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => fields.push((key, value)),
    }
}

async fn read_multipart(request: Request, limit: usize) -> Result<MultipartPayload, ProxyError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| ProxyError::MalformedBody(rejection.body_text()))?;

    let mut payload = MultipartPayload::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e, limit)),
        };

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        match file_name {
            Some(file_name) => {
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                payload.files.push(FilePart {
                    field: name,
                    file_name,
                    content_type,
                    data,
                });
            }
            None => {
                let value = field.text().await.map_err(|e| multipart_error(e, limit))?;
                upsert_field(&mut payload.fields, name, value);
            }
        }
    }

    Ok(payload)
}

fn multipart_error(err: axum::extract::multipart::MultipartError, limit: usize) -> ProxyError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge(limit)
    } else {
        ProxyError::MalformedBody(err.body_text())
    }
}
