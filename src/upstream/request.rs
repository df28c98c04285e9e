//! Outbound request model.
//!
//! An [`OutboundRequest`] is fully materialized before dispatch: the inbound
//! body has already been read and classified, so the pool never touches the
//! inbound stream.

use axum::http::{HeaderMap, Method};
use bytes::Bytes;

/// A request ready to be sent through an outbound client.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: OutboundBody,
}

/// Body of an outbound request, already encoded or ready to be encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    /// No body at all.
    Empty,
    /// Bytes forwarded verbatim under the inbound content type.
    Raw(Bytes),
    /// A parsed JSON document, re-serialized on the way out.
    Json(serde_json::Value),
    /// Flat URL-encoded fields.
    Form(Vec<(String, String)>),
    /// Multipart fields and files.
    Multipart(MultipartPayload),
}

/// Parsed `multipart/form-data` content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

/// A single uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl OutboundBody {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundBody::Empty => "empty",
            OutboundBody::Raw(_) => "raw",
            OutboundBody::Json(_) => "json",
            OutboundBody::Form(_) => "form",
            OutboundBody::Multipart(_) => "multipart",
        }
    }

    /// Convert into a reqwest builder body.
    pub(crate) fn apply(self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            OutboundBody::Empty => builder,
            OutboundBody::Raw(bytes) => builder.body(bytes),
            OutboundBody::Json(value) => builder.json(&value),
            OutboundBody::Form(fields) => builder.form(&fields),
            OutboundBody::Multipart(payload) => builder.multipart(payload.into_form()),
        }
    }
}

impl MultipartPayload {
    fn into_form(self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let bare = || {
                reqwest::multipart::Part::bytes(file.data.to_vec()).file_name(file.file_name.clone())
            };
            let part = match file.content_type.as_deref().map(|mime| bare().mime_str(mime)) {
                Some(Ok(part)) => part,
                Some(Err(e)) => {
                    tracing::debug!(field = %file.field, error = %e, "Ignoring unparsable part content type");
                    bare()
                }
                None => bare(),
            };
            form = form.part(file.field, part);
        }
        form
    }
}
