//! Per-request context: typed headers, body access, and the response buffer.
//!
//! A [`RequestContext`] is built once at the pipeline entry and threaded
//! through every stage. Stages either write a response and short-circuit, or
//! call [`RequestContext::next`]. The response buffer enforces the
//! write-exactly-once rule; the typed header views replace the reflection
//! the original service used.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use durable_mcp_core::{AccessConditions, ServiceError};

use crate::pipeline::{ServerError, ServerResult, Stage};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Format a timestamp as an RFC 1123 HTTP date.
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an RFC 1123 HTTP date.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Typed view of the recognised request headers.
#[derive(Debug, Clone, Default)]
pub struct RequestHeaders {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_encoding: Option<String>,
    pub accept: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
    pub date: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestHeaders {
    pub fn parse(headers: &HeaderMap) -> Self {
        let text = |name: header::HeaderName| {
            headers
                .get(&name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            content_type: text(header::CONTENT_TYPE),
            content_length: headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            content_encoding: text(header::CONTENT_ENCODING),
            accept: text(header::ACCEPT),
            if_match: text(header::IF_MATCH),
            if_none_match: text(header::IF_NONE_MATCH),
            if_modified_since: text(header::IF_MODIFIED_SINCE)
                .as_deref()
                .and_then(parse_http_date),
            if_unmodified_since: text(header::IF_UNMODIFIED_SINCE)
                .as_deref()
                .and_then(parse_http_date),
            date: text(header::DATE),
            authorization: text(header::AUTHORIZATION),
            user_agent: text(header::USER_AGENT),
        }
    }

    /// ETag conditions for a store call, as supplied by the client.
    pub fn access_conditions(&self) -> AccessConditions {
        AccessConditions {
            if_match: self.if_match.clone(),
            if_none_match: self.if_none_match.clone(),
        }
    }

    /// Whether any conditional header is present.
    pub fn has_preconditions(&self) -> bool {
        self.if_match.is_some()
            || self.if_none_match.is_some()
            || self.if_modified_since.is_some()
            || self.if_unmodified_since.is_some()
    }
}

/// Headers a handler attaches to a successful response.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub retry_after: Option<u32>,
}

impl ResponseHeaders {
    pub fn for_resource(etag: &str, last_modified: DateTime<Utc>) -> Self {
        Self {
            etag: Some(etag.to_string()),
            last_modified: Some(last_modified),
            retry_after: None,
        }
    }
}

/// Static per-route header constraints, enforced before the handler runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderSpec {
    /// Bodies above this size are rejected with 413; a body without a
    /// Content-Length is rejected with 411.
    pub max_content_length: Option<u64>,
    /// Accepted Content-Type values (media type only) ⇒ 415 otherwise.
    pub allowed_content_types: Option<&'static [&'static str]>,
    /// Accepted Content-Encoding values ⇒ 415 otherwise.
    pub allowed_content_encodings: Option<&'static [&'static str]>,
    /// Accepted Accept values ⇒ 406 otherwise.
    pub allowed_accept: Option<&'static [&'static str]>,
    /// Require an If-Match header ⇒ 428 otherwise.
    pub precondition_required: bool,
}

impl HeaderSpec {
    /// Constraints for JSON-bodied write routes.
    pub fn json_body(max_content_length: u64) -> Self {
        Self {
            max_content_length: Some(max_content_length),
            allowed_content_types: Some(&["application/json"]),
            allowed_content_encodings: Some(&["identity"]),
            allowed_accept: Some(&["application/json", "*/*"]),
            precondition_required: false,
        }
    }

    /// Constraints for bodyless read routes.
    pub fn read_only() -> Self {
        Self {
            max_content_length: None,
            allowed_content_types: None,
            allowed_content_encodings: None,
            allowed_accept: Some(&["application/json", "*/*"]),
            precondition_required: false,
        }
    }
}

/// The buffered response. Written exactly once.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<u16>,
    headers: Vec<(&'static str, String)>,
    body: Option<Bytes>,
}

impl ResponseBuffer {
    pub fn is_written(&self) -> bool {
        self.status.is_some()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Attach a header to the eventual response, before or after the write.
    pub fn insert_header(&mut self, name: &'static str, value: String) {
        self.headers.push((name, value));
    }

    pub(crate) fn write(&mut self, status: u16, body: Option<Bytes>) {
        self.status = Some(status);
        self.body = body;
    }

    /// Render into an axum response.
    pub fn into_response(self) -> Response<Body> {
        let status =
            StatusCode::from_u16(self.status.unwrap_or(500)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = Response::builder().status(status);
        for (name, value) in &self.headers {
            if let Ok(value) = HeaderValue::from_str(value) {
                builder = builder.header(*name, value);
            }
        }
        let body = match self.body {
            Some(bytes) => Body::from(bytes),
            None => Body::empty(),
        };
        builder.body(body).unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("empty response")
        })
    }

    /// A bare 500 used when the pipeline itself fails (panic, deadline).
    pub fn internal_error() -> Self {
        let mut buffer = Self::default();
        buffer.insert_header(
            "x-ms-error-code",
            durable_mcp_core::error::error_codes::INTERNAL_SERVER_ERROR.to_string(),
        );
        buffer.write(500, None);
        buffer
    }
}

/// Everything a stage needs about the in-flight request.
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    /// Path with any `:action` suffix expanded for matching
    pub path: String,
    /// Path exactly as the client sent it
    pub original_path: String,
    pub query: HashMap<String, String>,
    pub headers: RequestHeaders,
    pub body: Bytes,
    /// Captures from the matched route pattern
    pub path_vars: HashMap<String, String>,
    /// Resolved by the dispatch stage
    pub api_version: String,
    /// Resolved by the authorization stage
    pub tenant: String,
    pub response: ResponseBuffer,
    pub cancel: CancellationToken,
    stages: Vec<Arc<dyn Stage>>,
    next_stage: usize,
}

impl RequestContext {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: &HeaderMap,
        body: Bytes,
        stages: Vec<Arc<dyn Stage>>,
        cancel: CancellationToken,
    ) -> Self {
        let original_path = uri.path().to_string();
        let path = normalize_action_path(&original_path);
        let query = parse_query(uri.query().unwrap_or(""));
        Self {
            method,
            path,
            original_path,
            query,
            headers: RequestHeaders::parse(headers),
            body,
            path_vars: HashMap::new(),
            api_version: String::new(),
            tenant: String::new(),
            response: ResponseBuffer::default(),
            cancel,
            stages,
            next_stage: 0,
            uri,
        }
    }

    /// Invoke the next stage in the chain; a no-op past the last stage.
    pub async fn next(&mut self) -> ServerResult<()> {
        if self.next_stage >= self.stages.len() {
            return Ok(());
        }
        let stage = self.stages[self.next_stage].clone();
        self.next_stage += 1;
        stage.call(self).await
    }

    /// Write the error body and `x-ms-error-code` header for `err`, then
    /// return the typed failure the pipeline treats as already-written.
    pub fn error(&mut self, err: &ServiceError, target: Option<String>) -> ServerError {
        let status = err.status();
        if self.response.is_written() {
            warn!("response already written, dropping error {}", err.code());
            return ServerError::Responded { status };
        }
        self.response
            .insert_header("x-ms-error-code", err.code().to_string());
        let body = serde_json::to_vec(&err.body(target)).unwrap_or_default();
        self.response
            .insert_header("content-type", "application/json".to_string());
        self.response
            .insert_header("content-length", body.len().to_string());
        self.response.write(status, Some(Bytes::from(body)));
        ServerError::Responded { status }
    }

    /// JSON-decode the request body; a syntax error is a 400.
    pub fn unmarshal_body<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_slice(&self.body).map_err(|err| ServiceError::InvalidJson(err.to_string()))
    }

    /// Reject unknown query parameters with a 400.
    pub fn validate_query(&self, allowed: &[&str]) -> Result<(), ServiceError> {
        for key in self.query.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(ServiceError::BadRequest(format!(
                    "unknown query parameter: {key}"
                )));
            }
        }
        Ok(())
    }

    /// Serialise headers and body, write status, exactly once.
    pub fn write_response<T: Serialize>(
        &mut self,
        status: u16,
        headers: ResponseHeaders,
        body: Option<&T>,
    ) -> ServerResult<()> {
        if self.response.is_written() {
            return Err(ServerError::Internal(
                "response body written twice".to_string(),
            ));
        }
        if let Some(etag) = &headers.etag {
            self.response.insert_header("etag", format!("\"{etag}\""));
        }
        if let Some(last_modified) = headers.last_modified {
            self.response
                .insert_header("last-modified", format_http_date(last_modified));
        }
        if let Some(retry_after) = headers.retry_after {
            self.response
                .insert_header("retry-after", retry_after.to_string());
        }
        let body = match body {
            Some(value) => {
                let bytes = serde_json::to_vec(value)
                    .map_err(|err| ServerError::Internal(format!("serialize response: {err}")))?;
                self.response
                    .insert_header("content-type", "application/json".to_string());
                self.response
                    .insert_header("content-length", bytes.len().to_string());
                Some(Bytes::from(bytes))
            }
            None => None,
        };
        self.response.write(status, body);
        Ok(())
    }

    /// 304 Not Modified with the matching ETag and no body.
    pub fn write_not_modified(&mut self, etag: &str) -> ServerError {
        if !self.response.is_written() {
            self.response.insert_header("etag", format!("\"{etag}\""));
            self.response.write(304, None);
        }
        ServerError::Responded { status: 304 }
    }

    /// Enforce a route's static header constraints.
    pub fn validate_header(&mut self, spec: &HeaderSpec) -> ServerResult<()> {
        if let Some(max) = spec.max_content_length {
            if !self.body.is_empty() && self.headers.content_length.is_none() {
                return Err(self.error(&ServiceError::LengthRequired, None));
            }
            let length = self.headers.content_length.unwrap_or(0).max(self.body.len() as u64);
            if length > max {
                return Err(self.error(&ServiceError::PayloadTooLarge, None));
            }
        }
        if let Some(allowed) = spec.allowed_content_types {
            if !self.body.is_empty() {
                let media_type = self
                    .headers
                    .content_type
                    .as_deref()
                    .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
                    .unwrap_or_default();
                if !allowed.contains(&media_type.as_str()) {
                    return Err(self.error(
                        &ServiceError::UnsupportedMediaType(media_type),
                        None,
                    ));
                }
            }
        }
        if let Some(allowed) = spec.allowed_content_encodings {
            if let Some(encoding) = &self.headers.content_encoding {
                let encoding = encoding.trim().to_ascii_lowercase();
                if !allowed.contains(&encoding.as_str()) {
                    return Err(self.error(&ServiceError::UnsupportedMediaType(encoding), None));
                }
            }
        }
        if let Some(allowed) = spec.allowed_accept {
            if let Some(accept) = self.headers.accept.clone() {
                let acceptable = accept
                    .split(',')
                    .map(|part| part.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
                    .any(|media| media == "*/*" || allowed.contains(&media.as_str()));
                if !acceptable {
                    return Err(self.error(&ServiceError::NotAcceptable(accept), None));
                }
            }
        }
        if spec.precondition_required && self.headers.if_match.is_none() {
            return Err(self.error(&ServiceError::PreconditionRequired, None));
        }
        Ok(())
    }

    /// RFC 7232 precondition evaluation against the loaded resource, in the
    /// required order: If-Match → If-None-Match → If-Modified-Since /
    /// If-Unmodified-Since.
    pub fn validate_preconditions(
        &mut self,
        etag: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> ServerResult<()> {
        let safe = self.method == Method::GET || self.method == Method::HEAD;

        if self.headers.if_match.is_some() || self.headers.if_none_match.is_some() {
            if etag.is_none() {
                return Err(self.error(
                    &ServiceError::BadRequest(
                        "resource does not support entity-tag conditions".to_string(),
                    ),
                    None,
                ));
            }
        }
        if (self.headers.if_modified_since.is_some() || self.headers.if_unmodified_since.is_some())
            && last_modified.is_none()
        {
            return Err(self.error(
                &ServiceError::BadRequest(
                    "resource does not support modification-time conditions".to_string(),
                ),
                None,
            ));
        }

        if let (Some(if_match), Some(etag)) = (self.headers.if_match.clone(), etag) {
            if !durable_mcp_core::etag_matches(&if_match, etag) {
                return Err(self.error(&ServiceError::PreconditionFailed, None));
            }
        } else if let (Some(ius), Some(last_modified)) =
            (self.headers.if_unmodified_since, last_modified)
        {
            if last_modified.timestamp() > ius.timestamp() {
                return Err(self.error(&ServiceError::PreconditionFailed, None));
            }
        }

        if let (Some(if_none_match), Some(etag)) = (self.headers.if_none_match.clone(), etag) {
            if durable_mcp_core::etag_matches(&if_none_match, etag) {
                return if safe {
                    Err(self.write_not_modified(etag))
                } else {
                    Err(self.error(&ServiceError::PreconditionFailed, None))
                };
            }
        } else if let (Some(ims), Some(last_modified)) =
            (self.headers.if_modified_since, last_modified)
        {
            if safe && last_modified.timestamp() <= ims.timestamp() {
                let etag = etag.unwrap_or_default().to_string();
                return Err(self.write_not_modified(&etag));
            }
        }

        Ok(())
    }
}

/// Expand an action-suffixed final segment (`…/{id}:advance`) into a path
/// segment (`…/{id}/advance`) so one pattern grammar matches both forms.
pub fn normalize_action_path(path: &str) -> String {
    if let Some((head, last)) = path.rsplit_once('/') {
        if let Some((id, action)) = last.split_once(':') {
            if !id.is_empty() && !action.is_empty() {
                return format!("{head}/{id}/{action}");
            }
        }
    }
    path.to_string()
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), decode_component(value)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    let mut out = String::with_capacity(raw.len());
    let mut bytes = raw.bytes();
    let mut decoded = Vec::new();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next();
            let lo = bytes.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                let hex = [hi, lo];
                if let Ok(hex) = std::str::from_utf8(&hex) {
                    if let Ok(value) = u8::from_str_radix(hex, 16) {
                        decoded.push(value);
                        continue;
                    }
                }
            }
            decoded.push(b);
        } else {
            decoded.push(b);
        }
    }
    out.push_str(&String::from_utf8_lossy(&decoded));
    out
}
