//! Error taxonomy for the tool-call service.
//!
//! Every client-visible failure carries a stable string code (mirrored into
//! the `x-ms-error-code` response header) and an HTTP status. The wire body
//! is always `{"error":{"code":…,"message":…,"target":…}}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ServiceResult is the canonical result type for tool-call operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Wire error codes, as they appear in bodies and `x-ms-error-code`.
pub mod error_codes {
    pub const BAD_REQUEST: &str = "BadRequest";
    pub const INVALID_JSON: &str = "InvalidJson";
    pub const UNKNOWN_TOOL: &str = "UnknownTool";
    pub const UNKNOWN_API_VERSION: &str = "UnknownApiVersion";
    pub const UNAUTHORIZED: &str = "Unauthorized";
    pub const NOT_FOUND: &str = "NotFound";
    pub const METHOD_NOT_ALLOWED: &str = "MethodNotAllowed";
    pub const CONFLICT: &str = "Conflict";
    pub const LENGTH_REQUIRED: &str = "LengthRequired";
    pub const PRECONDITION_FAILED: &str = "PreconditionFailed";
    pub const PAYLOAD_TOO_LARGE: &str = "PayloadTooLarge";
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "UnsupportedMediaType";
    pub const NOT_ACCEPTABLE: &str = "NotAcceptable";
    pub const PRECONDITION_REQUIRED: &str = "PreconditionRequired";
    pub const TOO_MANY_REQUESTS: &str = "TooManyRequests";
    pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
}

/// Failures surfaced by the tool-call resource layer.
///
/// Each variant maps to one HTTP status; the pipeline writes the wire body
/// from [`ServiceError::code`] and [`ServiceError::message`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("unknown api-version: {0}")]
    UnknownApiVersion(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("content length required")]
    LengthRequired,

    #[error("precondition failed")]
    PreconditionFailed,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    #[error("precondition required")]
    PreconditionRequired,

    #[error("too many requests")]
    TooManyRequests,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("service is shutting down")]
    ServiceUnavailable,
}

impl ServiceError {
    /// HTTP status for the variant.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_)
            | Self::InvalidJson(_)
            | Self::UnknownTool(_)
            | Self::UnknownApiVersion(_) => 400,
            Self::Unauthorized => 401,
            Self::NotFound(_) => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable(_) => 406,
            Self::Conflict(_) => 409,
            Self::LengthRequired => 411,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UnsupportedMediaType(_) => 415,
            Self::PreconditionRequired => 428,
            Self::TooManyRequests => 429,
            Self::Internal(_) => 500,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Stable wire code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => error_codes::BAD_REQUEST,
            Self::InvalidJson(_) => error_codes::INVALID_JSON,
            Self::UnknownTool(_) => error_codes::UNKNOWN_TOOL,
            Self::UnknownApiVersion(_) => error_codes::UNKNOWN_API_VERSION,
            Self::Unauthorized => error_codes::UNAUTHORIZED,
            Self::NotFound(_) => error_codes::NOT_FOUND,
            Self::MethodNotAllowed => error_codes::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => error_codes::CONFLICT,
            Self::LengthRequired => error_codes::LENGTH_REQUIRED,
            Self::PreconditionFailed => error_codes::PRECONDITION_FAILED,
            Self::PayloadTooLarge => error_codes::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => error_codes::UNSUPPORTED_MEDIA_TYPE,
            Self::NotAcceptable(_) => error_codes::NOT_ACCEPTABLE,
            Self::PreconditionRequired => error_codes::PRECONDITION_REQUIRED,
            Self::TooManyRequests => error_codes::TOO_MANY_REQUESTS,
            Self::Internal(_) => error_codes::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable => error_codes::SERVICE_UNAVAILABLE,
        }
    }

    /// Human-readable message for the wire body.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Build the wire body, with an optional target (usually the resource id).
    pub fn body(&self, target: Option<String>) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.message(),
                target,
            },
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

/// `{"error":{…}}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error object of the wire body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}
