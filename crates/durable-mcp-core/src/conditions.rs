//! Conditional-access values shared by the store contract and HTTP handlers.

/// If-Match / If-None-Match values attached to a store operation.
///
/// The store enforces these atomically with the mutation; handlers build them
/// from request headers or from an ETag loaded earlier in the same request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConditions {
    /// Perform the operation only if the stored ETag matches.
    pub if_match: Option<String>,
    /// Perform the operation only if the stored ETag does not match.
    /// `*` means "only if the resource does not exist" (create-only).
    pub if_none_match: Option<String>,
}

impl AccessConditions {
    /// Unconditional access.
    pub fn none() -> Self {
        Self::default()
    }

    /// Require the stored ETag to equal `etag`.
    pub fn if_match(etag: impl Into<String>) -> Self {
        Self {
            if_match: Some(etag.into()),
            if_none_match: None,
        }
    }

    /// Create-only: fail if any version of the resource exists.
    pub fn if_none_match_any() -> Self {
        Self {
            if_match: None,
            if_none_match: Some("*".to_string()),
        }
    }

    pub fn is_unconditional(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }
}

/// Whether a conditional header value matches a stored ETag.
///
/// Accepts `*`, a single quoted or bare ETag, or a comma-separated list.
/// Weak validators (`W/"…"`) compare by opaque value; the service only ever
/// emits strong ETags.
pub fn etag_matches(header_value: &str, etag: &str) -> bool {
    header_value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || unquote(candidate) == etag)
}

fn unquote(value: &str) -> &str {
    let value = value.strip_prefix("W/").unwrap_or(value);
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
