//! Identifier validation for tenants, tool names, and tool-call ids.

use crate::error::{ServiceError, ServiceResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new("^[a-zA-Z0-9_]+$").expect("static pattern");
}

pub const IDENTIFIER_MIN_LEN: usize = 3;
pub const IDENTIFIER_MAX_LEN: usize = 64;

/// Validate a tool name or tool-call id: `^[a-zA-Z0-9_]+$`, length 3–64.
pub fn validate_identifier(field: &str, value: &str) -> ServiceResult<()> {
    if value.len() < IDENTIFIER_MIN_LEN || value.len() > IDENTIFIER_MAX_LEN {
        return Err(ServiceError::BadRequest(format!(
            "{} must be {}-{} characters, got {}",
            field,
            IDENTIFIER_MIN_LEN,
            IDENTIFIER_MAX_LEN,
            value.len()
        )));
    }
    if !IDENTIFIER.is_match(value) {
        return Err(ServiceError::BadRequest(format!(
            "{} may only contain letters, digits, and underscores",
            field
        )));
    }
    Ok(())
}

/// Tenants are opaque but must be non-empty.
pub fn validate_tenant(tenant: &str) -> ServiceResult<()> {
    if tenant.is_empty() {
        return Err(ServiceError::BadRequest("tenant must be non-empty".to_string()));
    }
    Ok(())
}
