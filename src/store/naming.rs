//! Object and bucket naming rules enforced by Cloud Storage.
//!
//! The HTTP client checks names before sending a request so that an invalid
//! destination fails the same way against the real store and the in-memory
//! one.

use crate::errors::{StoreError, StoreResult};

const MAX_OBJECT_NAME_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 222;
const BUCKET_COMPONENT_MAX_LEN: usize = 63;
const ACME_CHALLENGE_PREFIX: &str = ".well-known/acme-challenge/";

/// Validate an object name.
///
/// - 1–1024 bytes
/// - no carriage return or line feed
/// - not `.` or `..`
/// - not under `.well-known/acme-challenge/`
pub fn ensure_object_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidObjectName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_OBJECT_NAME_LEN {
        return Err(invalid("must be at most 1024 bytes"));
    }
    if name.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(invalid("must not contain carriage returns or line feeds"));
    }
    if name == "." || name == ".." {
        return Err(invalid("cannot be `.` or `..`"));
    }
    if name.starts_with(ACME_CHALLENGE_PREFIX) {
        return Err(invalid("cannot start with `.well-known/acme-challenge/`"));
    }
    Ok(())
}

/// Validate a bucket name.
///
/// Enforces Cloud Storage rules:
/// - 3–63 characters, or up to 222 when dotted with 63-character components
/// - lowercase letters, digits, dashes, underscores and dots only
/// - must start and end with a letter or digit
/// - cannot look like an IPv4 address
/// - cannot start with `goog` or contain `google`
pub fn ensure_bucket_name(name: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 222 characters"));
    }
    if name.split('.').any(|c| c.len() > BUCKET_COMPONENT_MAX_LEN) {
        return Err(invalid("components must be at most 63 characters"));
    }
    if !name.contains('.') && len > BUCKET_COMPONENT_MAX_LEN {
        return Err(invalid("must be at most 63 characters unless it contains dots"));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-' | '_'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dashes, underscores and dots",
        ));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(invalid("must start and end with a letter or digit"));
    }

    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }

    if name.starts_with("goog") || name.contains("google") {
        return Err(invalid("cannot start with `goog` or contain `google`"));
    }

    Ok(())
}

/// Names like `192.168.5.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}
