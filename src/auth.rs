//! API key authentication
//!
//! Every endpoint except `/health` requires the pre-shared key in the
//! `X-API-Key` header.

use hyper::header::HeaderMap;

use crate::error::DirectoryError;

/// Header carrying the pre-shared key
pub const API_KEY_HEADER: &str = "x-api-key";

/// API key validator
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    key: String,
}

impl ApiKeyValidator {
    /// Create a validator for the configured key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Validate an API key
    ///
    /// A missing or empty key is rejected the same way as a wrong one.
    pub fn validate(&self, api_key: Option<&str>) -> Result<(), DirectoryError> {
        match Self::extract_from_header(api_key) {
            Some(key) if constant_time_compare(key, &self.key) => Ok(()),
            _ => Err(DirectoryError::Unauthorized),
        }
    }

    /// Validate the key carried by request headers
    pub fn validate_headers(&self, headers: &HeaderMap) -> Result<(), DirectoryError> {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());
        self.validate(key)
    }

    /// Extract API key from request headers
    pub fn extract_from_header(header: Option<&str>) -> Option<&str> {
        header.filter(|h| !h.is_empty())
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
