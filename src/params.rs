//! Query-string parameters
//!
//! Every parse failure is a [`DirectoryError::Validation`], raised before any
//! query runs.

use std::str::FromStr;

use crate::error::DirectoryError;
use crate::geo::{BoundingBox, Coordinate, RadiusQuery};
use crate::services::Page;

/// Decoded `key=value` pairs of a request URI
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Decode a raw query string (`None` when the URI has no `?`)
    pub fn parse(query: Option<&str>) -> Result<Self, DirectoryError> {
        let pairs = match query {
            Some(q) if !q.is_empty() => serde_urlencoded::from_str::<Vec<(String, String)>>(q)
                .map_err(|e| DirectoryError::Validation(format!("malformed query string: {}", e)))?,
            _ => Vec::new(),
        };
        Ok(Self { pairs })
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn optional<T: FromStr>(&self, name: &str) -> Result<Option<T>, DirectoryError> {
        match self.get(name) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                DirectoryError::Validation(format!("invalid value for '{}': {:?}", name, raw))
            }),
        }
    }

    pub fn required<T: FromStr>(&self, name: &str) -> Result<T, DirectoryError> {
        self.optional(name)?.ok_or_else(|| {
            DirectoryError::Validation(format!("missing required parameter '{}'", name))
        })
    }

    /// Non-empty string parameter
    pub fn required_str(&self, name: &str) -> Result<&str, DirectoryError> {
        match self.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(DirectoryError::Validation(format!(
                "missing required parameter '{}'",
                name
            ))),
        }
    }

    /// `offset` / `limit`
    pub fn page(&self) -> Result<Page, DirectoryError> {
        Page::new(self.optional("offset")?, self.optional("limit")?)
    }

    fn center(&self) -> Result<Coordinate, DirectoryError> {
        Ok(Coordinate::new(
            self.required("latitude")?,
            self.required("longitude")?,
        ))
    }

    /// `latitude`, `longitude`, `radius_km`
    pub fn radius(&self) -> Result<RadiusQuery, DirectoryError> {
        RadiusQuery::new(self.center()?, self.required("radius_km")?)
    }

    /// `latitude`, `longitude`, `width`, `height`
    pub fn rectangle(&self) -> Result<BoundingBox, DirectoryError> {
        BoundingBox::around(self.center()?, self.required("width")?, self.required("height")?)
    }
}
