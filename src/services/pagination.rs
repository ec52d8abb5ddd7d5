//! Offset/limit pagination

use serde::Serialize;

use crate::error::DirectoryError;

/// Page size when `limit` is omitted
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest accepted page size
pub const MAX_LIMIT: u32 = 100;

/// Validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Validate raw values: `offset >= 0`, `1 <= limit <= MAX_LIMIT`
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Result<Self, DirectoryError> {
        let offset = offset.unwrap_or(0);
        let limit = limit.unwrap_or(DEFAULT_LIMIT as i64);

        if offset < 0 || offset > u32::MAX as i64 {
            return Err(DirectoryError::Validation(format!(
                "offset must be a non-negative integer, got {}",
                offset
            )));
        }
        if !(1..=MAX_LIMIT as i64).contains(&limit) {
            return Err(DirectoryError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, limit
            )));
        }

        Ok(Self {
            offset: offset as u32,
            limit: limit as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Page::new(None, None).unwrap(), Page::default());
        assert_eq!(Page::default().limit, 10);
    }

    #[test]
    fn test_bounds() {
        assert!(Page::new(Some(0), Some(1)).is_ok());
        assert!(Page::new(Some(5), Some(100)).is_ok());

        for (offset, limit) in [(Some(-1), None), (None, Some(0)), (None, Some(101))] {
            assert!(matches!(
                Page::new(offset, limit),
                Err(DirectoryError::Validation(_))
            ));
        }
    }
}
