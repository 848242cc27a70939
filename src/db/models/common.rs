//! Shared response envelopes.

use serde::{Deserialize, Serialize};

/// One page of a larger result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

/// Body returned by endpoints that only acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Normalizes `page`/`pageSize` query values into `(page, page_size, offset)`.
pub fn page_window(page: Option<i64>, page_size: Option<i64>, default_size: i64) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(default_size).clamp(1, 100);
    (page, page_size, (page - 1) * page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_window_clamps() {
        assert_eq!(page_window(None, None, 20), (1, 20, 0));
        assert_eq!(page_window(Some(3), Some(10), 20), (3, 10, 20));
        assert_eq!(page_window(Some(0), Some(500), 20), (1, 100, 0));
        assert_eq!(page_window(Some(-2), Some(0), 20), (1, 1, 0));
    }
}
