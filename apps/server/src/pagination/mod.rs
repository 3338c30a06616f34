use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default page size for pagination
pub const PAGE_SIZE: i64 = 20;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: i64 = 100;

/// Highest page number whose row offset still fits in an i64
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

/// Row offset of a 1-indexed page
pub fn page_offset(page: i64, per_page: i64) -> AppResult<i64> {
    page.checked_sub(1)
        .and_then(|p| p.checked_mul(per_page))
        .filter(|offset| *offset >= 0)
        .ok_or_else(|| AppError::Validation(format!("page must be between 1 and {}", MAX_PAGE)))
}

/// Offset-based paginated response wrapper
#[derive(Debug, Serialize)]
pub struct OffsetPaginatedResponse<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> OffsetPaginatedResponse<T> {
    pub fn new(items: Vec<T>, total_count: i64, page: i64, per_page: i64) -> Self {
        let total_pages = (total_count + per_page - 1) / per_page; // Ceiling division
        Self {
            items,
            total_count,
            page,
            per_page,
            total_pages,
        }
    }
}

/// Sort order direction
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Query parameters for listing dreams (offset-based)
#[derive(Debug, Deserialize)]
pub struct ListDreamsQuery {
    /// Page number (1-indexed, default: 1)
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page (default: 20)
    #[serde(default = "default_per_page")]
    pub per_page: i64,

    /// Sort order direction (default: desc = newest first)
    #[serde(default)]
    pub order: SortOrder,
}

impl ListDreamsQuery {
    /// Rejects pages outside 1..=MAX_PAGE and page sizes outside 1..=MAX_PAGE_SIZE
    pub fn validate(&self) -> AppResult<()> {
        if self.page < 1 || self.page > MAX_PAGE {
            return Err(AppError::Validation(format!(
                "page must be between 1 and {}",
                MAX_PAGE
            )));
        }
        if self.per_page < 1 || self.per_page > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "per_page must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    PAGE_SIZE
}
