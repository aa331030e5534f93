//! Paging and sorting for list operations.

use serde::{Deserialize, Serialize};

use crate::error::FieldErrors;

pub const MAX_PAGE: u32 = 10_000_000;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort keys accepted by workflow listing. A leading `-` means descending.
pub const WORKFLOW_SORT_SAFELIST: &[&str] = &["id", "name", "-id", "-name"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Page and sort request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    pub page: u32,
    pub page_size: u32,
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".to_string(),
        }
    }
}

impl Filters {
    /// Field errors for out-of-range or unsupported values. Empty when valid.
    pub fn validate(&self, safelist: &[&str]) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.page == 0 {
            errors.insert("page".into(), "must be greater than zero".into());
        } else if self.page > MAX_PAGE {
            errors.insert("page".into(), "must be a maximum of 10 million".into());
        }
        if self.page_size == 0 {
            errors.insert("page_size".into(), "must be greater than zero".into());
        } else if self.page_size > MAX_PAGE_SIZE {
            errors.insert("page_size".into(), "must be a maximum of 100".into());
        }
        if !safelist.contains(&self.sort.as_str()) {
            errors.insert("sort".into(), "invalid sort value".into());
        }
        errors
    }

    /// Column name with the direction prefix stripped.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_direction(&self) -> SortDirection {
        if self.sort.starts_with('-') {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// Paging metadata returned alongside a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub current_page: u32,
    pub page_size: u32,
    pub first_page: u32,
    pub last_page: u32,
    pub total_records: u64,
}

impl PageMetadata {
    /// All zero when there are no records.
    pub fn calculate(total_records: u64, page: u32, page_size: u32) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        let last_page = total_records.div_ceil(u64::from(page_size));
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            total_records,
        }
    }
}
