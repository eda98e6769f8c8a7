//! # Query Module
//!
//! Filtering, ordering and pagination of a user's todos.
//!
//! Backends hand the engine every live todo of one owner; this module does
//! the rest in memory. Ordering is newest first with the id as tie-breaker,
//! so the same data always pages the same way.

use crate::error::{FieldError, NestError, NestResult};
use crate::model::{Todo, TodoPriority, TodoStatus};
use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// FILTER
// =============================================================================

/// Criteria for listing todos. All criteria combine with AND.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoFilter {
    /// 1-indexed page number.
    pub page: u32,
    pub page_size: u32,
    /// Case-insensitive substring matched against title or description.
    pub search: Option<String>,
    pub status: Option<TodoStatus>,
    pub priority: Option<TodoPriority>,
    pub category: Option<String>,
}

impl Default for TodoFilter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
            status: None,
            priority: None,
            category: None,
        }
    }
}

impl TodoFilter {
    /// Reject out-of-range paging values.
    pub fn validate(&self) -> NestResult<()> {
        let mut errors = Vec::new();
        if self.page < 1 {
            errors.push(FieldError::new("page", "Page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            errors.push(FieldError::new(
                "page_size",
                format!("Page size must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NestError::Validation(errors))
        }
    }

    /// Page and page size forced into range.
    #[must_use]
    pub fn clamped(&self) -> (u32, u32) {
        (self.page.max(1), self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    /// Whether a todo satisfies every criterion.
    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        if !todo.is_live() {
            return false;
        }
        if self.status.is_some_and(|s| s != todo.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != todo.priority) {
            return false;
        }
        if let Some(category) = non_blank(self.category.as_deref()) {
            if todo.category.as_deref() != Some(category) {
                return false;
            }
        }
        if let Some(needle) = non_blank(self.search.as_deref()) {
            let needle = needle.to_lowercase();
            let in_title = todo.title.to_lowercase().contains(&needle);
            let in_description = todo
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }

    /// Filter, order and slice a set of todos.
    #[must_use]
    pub fn apply(&self, todos: Vec<Todo>) -> Page<Todo> {
        let (page, page_size) = self.clamped();

        let mut matching: Vec<Todo> = todos.into_iter().filter(|t| self.matches(t)).collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let offset = (page as usize - 1).saturating_mul(page_size as usize);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Page::new(items, total, page, page_size)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// PAGE
// =============================================================================

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Self {
            items,
            total,
            page,
            page_size,
            total_pages: total_pages(total, page_size),
        }
    }

    /// Convert every item, keeping the paging fields.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

/// `ceil(total / page_size)`; zero when there is nothing to show.
#[must_use]
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if total == 0 || page_size == 0 {
        0
    } else {
        total.div_ceil(page_size as u64)
    }
}

// =============================================================================
// TESTS
// =============================================================================
