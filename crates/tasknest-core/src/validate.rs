//! # Validation Module
//!
//! Input shapes accepted by the engine, and the rules applied to them.
//!
//! Validation collects every failing field before returning, so a client
//! sees all of its mistakes in one response.

use crate::error::{FieldError, NestError, NestResult};
use crate::model::{TodoPriority, TodoStatus};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum title length in characters.
pub const TITLE_MAX: usize = 200;

/// Maximum description length in characters.
pub const DESCRIPTION_MAX: usize = 1000;

/// Maximum category length in characters.
pub const CATEGORY_MAX: usize = 50;

/// Maximum email length in characters.
pub const EMAIL_MAX: usize = 255;

/// Accepted password length range in characters.
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 100;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

// =============================================================================
// NEW TODO
// =============================================================================

/// Fields a client may send when creating a todo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewTodo {
    /// Convenience constructor with defaults for every optional field.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Check every rule and return the normalized input.
    ///
    /// The title is trimmed; blank descriptions and categories become `None`.
    pub fn validate(self) -> NestResult<Self> {
        let mut errors = Vec::new();

        let title = check_title(&self.title, &mut errors);
        let description = normalize_optional(self.description);
        let category = normalize_optional(self.category);
        check_max("description", description.as_deref(), DESCRIPTION_MAX, &mut errors);
        check_max("category", category.as_deref(), CATEGORY_MAX, &mut errors);

        if !errors.is_empty() {
            return Err(NestError::Validation(errors));
        }

        Ok(Self {
            title,
            description,
            category,
            ..self
        })
    }
}

// =============================================================================
// TODO PATCH
// =============================================================================

/// A partial update. Absent fields are left untouched.
///
/// For `description`, `due_date` and `category`, an explicit JSON `null`
/// clears the value while an absent key keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<TodoStatus>,
    #[serde(default)]
    pub priority: Option<TodoPriority>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub category: Option<Option<String>>,
}

impl TodoPatch {
    /// True when the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.category.is_none()
    }

    pub fn validate(self) -> NestResult<Self> {
        let mut errors = Vec::new();

        let title = self.title.map(|t| check_title(&t, &mut errors));
        let description = self.description.map(normalize_optional);
        let category = self.category.map(normalize_optional);
        if let Some(d) = &description {
            check_max("description", d.as_deref(), DESCRIPTION_MAX, &mut errors);
        }
        if let Some(c) = &category {
            check_max("category", c.as_deref(), CATEGORY_MAX, &mut errors);
        }

        if !errors.is_empty() {
            return Err(NestError::Validation(errors));
        }

        Ok(Self {
            title,
            description,
            category,
            ..self
        })
    }
}

/// Maps a present key (even `null`) to `Some`, leaving absence to `default`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// REGISTRATION
// =============================================================================

/// Email and password submitted at signup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate and normalize the email (trimmed, lower-cased).
    pub fn validate(self) -> NestResult<Self> {
        let mut errors = Vec::new();
        let email = normalize_email(&self.email);

        let well_formed = EMAIL_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(&email));
        if !well_formed {
            errors.push(FieldError::new("email", "Invalid email address"));
        } else if email.chars().count() > EMAIL_MAX {
            errors.push(FieldError::new(
                "email",
                format!("Email must be at most {} characters", EMAIL_MAX),
            ));
        }

        let password_len = self.password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
            errors.push(FieldError::new(
                "password",
                format!(
                    "Password must be between {} and {} characters",
                    PASSWORD_MIN, PASSWORD_MAX
                ),
            ));
        }

        if !errors.is_empty() {
            return Err(NestError::Validation(errors));
        }

        Ok(Self {
            email,
            password: self.password,
        })
    }
}

/// Canonical form of an email used for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// HELPERS
// =============================================================================

fn check_title(raw: &str, errors: &mut Vec<FieldError>) -> String {
    let title = raw.trim();
    if title.is_empty() {
        errors.push(FieldError::new(
            "title",
            "Title cannot be empty or whitespace only",
        ));
    } else if title.chars().count() > TITLE_MAX {
        errors.push(FieldError::new(
            "title",
            format!("Title must be at most {} characters", TITLE_MAX),
        ));
    }
    title.to_string()
}

fn check_max(field: &str, value: Option<&str>, max: usize, errors: &mut Vec<FieldError>) {
    if let Some(v) = value {
        if v.chars().count() > max {
            errors.push(FieldError::new(
                field,
                format!("{} must be at most {} characters", capitalize(field), max),
            ));
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
