use std::fmt;

use thiserror::Error;

/// Caller-correctable input problems. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is empty")]
    EmptyTitle,
    #[error("title is {len} characters long (max {max})")]
    TitleTooLong { len: usize, max: usize },
    #[error("description is {len} characters long (max {max})")]
    DescriptionTooLong { len: usize, max: usize },
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid sort field: {0}")]
    InvalidSortField(String),
}

/// Failures of the backing collaborator (local file or remote resource).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid task record {id}: {source}")]
    InvalidRecord {
        id: String,
        #[source]
        source: ValidationError,
    },
}

impl From<reqwest::Error> for PersistenceError {
    fn from(value: reqwest::Error) -> Self {
        PersistenceError::Transport(value.to_string())
    }
}

/// Anything a task store operation can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl StoreError {
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            StoreError::Validation(err) => Some(err),
            StoreError::Persistence(_) => None,
        }
    }
}

/// Named error handler slots on the task store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Add,
    Update,
    Toggle,
    Delete,
    Load,
    Save,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Add => "add",
            ErrorCategory::Update => "update",
            ErrorCategory::Toggle => "toggle",
            ErrorCategory::Delete => "delete",
            ErrorCategory::Load => "load",
            ErrorCategory::Save => "save",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_name_the_offending_value() {
        assert_eq!(
            ValidationError::InvalidPriority("urgent".into()).to_string(),
            "invalid priority: urgent"
        );
        assert_eq!(
            ValidationError::TitleTooLong { len: 201, max: 200 }.to_string(),
            "title is 201 characters long (max 200)"
        );
    }

    #[test]
    fn store_error_is_transparent_over_its_sources() {
        let err = StoreError::from(ValidationError::EmptyTitle);
        assert_eq!(err.to_string(), "title is empty");
        assert_eq!(err.validation(), Some(&ValidationError::EmptyTitle));

        let err = StoreError::from(PersistenceError::Status {
            status: 503,
            body: "down".into(),
        });
        assert_eq!(err.to_string(), "http 503: down");
        assert!(err.validation().is_none());
    }

    #[test]
    fn error_category_names_match_handler_keys() {
        assert_eq!(ErrorCategory::Add.to_string(), "add");
        assert_eq!(ErrorCategory::Save.as_str(), "save");
    }
}
