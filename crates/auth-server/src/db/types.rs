use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS)]
#[sqlx(type_name = "application_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

/// A client-supplied value that would not fit the column it is written to.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("`{field}` must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{0}` must be a positive number")]
    NotPositive(&'static str),
}

/// Length is counted in characters, matching `VARCHAR(n)`.
pub(crate) fn check_len(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<(), FieldError> {
    match value {
        Some(value) if value.chars().count() > max => Err(FieldError::TooLong { field, max }),
        _ => Ok(()),
    }
}
