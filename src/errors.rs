//! Typed error taxonomy for the desk.
//!
//! Every remote call (identity, store, notification sink) is translated into
//! one of these kinds at the call site, so nothing above the seams ever sees a
//! raw transport or database error. Internals (SQL, config parsing) work in
//! `anyhow::Result` and are folded into `DeskError::Store` at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("No active session")]
    Unauthenticated,

    #[error("Not permitted: {action}")]
    Forbidden { action: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("Notification sink error: {0}")]
    Sink(String),
}

impl DeskError {
    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A `DeskError` raised inside an `anyhow` context (e.g. validation inside
/// a DB closure) comes back out as itself; anything else is a store error.
impl From<anyhow::Error> for DeskError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<DeskError>() {
            Ok(desk) => desk,
            Err(other) => Self::Store(other),
        }
    }
}
