//! Error types for the crate.
//!
//! Internally everything is an `anyhow::Error` (aliased as `Res<T>`). At the public boundary the
//! error is wrapped in `Error`, which carries an `ErrorType` so that callers (the view layer, the
//! CLI) can react to the class of failure without inspecting the message.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = std::result::Result<T, anyhow::Error>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The class of failure that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The record store failed while listing records.
    Load,
    /// The record store failed while creating a record.
    Create,
    /// The record store failed while updating a record.
    Update,
    /// The record store failed while deleting a record.
    Delete,
    /// The requested record does not exist locally or in the record store.
    NotFound,
    /// The record exists but belongs to a different scope than the current one.
    ScopeMismatch,
    /// The configuration is missing or invalid.
    Config,
    /// A filesystem operation failed.
    Io,
    /// The request could not be understood, e.g. bad command line input.
    Request,
}

serde_plain::derive_display_from_serialize!(ErrorType);

/// The public error type. It pairs an `ErrorType` with the underlying error chain.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub(crate) fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// The class of failure.
    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// A single human-readable message suitable for display next to the action that failed.
    ///
    /// Scope mismatches deliberately read the same as not-found so that the existence of records
    /// in other scopes is not revealed.
    pub fn message(&self) -> String {
        match self.error_type {
            ErrorType::Load => "Unable to load records".to_string(),
            ErrorType::Create => "Unable to add the record".to_string(),
            ErrorType::Update => "Unable to save changes to the record".to_string(),
            ErrorType::Delete => "Unable to delete the record".to_string(),
            ErrorType::NotFound | ErrorType::ScopeMismatch => "Record not found".to_string(),
            ErrorType::Config | ErrorType::Io | ErrorType::Request => self.inner.to_string(),
        }
    }

    /// The underlying error chain.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.error_type {
            ErrorType::Config | ErrorType::Io | ErrorType::Request => write!(f, "{:#}", self.inner),
            _ => write!(f, "{}: {:#}", self.message(), self.inner),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error({}): {:?}", self.error_type, self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

/// Converts an internal result into a public one, tagging the failure with an `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
