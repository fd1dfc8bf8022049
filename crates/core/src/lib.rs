//! Shared primitives for all Rust crates in Warden.

#![forbid(unsafe_code)]

/// Cooperative cancellation shared between tasks.
pub mod cancellation;

use thiserror::Error;

pub use cancellation::Cancellation;

/// Result type used across Warden crates.
pub type AppResult<T> = Result<T, AppError>;

/// Reasons a grant candidate fails time and identity validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GrantValidationError {
    /// The grant carries no identifier.
    #[error("grant id cannot be empty")]
    EmptyId,

    /// Start and end are the same instant.
    #[error("start and end time cannot be equal")]
    StartEqualsEnd,

    /// Start is after end.
    #[error("grant start time must be earlier than end time")]
    StartAfterEnd,

    /// End lies before the validation clock.
    #[error("grant finish time is in the past")]
    EndInPast,
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Grant candidate failed time or identity validation.
    ///
    /// Rendered as the bare validation message so callers can show it verbatim.
    #[error(transparent)]
    InvalidGrant(#[from] GrantValidationError),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// No provider is registered under the requested key.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// A grant argument is not accepted by the provider schema.
    #[error("invalid argument '{argument}': {reason}")]
    InvalidArgument {
        /// Offending argument key.
        argument: String,
        /// Human-readable reason.
        reason: String,
    },

    /// An option filter key is not accepted by the provider schema.
    #[error("invalid filter '{filter}': {reason}")]
    InvalidFilter {
        /// Offending filter key.
        filter: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A downstream API failed in a way that must not be retried.
    #[error("external error: {0}")]
    External(String),

    /// A provider implementation faulted while handling a call.
    #[error("internal server error with provider: {provider_type} version: {version}")]
    ProviderFault {
        /// Provider type in `publisher/name` form.
        provider_type: String,
        /// Provider version.
        version: String,
    },

    /// A grant lifecycle event could not be delivered.
    #[error("event emission failed: {0}")]
    EventEmission(String),

    /// The operation was cancelled before it completed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for errors caused by caller input rather than system state.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidGrant(_)
                | Self::NotFound(_)
                | Self::ProviderNotFound(_)
                | Self::InvalidArgument { .. }
                | Self::InvalidFilter { .. }
                | Self::Conflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, GrantValidationError};

    #[test]
    fn provider_fault_names_type_and_version() {
        let error = AppError::ProviderFault {
            provider_type: "commonfate/testvault".to_owned(),
            version: "v1".to_owned(),
        };

        assert_eq!(
            error.to_string(),
            "internal server error with provider: commonfate/testvault version: v1"
        );
    }

    #[test]
    fn grant_validation_errors_are_client_errors() {
        let error = AppError::from(GrantValidationError::StartEqualsEnd);
        assert!(error.is_client_error());
        assert_eq!(error.to_string(), "start and end time cannot be equal");
    }
}
