//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod diagnostics;
mod grant;
mod grant_event;
mod provider_type;
mod provider_version;
mod validation;

pub use diagnostics::{DiagnosticLog, Diagnostics, LogLevel};
pub use grant::{Grant, GrantArgs, GrantCandidate, GrantStatus, ValidGrant};
pub use grant_event::{GrantEvent, GrantEventKind, deduplication_key};
pub use provider_type::{ProviderRef, ProviderType, next_available_provider_id};
pub use provider_version::{
    PreRelease, PreReleaseChannel, ProviderVersion, compare_provider_versions,
};
pub use validation::{ValidationResult, ValidationResults};
