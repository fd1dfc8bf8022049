use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{AppError, AppResult, GrantValidationError};

/// Provider-specific grant arguments, ordered by key.
pub type GrantArgs = BTreeMap<String, String>;

/// Lifecycle status of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    /// Created and waiting for its start time.
    Pending,
    /// Access has been provisioned.
    Active,
    /// Access was removed at the end time.
    Expired,
    /// Access was removed before the end time.
    Revoked,
    /// Provisioning or removal failed.
    Error,
}

impl GrantStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::Error => "ERROR",
        }
    }

    /// Parses a storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRED" => Ok(Self::Expired),
            "REVOKED" => Ok(Self::Revoked),
            "ERROR" => Ok(Self::Error),
            _ => Err(AppError::Validation(format!(
                "unknown grant status '{value}'"
            ))),
        }
    }

    /// Returns true when no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked | Self::Error)
    }

    /// Returns whether the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Active) => true,
            (Self::Active, Self::Expired) => true,
            (Self::Pending | Self::Active, Self::Revoked) => true,
            (current, Self::Error) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl Display for GrantStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Unvalidated grant request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCandidate {
    /// Grant identifier.
    pub id: String,
    /// Key of the deployed provider that fulfils the grant.
    pub provider: String,
    /// Identity receiving access, usually an email address.
    pub subject: String,
    /// Provider-specific arguments.
    pub with: GrantArgs,
    /// Time access starts.
    pub start: DateTime<Utc>,
    /// Time access ends.
    pub end: DateTime<Utc>,
}

impl GrantCandidate {
    /// Creates a candidate with a freshly generated identifier.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        subject: impl Into<String>,
        with: GrantArgs,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            subject: subject.into(),
            with,
            start,
            end,
        }
    }

    /// Validates identity and time bounds against the supplied clock.
    ///
    /// Checks run in order and stop at the first failure.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidGrant, GrantValidationError> {
        if self.id.is_empty() {
            return Err(GrantValidationError::EmptyId);
        }

        if self.start == self.end {
            return Err(GrantValidationError::StartEqualsEnd);
        }

        if self.start > self.end {
            return Err(GrantValidationError::StartAfterEnd);
        }

        if self.end < now {
            return Err(GrantValidationError::EndInPast);
        }

        Ok(ValidGrant(self))
    }
}

/// Grant request that passed validation.
///
/// Only [`GrantCandidate::validate`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidGrant(GrantCandidate);

impl ValidGrant {
    /// Returns the validated fields.
    #[must_use]
    pub fn candidate(&self) -> &GrantCandidate {
        &self.0
    }

    /// Returns the grant identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.0.id.as_str()
    }

    /// Returns the provider key.
    #[must_use]
    pub fn provider(&self) -> &str {
        self.0.provider.as_str()
    }
}

/// Time-bounded access assignment owned by a runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    id: String,
    provider: String,
    subject: String,
    with: GrantArgs,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: GrantStatus,
}

impl Grant {
    /// Creates a pending grant from a validated request.
    #[must_use]
    pub fn pending(valid: ValidGrant) -> Self {
        let GrantCandidate {
            id,
            provider,
            subject,
            with,
            start,
            end,
        } = valid.0;

        Self {
            id,
            provider,
            subject,
            with,
            start,
            end,
            status: GrantStatus::Pending,
        }
    }

    /// Returns the grant identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the provider key.
    #[must_use]
    pub fn provider(&self) -> &str {
        self.provider.as_str()
    }

    /// Returns the subject receiving access.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns provider-specific arguments.
    #[must_use]
    pub fn with(&self) -> &GrantArgs {
        &self.with
    }

    /// Returns the start time.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end time.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> GrantStatus {
        self.status
    }

    /// Moves the grant to `next`, rejecting transitions the lifecycle forbids.
    pub fn transition_to(&mut self, next: GrantStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "grant '{}' cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        self.status = next;
        Ok(())
    }

    /// Returns a copy carrying `status` without checking the lifecycle.
    ///
    /// Used when a durable store reports the authoritative status.
    #[must_use]
    pub fn with_observed_status(mut self, status: GrantStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    fn candidate(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> GrantCandidate {
        GrantCandidate {
            id: id.to_owned(),
            provider: "testvault".to_owned(),
            subject: "alice@example.com".to_owned(),
            with: GrantArgs::from([("vault".to_owned(), "prod".to_owned())]),
            start,
            end,
        }
    }

    #[test]
    fn thirty_minute_grant_is_accepted_and_starts_pending() {
        let now = at(0);
        let valid = candidate("abcd", now, now + Duration::minutes(30)).validate(now);
        assert!(valid.is_ok());

        let grant = Grant::pending(valid.unwrap_or_else(|_| unreachable!()));
        assert_eq!(grant.id(), "abcd");
        assert_eq!(grant.status(), GrantStatus::Pending);
    }

    #[test]
    fn equal_start_and_end_is_rejected() {
        let now = at(0);
        let result = candidate("abcd", now, now).validate(now);
        assert_eq!(result.err(), Some(GrantValidationError::StartEqualsEnd));
        assert_eq!(
            GrantValidationError::StartEqualsEnd.to_string(),
            "start and end time cannot be equal"
        );
    }

    #[test]
    fn empty_id_is_checked_before_times() {
        let now = at(0);
        let result = candidate("", now, now).validate(now);
        assert_eq!(result.err(), Some(GrantValidationError::EmptyId));
    }

    #[test]
    fn end_in_the_past_is_rejected() {
        let result = candidate("abcd", at(-100), at(-10)).validate(at(0));
        assert_eq!(result.err(), Some(GrantValidationError::EndInPast));
    }

    #[test]
    fn generated_candidates_carry_an_id() {
        let candidate = GrantCandidate::new("p", "s", GrantArgs::new(), at(0), at(60));
        assert!(!candidate.id.is_empty());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let now = at(0);
        let valid = candidate("abcd", now, now + Duration::hours(1))
            .validate(now)
            .unwrap_or_else(|_| unreachable!());
        let mut grant = Grant::pending(valid);

        assert!(grant.transition_to(GrantStatus::Expired).is_err());
        assert!(grant.transition_to(GrantStatus::Active).is_ok());
        assert!(grant.transition_to(GrantStatus::Revoked).is_ok());
        assert!(grant.transition_to(GrantStatus::Error).is_err());
        assert_eq!(grant.status(), GrantStatus::Revoked);
    }

    #[test]
    fn status_serializes_in_upper_case() {
        let encoded = serde_json::to_string(&GrantStatus::Pending).unwrap_or_default();
        assert_eq!(encoded, "\"PENDING\"");
        assert!(GrantStatus::parse("ACTIVE").is_ok());
        assert!(GrantStatus::parse("active").is_err());
    }

    proptest! {
        #[test]
        fn validate_rejects_exactly_the_invalid_candidates(
            has_id in any::<bool>(),
            start in -10_000_i64..10_000,
            end in -10_000_i64..10_000,
            now in -10_000_i64..10_000,
        ) {
            let id = if has_id { "grant" } else { "" };
            let input = candidate(id, at(start), at(end));
            let result = input.clone().validate(at(now));
            let should_reject = !has_id || start >= end || end < now;

            prop_assert_eq!(result.is_err(), should_reject);
            if let Ok(valid) = result {
                prop_assert_eq!(valid.candidate(), &input);
            }
        }
    }
}
