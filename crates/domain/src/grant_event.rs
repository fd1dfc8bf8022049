use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Grant, GrantStatus};

/// Kind of grant lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrantEventKind {
    /// The grant was accepted and scheduled.
    GrantCreated,
    /// Access was provisioned.
    GrantActivated,
    /// Access was removed at the end time.
    GrantExpired,
    /// Access was removed before the end time.
    GrantRevoked {
        /// Identity that requested revocation.
        revoker: String,
    },
    /// Provisioning or removal failed.
    GrantFailed {
        /// Failure reason reported by the provider boundary.
        reason: String,
    },
}

impl GrantEventKind {
    /// Returns the stable event type value.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::GrantCreated => "grant.created",
            Self::GrantActivated => "grant.activated",
            Self::GrantExpired => "grant.expired",
            Self::GrantRevoked { .. } => "grant.revoked",
            Self::GrantFailed { .. } => "grant.failed",
        }
    }
}

/// Event emitted on every grant status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEvent {
    /// Event kind and kind-specific detail.
    #[serde(flatten)]
    pub kind: GrantEventKind,
    /// Full grant snapshot after the transition.
    pub grant: Grant,
    /// Emission timestamp.
    pub occurred_at: DateTime<Utc>,
}

impl GrantEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: GrantEventKind, grant: Grant) -> Self {
        Self {
            kind,
            grant,
            occurred_at: Utc::now(),
        }
    }

    /// Returns the key consumers use to drop duplicate deliveries.
    #[must_use]
    pub fn deduplication_key(&self) -> String {
        deduplication_key(self.grant.id(), self.grant.status())
    }
}

/// Builds the `grant_id:STATUS` de-duplication key.
#[must_use]
pub fn deduplication_key(grant_id: &str, status: GrantStatus) -> String {
    format!("{grant_id}:{status}")
}
