use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_core::{AppError, AppResult};
use warden_domain::{Grant, GrantEvent, GrantEventKind, GrantStatus};

use crate::provider_directory::{ProviderDirectory, ProviderEntry};
use crate::runtime_ports::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderAction {
    Grant,
    Revoke,
}

impl ProviderAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Revoke => "revoke",
        }
    }
}

/// Executes grant transitions against providers and reports them as events.
///
/// Provider calls run in their own task so a panic inside provider code turns
/// into [`AppError::ProviderFault`]. Any failed call moves the grant to
/// `ERROR` and emits `GrantFailed` before the error is returned.
///
/// When the provider call succeeds but its event cannot be published, the
/// grant keeps its new status and [`AppError::EventEmission`] is returned.
/// Callers decide what happens next from `grant.status()`, not from the error.
#[derive(Clone)]
pub struct GrantLifecycle {
    providers: Arc<ProviderDirectory>,
    event_bus: Arc<dyn EventBus>,
}

impl GrantLifecycle {
    /// Creates a lifecycle executor.
    #[must_use]
    pub fn new(providers: Arc<ProviderDirectory>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            providers,
            event_bus,
        }
    }

    /// Returns the deployed providers.
    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderDirectory> {
        &self.providers
    }

    /// Emits `GrantCreated` for a freshly scheduled grant.
    pub async fn announce_created(&self, grant: &Grant) -> AppResult<()> {
        self.emit(GrantEventKind::GrantCreated, grant).await
    }

    /// Provisions access and moves the grant to `ACTIVE`.
    pub async fn activate(&self, grant: &mut Grant) -> AppResult<()> {
        self.transition(
            grant,
            ProviderAction::Grant,
            GrantStatus::Active,
            GrantEventKind::GrantActivated,
        )
        .await
    }

    /// Removes access at the end time and moves the grant to `EXPIRED`.
    pub async fn deactivate(&self, grant: &mut Grant) -> AppResult<()> {
        self.transition(
            grant,
            ProviderAction::Revoke,
            GrantStatus::Expired,
            GrantEventKind::GrantExpired,
        )
        .await
    }

    /// Removes access early and moves the grant to `REVOKED`.
    ///
    /// A pending grant was never provisioned, so the provider is not called.
    pub async fn revoke(&self, grant: &mut Grant, revoker: &str) -> AppResult<()> {
        let kind = GrantEventKind::GrantRevoked {
            revoker: revoker.to_owned(),
        };

        if grant.status() == GrantStatus::Pending {
            grant.transition_to(GrantStatus::Revoked)?;
            info!(grant_id = %grant.id(), revoker = %revoker, "pending grant revoked");
            return self.emit(kind, grant).await;
        }

        self.transition(grant, ProviderAction::Revoke, GrantStatus::Revoked, kind)
            .await
    }

    /// Removes access provisioned by an activation that lost a race with revocation.
    ///
    /// The grant is left untouched and no event is emitted; its revocation was
    /// already reported.
    pub async fn withdraw(&self, grant: &Grant) -> AppResult<()> {
        let entry = self.providers.get(grant.provider())?;
        call_provider(entry, ProviderAction::Revoke, grant).await?;
        warn!(grant_id = %grant.id(), "access withdrawn after superseded activation");
        Ok(())
    }

    async fn transition(
        &self,
        grant: &mut Grant,
        action: ProviderAction,
        success_status: GrantStatus,
        success_event: GrantEventKind,
    ) -> AppResult<()> {
        if !grant.status().can_transition_to(success_status) {
            return Err(AppError::Conflict(format!(
                "grant '{}' cannot move from {} to {}",
                grant.id(),
                grant.status(),
                success_status
            )));
        }

        let outcome = match self.providers.get(grant.provider()) {
            Ok(entry) => call_provider(entry, action, grant).await,
            Err(error) => Err(error),
        };

        if let Err(error) = outcome {
            return Err(self.fail(grant, error).await);
        }

        grant.transition_to(success_status)?;
        info!(
            grant_id = %grant.id(),
            provider = %grant.provider(),
            status = %grant.status(),
            "grant transitioned"
        );

        self.emit(success_event, grant).await
    }

    async fn fail(&self, grant: &mut Grant, error: AppError) -> AppError {
        warn!(
            grant_id = %grant.id(),
            provider = %grant.provider(),
            error = %error,
            "grant transition failed"
        );

        if let Err(transition_error) = grant.transition_to(GrantStatus::Error) {
            return AppError::Internal(format!("{error}; {transition_error}"));
        }

        let reason = error.to_string();
        match self
            .emit(
                GrantEventKind::GrantFailed {
                    reason: reason.clone(),
                },
                grant,
            )
            .await
        {
            Ok(()) => error,
            Err(emit_error) => AppError::EventEmission(format!(
                "{emit_error}; original failure: {reason}"
            )),
        }
    }

    async fn emit(&self, kind: GrantEventKind, grant: &Grant) -> AppResult<()> {
        let event_type = kind.event_type();
        self.event_bus
            .publish(GrantEvent::new(kind, grant.clone()))
            .await
            .map_err(|error| {
                error!(
                    grant_id = %grant.id(),
                    event_type,
                    error = %error,
                    "failed to emit grant event"
                );
                AppError::EventEmission(format!(
                    "failed to emit {event_type} for grant '{}': {error}",
                    grant.id()
                ))
            })
    }
}

/// Aborts the provider task when the caller stops waiting for it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn call_provider(entry: &ProviderEntry, action: ProviderAction, grant: &Grant) -> AppResult<()> {
    let accessor = entry.accessor().clone();
    let subject = grant.subject().to_owned();
    let args = grant.with().clone();
    let grant_id = grant.id().to_owned();

    let mut task = AbortOnDrop(tokio::spawn(async move {
        match action {
            ProviderAction::Grant => accessor.grant(&subject, &args, &grant_id).await,
            ProviderAction::Revoke => accessor.revoke(&subject, &args, &grant_id).await,
        }
    }));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(join_error) => {
            error!(
                grant_id = %grant.id(),
                provider_type = %entry.provider_type(),
                version = %entry.version(),
                action = action.as_str(),
                panicked = join_error.is_panic(),
                "provider call faulted"
            );
            Err(AppError::ProviderFault {
                provider_type: entry.provider_type().to_string(),
                version: entry.version().to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::*;
    use crate::test_support::{FakeProvider, RecordingEventBus, directory_with, valid_grant};

    #[tokio::test]
    async fn emission_failure_after_activation_keeps_grant_active() {
        let provider = FakeProvider::configured();
        let calls = provider.calls.clone();
        let events = Arc::new(RecordingEventBus::default());
        let lifecycle = GrantLifecycle::new(directory_with(provider), events.clone());
        let mut grant = Grant::pending(valid_grant(
            "g1",
            Duration::seconds(-1),
            Duration::minutes(30),
        ));

        events.set_failing(true);
        let activated = lifecycle.activate(&mut grant).await;

        assert!(matches!(activated, Err(AppError::EventEmission(_))));
        assert_eq!(grant.status(), GrantStatus::Active);
        assert_eq!(calls.grants(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_aborts_provider_call() {
        let provider = FakeProvider {
            hang_on_grant: true,
            ..FakeProvider::configured()
        };
        let calls = provider.calls.clone();
        let lifecycle = GrantLifecycle::new(
            directory_with(provider),
            Arc::new(RecordingEventBus::default()),
        );
        let mut grant = Grant::pending(valid_grant(
            "g1",
            Duration::seconds(-1),
            Duration::minutes(30),
        ));

        let activated =
            tokio::time::timeout(StdDuration::from_secs(5), lifecycle.activate(&mut grant)).await;
        assert!(activated.is_err());

        for _ in 0..10 {
            if calls.abandoned() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.grants(), 1);
        assert_eq!(calls.abandoned(), 1);
        assert_eq!(grant.status(), GrantStatus::Pending);
    }
}
