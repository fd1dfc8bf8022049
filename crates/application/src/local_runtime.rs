use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use warden_core::{AppError, AppResult, Cancellation};
use warden_domain::{Grant, GrantStatus, ValidGrant};

use crate::grant_lifecycle::GrantLifecycle;
use crate::runtime_ports::GrantRuntime;

#[derive(Clone)]
struct LocalGrantRecord {
    grant: Arc<Mutex<Grant>>,
    cancellation: Cancellation,
}

/// In-process runtime for local development.
///
/// Each grant gets one background task that sleeps until the start, activates,
/// sleeps until the end and deactivates. The grant mutex is held across each
/// provider call so revocation waits for an in-flight activation. State is lost
/// when the process exits.
#[derive(Clone)]
pub struct LocalRuntime {
    lifecycle: GrantLifecycle,
    grants: Arc<RwLock<HashMap<String, LocalGrantRecord>>>,
}

impl LocalRuntime {
    /// Creates a runtime with an empty store.
    #[must_use]
    pub fn new(lifecycle: GrantLifecycle) -> Self {
        Self {
            lifecycle,
            grants: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn record(&self, grant_id: &str) -> AppResult<LocalGrantRecord> {
        self.grants
            .read()
            .await
            .get(grant_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("grant '{grant_id}' not found")))
    }
}

#[async_trait]
impl GrantRuntime for LocalRuntime {
    async fn init(&self) -> AppResult<()> {
        Ok(())
    }

    async fn create_grant(&self, grant: ValidGrant) -> AppResult<Grant> {
        let grant = Grant::pending(grant);
        let record = LocalGrantRecord {
            grant: Arc::new(Mutex::new(grant.clone())),
            cancellation: Cancellation::new(),
        };

        {
            let mut grants = self.grants.write().await;
            if grants.contains_key(grant.id()) {
                return Err(AppError::Conflict(format!(
                    "grant '{}' already exists",
                    grant.id()
                )));
            }
            grants.insert(grant.id().to_owned(), record.clone());
        }

        if let Err(error) = self.lifecycle.announce_created(&grant).await {
            self.grants.write().await.remove(grant.id());
            return Err(error);
        }

        info!(
            grant_id = %grant.id(),
            provider = %grant.provider(),
            start = %grant.start(),
            end = %grant.end(),
            "grant scheduled"
        );

        tokio::spawn(run_schedule(
            self.lifecycle.clone(),
            record.grant,
            record.cancellation,
            grant.start(),
            grant.end(),
        ));

        Ok(grant)
    }

    async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant> {
        let record = self.record(grant_id).await?;

        record.cancellation.cancel();
        let mut grant = record.grant.lock().await;

        match grant.status() {
            GrantStatus::Revoked => {
                debug!(grant_id = %grant_id, "grant already revoked");
                Ok(grant.clone())
            }
            GrantStatus::Expired | GrantStatus::Error => Err(AppError::Conflict(format!(
                "grant '{grant_id}' is {} and cannot be revoked",
                grant.status()
            ))),
            GrantStatus::Pending | GrantStatus::Active => {
                self.lifecycle.revoke(&mut grant, revoker).await?;
                Ok(grant.clone())
            }
        }
    }

    async fn get_grant(&self, grant_id: &str) -> AppResult<Grant> {
        let record = self.record(grant_id).await?;
        let grant = record.grant.lock().await;
        Ok(grant.clone())
    }
}

async fn run_schedule(
    lifecycle: GrantLifecycle,
    grant: Arc<Mutex<Grant>>,
    cancellation: Cancellation,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    if !sleep_until(start, &cancellation).await {
        return;
    }

    {
        let mut grant = grant.lock().await;
        if cancellation.is_cancelled() || grant.status() != GrantStatus::Pending {
            return;
        }
        if let Err(error) = lifecycle.activate(&mut grant).await {
            warn!(grant_id = %grant.id(), error = %error, "grant activation failed");
            // Access exists once the grant is active, so it must still be removed at the end.
            if grant.status() != GrantStatus::Active {
                return;
            }
        }
    }

    if !sleep_until(end, &cancellation).await {
        return;
    }

    let mut grant = grant.lock().await;
    if cancellation.is_cancelled() || grant.status() != GrantStatus::Active {
        return;
    }
    if let Err(error) = lifecycle.deactivate(&mut grant).await {
        warn!(grant_id = %grant.id(), error = %error, "grant deactivation failed");
    }
}

/// Sleeps until `target`; returns false when cancelled first.
async fn sleep_until(target: DateTime<Utc>, cancellation: &Cancellation) -> bool {
    let delay = (target - Utc::now()).to_std().unwrap_or_default();

    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancellation.cancelled() => false,
    }
}
