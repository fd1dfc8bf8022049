use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};
use warden_domain::{Grant, GrantEvent, GrantStatus, ValidGrant};

/// Schedules when a grant's provider calls happen.
///
/// The only component allowed to call `Accessor::grant` and `Accessor::revoke`.
#[async_trait]
pub trait GrantRuntime: Send + Sync {
    /// One-time setup.
    async fn init(&self) -> AppResult<()>;

    /// Persists the grant as pending and schedules activation and deactivation.
    async fn create_grant(&self, grant: ValidGrant) -> AppResult<Grant>;

    /// Cancels scheduled deactivation and revokes access immediately.
    ///
    /// Revoking an already revoked grant succeeds without calling the provider.
    async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant>;

    /// Returns the current state of a grant.
    async fn get_grant(&self, grant_id: &str) -> AppResult<Grant>;
}

/// Port for delivering grant lifecycle events.
///
/// Delivery is at least once; consumers de-duplicate on grant ID and status.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: GrantEvent) -> AppResult<()>;
}

/// Status of a durable workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowExecutionStatus {
    /// Waiting for or performing activation or deactivation.
    Running,
    /// Deactivated at the end time.
    Succeeded,
    /// A step failed.
    Failed,
    /// Stopped by revocation.
    Aborted,
}

impl WorkflowExecutionStatus {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    /// Parses a storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "ABORTED" => Ok(Self::Aborted),
            _ => Err(AppError::Validation(format!(
                "unknown workflow execution status '{value}'"
            ))),
        }
    }
}

/// Durable workflow execution as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowExecution {
    /// Deterministic execution name.
    pub name: String,
    /// Execution status.
    pub status: WorkflowExecutionStatus,
    /// Grant the execution was started with.
    pub input: Grant,
    /// Time the execution was started.
    pub started_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// Derives the grant status the execution currently represents.
    #[must_use]
    pub fn observed_grant(&self, now: DateTime<Utc>) -> Grant {
        let status = match self.status {
            WorkflowExecutionStatus::Running if now < self.input.start() => GrantStatus::Pending,
            WorkflowExecutionStatus::Running => GrantStatus::Active,
            WorkflowExecutionStatus::Succeeded => GrantStatus::Expired,
            WorkflowExecutionStatus::Failed => GrantStatus::Error,
            WorkflowExecutionStatus::Aborted => GrantStatus::Revoked,
        };

        self.input.clone().with_observed_status(status)
    }
}

/// Port to an external durable workflow orchestrator.
///
/// The workflow waits until the grant start, calls back to activate, waits
/// until the grant end and calls back to deactivate.
#[async_trait]
pub trait WorkflowOrchestrator: Send + Sync {
    /// Verifies connectivity.
    async fn init(&self) -> AppResult<()> {
        Ok(())
    }

    /// Starts an execution; fails with `Conflict` if the name is taken.
    async fn start_execution(&self, name: &str, input: &Grant) -> AppResult<()>;

    /// Returns the execution with this name, if any.
    async fn describe_execution(&self, name: &str) -> AppResult<Option<WorkflowExecution>>;

    /// Stops a running execution and drops its pending steps.
    async fn stop_execution(&self, name: &str) -> AppResult<()>;
}

/// Returns the execution name for a grant.
#[must_use]
pub fn execution_name(grant_id: &str) -> String {
    grant_id.to_owned()
}
