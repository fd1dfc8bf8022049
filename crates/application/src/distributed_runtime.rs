use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_core::{AppError, AppResult};
use warden_domain::{Grant, GrantStatus, ValidGrant};

use crate::grant_lifecycle::GrantLifecycle;
use crate::runtime_ports::{
    GrantRuntime, WorkflowExecution, WorkflowExecutionStatus, WorkflowOrchestrator,
    execution_name,
};

/// Runtime that delegates timing to a durable workflow orchestrator.
///
/// The execution input is the authoritative copy of the grant; nothing is
/// cached locally.
#[derive(Clone)]
pub struct DistributedRuntime {
    orchestrator: Arc<dyn WorkflowOrchestrator>,
    lifecycle: GrantLifecycle,
}

impl DistributedRuntime {
    /// Creates a runtime over an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<dyn WorkflowOrchestrator>, lifecycle: GrantLifecycle) -> Self {
        Self {
            orchestrator,
            lifecycle,
        }
    }

    async fn execution(&self, grant_id: &str) -> AppResult<WorkflowExecution> {
        self.orchestrator
            .describe_execution(&execution_name(grant_id))
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("workflow execution for grant '{grant_id}' not found"))
            })
    }
}

#[async_trait]
impl GrantRuntime for DistributedRuntime {
    async fn init(&self) -> AppResult<()> {
        self.orchestrator.init().await
    }

    async fn create_grant(&self, grant: ValidGrant) -> AppResult<Grant> {
        let grant = Grant::pending(grant);
        let name = execution_name(grant.id());

        self.orchestrator.start_execution(&name, &grant).await?;

        if let Err(error) = self.lifecycle.announce_created(&grant).await {
            if let Err(stop_error) = self.orchestrator.stop_execution(&name).await {
                warn!(
                    grant_id = %grant.id(),
                    error = %stop_error,
                    "failed to stop execution after event emission failure"
                );
            }
            return Err(error);
        }

        info!(grant_id = %grant.id(), execution = %name, "grant workflow started");
        Ok(grant)
    }

    async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant> {
        let execution = self.execution(grant_id).await?;
        let mut grant = execution.observed_grant(Utc::now());

        match execution.status {
            WorkflowExecutionStatus::Aborted => {
                debug!(grant_id = %grant_id, "grant already revoked");
                return Ok(grant);
            }
            WorkflowExecutionStatus::Succeeded | WorkflowExecutionStatus::Failed => {
                return Err(AppError::Conflict(format!(
                    "grant '{grant_id}' is {} and cannot be revoked",
                    grant.status()
                )));
            }
            WorkflowExecutionStatus::Running => {}
        }

        // A failed revoke leaves the execution running so deactivation still happens at the end.
        let revoked = self.lifecycle.revoke(&mut grant, revoker).await;
        if grant.status() != GrantStatus::Revoked {
            return revoked.map(|()| grant);
        }

        self.orchestrator.stop_execution(&execution.name).await?;
        info!(grant_id = %grant_id, revoker = %revoker, "grant workflow stopped");
        revoked.map(|()| grant)
    }

    async fn get_grant(&self, grant_id: &str) -> AppResult<Grant> {
        Ok(self.execution(grant_id).await?.observed_grant(Utc::now()))
    }
}

/// Step of a grant workflow the orchestrator hands back for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepKind {
    /// Provision access at the start time.
    Activate,
    /// Remove access at the end time.
    Deactivate,
}

impl WorkflowStepKind {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

/// One due step claimed from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStep {
    /// Execution the step belongs to.
    pub execution: String,
    /// Step kind.
    pub kind: WorkflowStepKind,
    /// Execution input.
    pub grant: Grant,
}

/// Result of running one workflow step.
///
/// `grant` always carries the state the step left behind, including when
/// `result` is an error.
#[derive(Debug)]
pub struct StepOutcome {
    /// Step kind that ran.
    pub kind: WorkflowStepKind,
    /// Grant after the step.
    pub grant: Grant,
    /// Provider or event emission failure, if any.
    pub result: AppResult<()>,
}

impl StepOutcome {
    /// Returns true when the grant reached the step's target status.
    ///
    /// An event emission failure after a successful provider call still counts
    /// as a transition: access was changed and the workflow must continue.
    #[must_use]
    pub fn transitioned(&self) -> bool {
        let target = match self.kind {
            WorkflowStepKind::Activate => GrantStatus::Active,
            WorkflowStepKind::Deactivate => GrantStatus::Expired,
        };
        self.grant.status() == target
    }
}

/// Callback side of the distributed runtime, invoked by workflow workers.
#[derive(Clone)]
pub struct GrantWorkflowHandler {
    lifecycle: GrantLifecycle,
}

impl GrantWorkflowHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(lifecycle: GrantLifecycle) -> Self {
        Self { lifecycle }
    }

    /// Runs one claimed step.
    pub async fn handle(&self, step: WorkflowStep) -> StepOutcome {
        match step.kind {
            WorkflowStepKind::Activate => self.activate(step.grant).await,
            WorkflowStepKind::Deactivate => self.deactivate(step.grant).await,
        }
    }

    /// Provisions access for a pending grant.
    pub async fn activate(&self, grant: Grant) -> StepOutcome {
        let mut grant = grant.with_observed_status(GrantStatus::Pending);
        let result = self.lifecycle.activate(&mut grant).await;
        StepOutcome {
            kind: WorkflowStepKind::Activate,
            grant,
            result,
        }
    }

    /// Withdraws access granted by an activation whose execution was stopped meanwhile.
    pub async fn withdraw(&self, grant: &Grant) -> AppResult<()> {
        self.lifecycle.withdraw(grant).await
    }

    /// Removes access from an active grant at its end time.
    pub async fn deactivate(&self, grant: Grant) -> StepOutcome {
        let mut grant = grant.with_observed_status(GrantStatus::Active);
        let result = self.lifecycle.deactivate(&mut grant).await;
        StepOutcome {
            kind: WorkflowStepKind::Deactivate,
            grant,
            result,
        }
    }
}
