//! Redis-backed durable workflow orchestrator for grant executions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use tracing::{debug, warn};
use warden_application::{
    StepOutcome, WorkflowExecution, WorkflowExecutionStatus, WorkflowOrchestrator, WorkflowStep,
    WorkflowStepKind,
};
use warden_core::{AppError, AppResult};
use warden_domain::Grant;

const START_EXECUTION_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'status', 'RUNNING', 'input', ARGV[1], 'started_at', ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
return 1
"#;

const STOP_EXECUTION_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return 0
end
if status == 'RUNNING' then
  redis.call('HSET', KEYS[1], 'status', 'ABORTED')
  redis.call('ZREM', KEYS[2], ARGV[1], ARGV[2])
end
return 1
"#;

const CLAIM_STEPS_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, member in ipairs(expired) do
  redis.call('ZREM', KEYS[2], member)
  redis.call('ZADD', KEYS[1], ARGV[1], member)
end
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, member in ipairs(due) do
  redis.call('ZREM', KEYS[1], member)
  redis.call('ZADD', KEYS[2], ARGV[3], member)
end
return due
"#;

const COMPLETE_STEP_SCRIPT: &str = r#"
redis.call('ZREM', KEYS[3], ARGV[1])
if redis.call('HGET', KEYS[1], 'status') ~= 'RUNNING' then
  return 0
end
if ARGV[2] == 'SCHEDULE' then
  redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
else
  redis.call('HSET', KEYS[1], 'status', ARGV[2])
end
return 1
"#;

const SCHEDULE_MODE: &str = "SCHEDULE";
const DEFAULT_STEP_LEASE: std::time::Duration = std::time::Duration::from_secs(300);

/// Result of recording a finished step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCompletion {
    /// The execution advanced.
    Recorded,
    /// The execution was stopped while the step ran.
    Superseded,
}

/// Redis implementation of the grant workflow orchestrator.
///
/// Executions are hashes under `<prefix>:execution:<name>`; due steps are
/// members of the sorted set `<prefix>:due` scored by due time in epoch
/// milliseconds. Claiming atomically moves a step into `<prefix>:inflight`,
/// scored by its lease deadline. Steps whose lease runs out before
/// completion are returned to the due set on the next claim, so a crashed
/// worker delays a step but never loses it.
#[derive(Clone)]
pub struct RedisWorkflowOrchestrator {
    client: redis::Client,
    key_prefix: String,
    step_lease: std::time::Duration,
}

impl RedisWorkflowOrchestrator {
    /// Creates one orchestrator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            step_lease: DEFAULT_STEP_LEASE,
        }
    }

    /// Replaces how long a claimed step stays reserved for its worker.
    #[must_use]
    pub fn with_step_lease(mut self, step_lease: std::time::Duration) -> Self {
        self.step_lease = step_lease;
        self
    }

    fn execution_key(&self, name: &str) -> String {
        format!("{}:execution:{name}", self.key_prefix)
    }

    fn due_key(&self) -> String {
        format!("{}:due", self.key_prefix)
    }

    fn inflight_key(&self) -> String {
        format!("{}:inflight", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    /// Claims up to `limit` steps due at `now`.
    ///
    /// Steps of executions that are no longer running are released. A step
    /// whose execution cannot be read stays claimed and is retried once its
    /// lease expires.
    pub async fn claim_due_steps(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<WorkflowStep>> {
        if limit == 0 {
            return Err(AppError::Validation(
                "workflow claim limit must be greater than zero".to_owned(),
            ));
        }

        let mut connection = self.connection().await?;
        let members: Vec<String> = Script::new(CLAIM_STEPS_SCRIPT)
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(now.timestamp_millis())
            .arg(limit)
            .arg(lease_deadline(now, self.step_lease))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to claim workflow steps: {error}"))
            })?;

        let mut steps = Vec::with_capacity(members.len());
        for member in members {
            let Some((kind, name)) = decode_step_member(member.as_str()) else {
                warn!(member = %member, "dropping malformed workflow step");
                self.release_claim(member.as_str()).await;
                continue;
            };

            match self.describe_execution(name).await {
                Ok(Some(execution)) if execution.status == WorkflowExecutionStatus::Running => {
                    steps.push(WorkflowStep {
                        execution: execution.name,
                        kind,
                        grant: execution.input,
                    });
                }
                Ok(_) => {
                    debug!(execution = %name, "skipping step of finished execution");
                    self.release_claim(member.as_str()).await;
                }
                Err(error) => warn!(
                    execution = %name,
                    step = kind.as_str(),
                    error = %error,
                    "workflow step left claimed until its lease expires"
                ),
            }
        }

        Ok(steps)
    }

    /// Records the outcome of a claimed step and releases its claim.
    ///
    /// When the step reached its target status, activation schedules
    /// deactivation at the grant end and deactivation completes the
    /// execution; otherwise the execution fails. A lost lifecycle event does
    /// not stop the workflow.
    pub async fn complete_step(
        &self,
        step: &WorkflowStep,
        outcome: &StepOutcome,
    ) -> AppResult<StepCompletion> {
        let (mode, score, next_member) = completion_args(step, outcome.transitioned());

        let mut connection = self.connection().await?;
        let recorded: i32 = Script::new(COMPLETE_STEP_SCRIPT)
            .key(self.execution_key(step.execution.as_str()))
            .key(self.due_key())
            .key(self.inflight_key())
            .arg(encode_step_member(step.kind, step.execution.as_str()))
            .arg(mode)
            .arg(score)
            .arg(next_member)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to record workflow step: {error}"))
            })?;

        Ok(if recorded == 1 {
            StepCompletion::Recorded
        } else {
            StepCompletion::Superseded
        })
    }

    async fn release_claim(&self, member: &str) {
        let released: AppResult<i64> = async {
            let mut connection = self.connection().await?;
            connection
                .zrem(self.inflight_key(), member)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to release workflow step: {error}"))
                })
        }
        .await;

        if let Err(error) = released {
            warn!(member = %member, error = %error, "workflow step claim not released");
        }
    }
}

#[async_trait]
impl WorkflowOrchestrator for RedisWorkflowOrchestrator {
    async fn init(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("redis ping failed: {error}")))?;
        Ok(())
    }

    async fn start_execution(&self, name: &str, input: &Grant) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(
                "workflow execution name must not be empty".to_owned(),
            ));
        }

        let payload = serde_json::to_string(input).map_err(|error| {
            AppError::Internal(format!("failed to serialize workflow input: {error}"))
        })?;

        let mut connection = self.connection().await?;
        let started: i32 = Script::new(START_EXECUTION_SCRIPT)
            .key(self.execution_key(name))
            .key(self.due_key())
            .arg(payload)
            .arg(Utc::now().to_rfc3339())
            .arg(input.start().timestamp_millis())
            .arg(encode_step_member(WorkflowStepKind::Activate, name))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to start workflow execution: {error}"))
            })?;

        if started == 0 {
            return Err(AppError::Conflict(format!(
                "workflow execution '{name}' already exists"
            )));
        }

        Ok(())
    }

    async fn describe_execution(&self, name: &str) -> AppResult<Option<WorkflowExecution>> {
        let mut connection = self.connection().await?;
        let fields: HashMap<String, String> = connection
            .hgetall(self.execution_key(name))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read workflow execution: {error}"))
            })?;

        if fields.is_empty() {
            return Ok(None);
        }

        decode_execution(name, &fields).map(Some)
    }

    async fn stop_execution(&self, name: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let found: i32 = Script::new(STOP_EXECUTION_SCRIPT)
            .key(self.execution_key(name))
            .key(self.due_key())
            .arg(encode_step_member(WorkflowStepKind::Activate, name))
            .arg(encode_step_member(WorkflowStepKind::Deactivate, name))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to stop workflow execution: {error}"))
            })?;

        if found == 0 {
            return Err(AppError::NotFound(format!(
                "workflow execution '{name}' not found"
            )));
        }

        Ok(())
    }
}

fn lease_deadline(now: DateTime<Utc>, lease: std::time::Duration) -> i64 {
    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_add(lease_ms)
}

/// Returns the script mode, due score and follow-up member for a finished step.
fn completion_args(step: &WorkflowStep, transitioned: bool) -> (&'static str, i64, String) {
    match (step.kind, transitioned) {
        (WorkflowStepKind::Activate, true) => (
            SCHEDULE_MODE,
            step.grant.end().timestamp_millis(),
            encode_step_member(WorkflowStepKind::Deactivate, step.execution.as_str()),
        ),
        (WorkflowStepKind::Deactivate, true) => {
            (WorkflowExecutionStatus::Succeeded.as_str(), 0, String::new())
        }
        (_, false) => (WorkflowExecutionStatus::Failed.as_str(), 0, String::new()),
    }
}

fn encode_step_member(kind: WorkflowStepKind, execution: &str) -> String {
    format!("{}|{execution}", kind.as_str())
}

fn decode_step_member(member: &str) -> Option<(WorkflowStepKind, &str)> {
    let (kind, execution) = member.split_once('|')?;
    let kind = match kind {
        "activate" => WorkflowStepKind::Activate,
        "deactivate" => WorkflowStepKind::Deactivate,
        _ => return None,
    };

    (!execution.is_empty()).then_some((kind, execution))
}

fn decode_execution(name: &str, fields: &HashMap<String, String>) -> AppResult<WorkflowExecution> {
    let field = |key: &str| {
        fields.get(key).ok_or_else(|| {
            AppError::Internal(format!("workflow execution '{name}' is missing '{key}'"))
        })
    };

    let status = WorkflowExecutionStatus::parse(field("status")?)?;
    let input: Grant = serde_json::from_str(field("input")?).map_err(|error| {
        AppError::Internal(format!(
            "workflow execution '{name}' has invalid input: {error}"
        ))
    })?;
    let started_at = DateTime::parse_from_rfc3339(field("started_at")?)
        .map_err(|error| {
            AppError::Internal(format!(
                "workflow execution '{name}' has invalid start time: {error}"
            ))
        })?
        .with_timezone(&Utc);

    Ok(WorkflowExecution {
        name: name.to_owned(),
        status,
        input,
        started_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use warden_domain::{GrantArgs, GrantCandidate};

    use super::*;

    fn grant_json() -> String {
        let now = Utc::now();
        let candidate = GrantCandidate::new(
            "testvault",
            "alice@example.com",
            GrantArgs::new(),
            now,
            now + Duration::minutes(30),
        );
        let grant = Grant::pending(candidate.validate(now).unwrap_or_else(|_| unreachable!()));
        serde_json::to_string(&grant).unwrap_or_default()
    }

    #[test]
    fn step_members_round_trip_through_the_due_set() {
        let member = encode_step_member(WorkflowStepKind::Deactivate, "g1");
        assert_eq!(member, "deactivate|g1");
        assert_eq!(
            decode_step_member(member.as_str()),
            Some((WorkflowStepKind::Deactivate, "g1"))
        );
        assert_eq!(decode_step_member("expire|g1"), None);
        assert_eq!(decode_step_member("activate|"), None);
    }

    #[test]
    fn execution_hash_decodes_into_execution() {
        let fields = HashMap::from([
            ("status".to_owned(), "ABORTED".to_owned()),
            ("input".to_owned(), grant_json()),
            ("started_at".to_owned(), "2026-01-01T00:00:00Z".to_owned()),
        ]);

        let execution = decode_execution("g1", &fields);
        assert!(execution.is_ok());
        let execution = execution.unwrap_or_else(|_| unreachable!());
        assert_eq!(execution.status, WorkflowExecutionStatus::Aborted);
        assert_eq!(execution.input.subject(), "alice@example.com");
    }

    #[test]
    fn incomplete_execution_hash_is_rejected() {
        let fields = HashMap::from([("status".to_owned(), "RUNNING".to_owned())]);
        assert!(matches!(
            decode_execution("g1", &fields),
            Err(AppError::Internal(message)) if message.contains("input")
        ));
    }

    #[test]
    fn keys_share_the_prefix() {
        let client = redis::Client::open("redis://127.0.0.1/");
        assert!(client.is_ok());
        let orchestrator = RedisWorkflowOrchestrator::new(
            client.unwrap_or_else(|_| unreachable!()),
            "warden",
        );
        assert_eq!(orchestrator.execution_key("g1"), "warden:execution:g1");
        assert_eq!(orchestrator.due_key(), "warden:due");
        assert_eq!(orchestrator.inflight_key(), "warden:inflight");
    }

    fn step(kind: WorkflowStepKind) -> WorkflowStep {
        let grant: Grant = serde_json::from_str(grant_json().as_str())
            .unwrap_or_else(|_| unreachable!());
        WorkflowStep {
            execution: "g1".to_owned(),
            kind,
            grant,
        }
    }

    #[test]
    fn transitioned_activation_schedules_deactivation_at_end() {
        let step = step(WorkflowStepKind::Activate);
        let (mode, score, member) = completion_args(&step, true);

        assert_eq!(mode, SCHEDULE_MODE);
        assert_eq!(score, step.grant.end().timestamp_millis());
        assert_eq!(member, "deactivate|g1");
    }

    #[test]
    fn untransitioned_steps_fail_the_execution() {
        for kind in [WorkflowStepKind::Activate, WorkflowStepKind::Deactivate] {
            let (mode, _, member) = completion_args(&step(kind), false);
            assert_eq!(mode, "FAILED");
            assert!(member.is_empty());
        }

        let (mode, _, _) = completion_args(&step(WorkflowStepKind::Deactivate), true);
        assert_eq!(mode, "SUCCEEDED");
    }

    #[test]
    fn lease_deadline_is_offset_from_claim_time() {
        let now = Utc::now();
        assert_eq!(
            lease_deadline(now, std::time::Duration::from_secs(300)),
            now.timestamp_millis() + 300_000
        );
        assert_eq!(lease_deadline(now, std::time::Duration::MAX), i64::MAX);
    }
}
