//! Warden grant workflow worker.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_application::{
    ConfigurableProvider, EventBus, GrantLifecycle, GrantWorkflowHandler, ProviderDeployment,
    ProviderDirectory, ProviderRegistry, RetryPolicy, WorkflowOrchestrator, WorkflowStep,
    WorkflowStepKind,
};
use warden_core::{AppError, AppResult};
use warden_domain::Grant;
use warden_infrastructure::{
    HttpEventBus, MapConfigLoader, RedisStreamEventBus, RedisWorkflowOrchestrator,
    StepCompletion, TestVaultProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventBusKind {
    Redis,
    Webhook,
}

impl EventBusKind {
    fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "redis" => Ok(Self::Redis),
            "webhook" => Ok(Self::Webhook),
            other => Err(AppError::Validation(format!(
                "WARDEN_EVENT_BUS must be 'redis' or 'webhook', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DeploymentConfig {
    #[serde(default)]
    id: Option<String>,
    uses: String,
    #[serde(default)]
    with: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    redis_url: String,
    key_prefix: String,
    deployments: Vec<DeploymentConfig>,
    event_bus: EventBusKind,
    webhook_url: Option<String>,
    worker_id: String,
    claim_limit: usize,
    poll_interval_ms: u64,
    step_lease_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let registry = build_catalog(&http_client)?;
    let deployments = config
        .deployments
        .iter()
        .map(|deployment| ProviderDeployment {
            id: deployment.id.clone(),
            uses: deployment.uses.clone(),
            config: Arc::new(MapConfigLoader::new(deployment.with.clone())),
        })
        .collect();
    let providers = Arc::new(ProviderDirectory::build(&registry, deployments, &[]).await?);

    let event_bus = build_event_bus(&config, http_client, redis_client.clone())?;
    let orchestrator = RedisWorkflowOrchestrator::new(redis_client, config.key_prefix.as_str())
        .with_step_lease(Duration::from_secs(config.step_lease_secs));
    orchestrator.init().await?;

    let handler = GrantWorkflowHandler::new(GrantLifecycle::new(providers.clone(), event_bus));

    info!(
        worker_id = %config.worker_id,
        key_prefix = %config.key_prefix,
        providers = providers.entries().count(),
        claim_limit = config.claim_limit,
        poll_interval_ms = config.poll_interval_ms,
        step_lease_secs = config.step_lease_secs,
        "warden-worker started"
    );

    loop {
        match orchestrator
            .claim_due_steps(config.claim_limit, Utc::now())
            .await
        {
            Ok(steps) if steps.is_empty() => {
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
            Ok(steps) => {
                info!(
                    worker_id = %config.worker_id,
                    claimed_count = steps.len(),
                    "claimed workflow steps"
                );

                for step in steps {
                    run_step(&config, &orchestrator, &handler, step).await;
                }
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "failed to claim workflow steps"
                );
                tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)).await;
            }
        }
    }
}

async fn run_step(
    config: &WorkerConfig,
    orchestrator: &RedisWorkflowOrchestrator,
    handler: &GrantWorkflowHandler,
    step: WorkflowStep,
) {
    let grant_id = step.grant.id().to_owned();
    let outcome = handler.handle(step.clone()).await;

    match &outcome.result {
        Ok(()) => info!(
            worker_id = %config.worker_id,
            grant_id = %grant_id,
            step = step.kind.as_str(),
            status = %outcome.grant.status(),
            "workflow step executed"
        ),
        Err(error) if error.is_client_error() => warn!(
            worker_id = %config.worker_id,
            grant_id = %grant_id,
            step = step.kind.as_str(),
            error = %error,
            "workflow step rejected"
        ),
        Err(error) => error!(
            worker_id = %config.worker_id,
            grant_id = %grant_id,
            step = step.kind.as_str(),
            status = %outcome.grant.status(),
            transitioned = outcome.transitioned(),
            error = %error,
            "workflow step failed"
        ),
    }

    match orchestrator.complete_step(&step, &outcome).await {
        Ok(StepCompletion::Recorded) => {}
        Ok(StepCompletion::Superseded) => {
            if step.kind == WorkflowStepKind::Activate && outcome.transitioned() {
                withdraw_superseded(config, handler, &outcome.grant).await;
            }
        }
        Err(error) => warn!(
            worker_id = %config.worker_id,
            grant_id = %grant_id,
            error = %error,
            "failed to record workflow step"
        ),
    }
}

async fn withdraw_superseded(config: &WorkerConfig, handler: &GrantWorkflowHandler, grant: &Grant) {
    if let Err(error) = handler.withdraw(grant).await {
        warn!(
            worker_id = %config.worker_id,
            grant_id = %grant.id(),
            error = %error,
            "failed to withdraw access of revoked grant"
        );
    }
}

fn build_catalog(http_client: &reqwest::Client) -> AppResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    let client = http_client.clone();
    registry.register(
        "commonfate/testvault",
        "v1",
        "testvault",
        "Grants membership of a TestVault vault",
        Arc::new(move || -> Box<dyn ConfigurableProvider> {
            Box::new(TestVaultProvider::new(client.clone()))
        }),
    )?;

    Ok(registry)
}

fn build_event_bus(
    config: &WorkerConfig,
    http_client: reqwest::Client,
    redis_client: redis::Client,
) -> AppResult<Arc<dyn EventBus>> {
    match config.event_bus {
        EventBusKind::Redis => Ok(Arc::new(RedisStreamEventBus::new(
            redis_client,
            config.key_prefix.as_str(),
        ))),
        EventBusKind::Webhook => {
            let endpoint = config.webhook_url.clone().ok_or_else(|| {
                AppError::Validation(
                    "WARDEN_EVENT_WEBHOOK_URL is required when WARDEN_EVENT_BUS=webhook".to_owned(),
                )
            })?;
            Ok(Arc::new(HttpEventBus::new(
                http_client,
                endpoint,
                RetryPolicy::short(),
            )))
        }
    }
}

fn parse_deployments(raw: &str) -> AppResult<Vec<DeploymentConfig>> {
    let deployments: Vec<DeploymentConfig> = serde_json::from_str(raw).map_err(|error| {
        AppError::Validation(format!("invalid WARDEN_PROVIDERS value: {error}"))
    })?;

    if deployments.is_empty() {
        return Err(AppError::Validation(
            "WARDEN_PROVIDERS must list at least one provider".to_owned(),
        ));
    }

    Ok(deployments)
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let redis_url = required_env("REDIS_URL")?;
        let key_prefix = optional_env("WARDEN_REDIS_KEY_PREFIX").unwrap_or_else(|| "warden".to_owned());
        let deployments = parse_deployments(required_env("WARDEN_PROVIDERS")?.as_str())?;
        let event_bus = EventBusKind::parse(
            optional_env("WARDEN_EVENT_BUS")
                .as_deref()
                .unwrap_or("redis"),
        )?;
        let webhook_url = optional_env("WARDEN_EVENT_WEBHOOK_URL");
        let worker_id = optional_env("WARDEN_WORKER_ID")
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let claim_limit = parse_env_usize("WARDEN_CLAIM_LIMIT", 10)?;
        let poll_interval_ms = parse_env_u64("WARDEN_POLL_INTERVAL_MS", 1000)?;
        let step_lease_secs = parse_env_u64("WARDEN_STEP_LEASE_SECS", 300)?;

        if claim_limit == 0 {
            return Err(AppError::Validation(
                "WARDEN_CLAIM_LIMIT must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WARDEN_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        if step_lease_secs == 0 {
            return Err(AppError::Validation(
                "WARDEN_STEP_LEASE_SECS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            redis_url,
            key_prefix,
            deployments,
            event_bus,
            webhook_url,
            worker_id,
            claim_limit,
            poll_interval_ms,
            step_lease_secs,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    optional_env(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
