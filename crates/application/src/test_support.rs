use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use warden_core::{AppError, AppResult};
use warden_domain::{
    Diagnostics, Grant, GrantArgs, GrantCandidate, GrantEvent, ProviderType, ValidGrant,
};

use crate::provider_directory::{ProviderDirectory, ProviderEntry};
use crate::provider_ports::{
    Accessor, ArgDescriptor, ArgGroupDescriptor, ArgGroupOption, ArgOption, ArgOptioner,
    ArgOptions, ArgSchema, ArgSchemarer, ConfigField, ConfigLoader, ConfigValidationStep,
    ConfigValidationSteps, ConfigValidator, ConfigValues, ConfigurableProvider, Configurer,
    GrantValidationStep, GrantValidationSteps, GrantValidator, Instructioner, Operationer,
};
use crate::provider_registry::ProviderFactory;
use crate::runtime_ports::{
    EventBus, WorkflowExecution, WorkflowExecutionStatus, WorkflowOrchestrator,
};

#[derive(Debug, Default)]
pub struct FakeCalls {
    grants: AtomicUsize,
    revokes: AtomicUsize,
    abandoned: AtomicUsize,
}

impl FakeCalls {
    pub fn grants(&self) -> usize {
        self.grants.load(Ordering::SeqCst)
    }

    pub fn revokes(&self) -> usize {
        self.revokes.load(Ordering::SeqCst)
    }

    /// Provider calls dropped before they finished.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct AbandonedCall(Arc<FakeCalls>);

impl Drop for AbandonedCall {
    fn drop(&mut self) {
        self.0.abandoned.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory provider with every optional capability except `Validator` and `AccessTokener`.
#[derive(Clone, Default)]
pub struct FakeProvider {
    pub calls: Arc<FakeCalls>,
    pub fail_grant: bool,
    pub fail_revoke: bool,
    pub panic_on_grant: bool,
    pub hang_on_grant: bool,
    pub vault_prefix: Option<String>,
}

impl FakeProvider {
    pub fn configured() -> Self {
        Self {
            vault_prefix: Some("demo".to_owned()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Accessor for FakeProvider {
    async fn grant(&self, _subject: &str, _args: &GrantArgs, _grant_id: &str) -> AppResult<()> {
        if self.panic_on_grant {
            let outcome: Option<()> = None;
            outcome.unwrap_or_else(|| panic!("provider bug"));
        }

        self.calls.grants.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_grant {
            let _call = AbandonedCall(self.calls.clone());
            std::future::pending::<()>().await;
        }
        if self.fail_grant {
            return Err(AppError::External("vault unavailable".to_owned()));
        }
        Ok(())
    }

    async fn revoke(&self, _subject: &str, _args: &GrantArgs, _grant_id: &str) -> AppResult<()> {
        self.calls.revokes.fetch_add(1, Ordering::SeqCst);
        if self.fail_revoke {
            return Err(AppError::External("vault unavailable".to_owned()));
        }
        Ok(())
    }

    fn as_grant_validator(&self) -> Option<&dyn GrantValidator> {
        Some(self)
    }

    fn as_arg_schemarer(&self) -> Option<&dyn ArgSchemarer> {
        Some(self)
    }

    fn as_arg_optioner(&self) -> Option<&dyn ArgOptioner> {
        Some(self)
    }

    fn as_instructioner(&self) -> Option<&dyn Instructioner> {
        Some(self)
    }

    fn as_config_validator(&self) -> Option<&dyn ConfigValidator> {
        Some(self)
    }

    fn as_operationer(&self) -> Option<&dyn Operationer> {
        Some(self)
    }
}

impl GrantValidator for FakeProvider {
    fn grant_validation_steps(&self) -> GrantValidationSteps {
        let mut steps = GrantValidationSteps::new();
        steps.insert(
            "vault-exists".to_owned(),
            GrantValidationStep::new(
                "Vault exists",
                "the vault could not be found",
                |_subject, args: GrantArgs| async move {
                    match args.get("vault").map(String::as_str) {
                        Some("missing") => Diagnostics::error_from("vault missing does not exist"),
                        _ => Diagnostics::info("vault found"),
                    }
                },
            ),
        );
        steps.insert(
            "subject-allowed".to_owned(),
            GrantValidationStep::new(
                "Subject is allowed",
                "the subject may not use this vault",
                |subject: String, _args| async move {
                    if subject == "blocked@example.com" {
                        Diagnostics::error_from("subject is blocked")
                    } else {
                        Diagnostics::info("subject allowed")
                    }
                },
            ),
        );
        steps
    }
}

impl ArgSchemarer for FakeProvider {
    fn arg_schema(&self) -> ArgSchema {
        ArgSchema::default().with_arg(
            ArgDescriptor::required("vault", "Vault")
                .with_options()
                .with_group(ArgGroupDescriptor {
                    id: "team".to_owned(),
                    title: "Team".to_owned(),
                    description: None,
                }),
        )
    }
}

#[async_trait]
impl ArgOptioner for FakeProvider {
    async fn options(&self, arg_id: &str) -> AppResult<ArgOptions> {
        if arg_id != "vault" {
            return Err(AppError::InvalidArgument {
                argument: arg_id.to_owned(),
                reason: "argument has no options".to_owned(),
            });
        }

        let option = |value: &str| ArgOption {
            value: value.to_owned(),
            label: value.to_uppercase(),
            description: None,
        };
        let mut options = ArgOptions {
            options: vec![option("alpha"), option("beta"), option("gamma")],
            ..ArgOptions::default()
        };
        options.groups.insert(
            "team".to_owned(),
            vec![
                ArgGroupOption {
                    value: "platform".to_owned(),
                    label: "Platform".to_owned(),
                    children: vec!["alpha".to_owned(), "beta".to_owned()],
                },
                ArgGroupOption {
                    value: "data".to_owned(),
                    label: "Data".to_owned(),
                    children: vec!["gamma".to_owned()],
                },
            ],
        );
        Ok(options)
    }
}

#[async_trait]
impl Instructioner for FakeProvider {
    async fn instructions(
        &self,
        subject: &str,
        args: &GrantArgs,
        _grant_id: &str,
    ) -> AppResult<String> {
        let vault = args.get("vault").map(String::as_str).unwrap_or_default();
        Ok(format!("{subject} can now open vault {vault}"))
    }
}

impl ConfigValidator for FakeProvider {
    fn config_validation_steps(&self) -> ConfigValidationSteps {
        let prefix = self.vault_prefix.clone();
        let mut steps = ConfigValidationSteps::new();
        steps.insert(
            "prefix-set".to_owned(),
            ConfigValidationStep::new(
                "Vault prefix is set",
                "set vault_prefix to a non-empty value",
                &["vault_prefix"],
                move || {
                    let prefix = prefix.clone();
                    async move {
                        match prefix {
                            Some(prefix) if !prefix.is_empty() => {
                                Diagnostics::info(format!("using prefix {prefix}"))
                            }
                            _ => Diagnostics::error_from("vault_prefix is empty"),
                        }
                    }
                },
            ),
        );
        steps
    }
}

#[async_trait]
impl Operationer for FakeProvider {
    fn operations(&self) -> Vec<String> {
        vec!["echo".to_owned()]
    }

    async fn invoke_operation(&self, operation: &str, payload: Value) -> AppResult<Value> {
        match operation {
            "echo" => Ok(payload),
            other => Err(AppError::Validation(format!("unknown operation '{other}'"))),
        }
    }
}

#[async_trait]
impl Configurer for FakeProvider {
    fn config_fields(&self) -> Vec<ConfigField> {
        vec![ConfigField::required("vault_prefix", "Prefix for vault names")]
    }

    fn load_config(&mut self, values: &ConfigValues) -> AppResult<()> {
        self.vault_prefix = Some(values.require("vault_prefix")?.to_owned());
        Ok(())
    }
}

pub fn fake_factory<F>(build: F) -> ProviderFactory
where
    F: Fn() -> FakeProvider + Send + Sync + 'static,
{
    Arc::new(move || -> Box<dyn ConfigurableProvider> { Box::new(build()) })
}

pub fn directory_with(provider: FakeProvider) -> Arc<ProviderDirectory> {
    let mut directory = ProviderDirectory::new();
    let provider_type =
        ProviderType::parse("commonfate/testvault").unwrap_or_else(|_| unreachable!());
    let inserted = directory.insert(ProviderEntry::new(
        "testvault",
        provider_type,
        "v1",
        "Test vault",
        Arc::new(provider),
    ));
    assert!(inserted.is_ok());
    Arc::new(directory)
}

pub struct StaticConfigLoader(pub ConfigValues);

#[async_trait]
impl ConfigLoader for StaticConfigLoader {
    async fn load(&self, fields: &[ConfigField]) -> AppResult<ConfigValues> {
        self.0.clone().resolve(fields)
    }
}

#[derive(Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<GrantEvent>>,
    failing: AtomicBool,
}

impl RecordingEventBus {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<GrantEvent> {
        self.events.lock().await.clone()
    }

    pub async fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| event.kind.event_type())
            .collect()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: GrantEvent) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::External("event bus offline".to_owned()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOrchestrator {
    executions: Mutex<HashMap<String, WorkflowExecution>>,
    stops: AtomicUsize,
}

impl FakeOrchestrator {
    pub async fn set_status(&self, name: &str, status: WorkflowExecutionStatus) {
        if let Some(execution) = self.executions.lock().await.get_mut(name) {
            execution.status = status;
        }
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowOrchestrator for FakeOrchestrator {
    async fn start_execution(&self, name: &str, input: &Grant) -> AppResult<()> {
        let mut executions = self.executions.lock().await;
        if executions.contains_key(name) {
            return Err(AppError::Conflict(format!(
                "execution '{name}' already exists"
            )));
        }

        executions.insert(
            name.to_owned(),
            WorkflowExecution {
                name: name.to_owned(),
                status: WorkflowExecutionStatus::Running,
                input: input.clone(),
                started_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn describe_execution(&self, name: &str) -> AppResult<Option<WorkflowExecution>> {
        Ok(self.executions.lock().await.get(name).cloned())
    }

    async fn stop_execution(&self, name: &str) -> AppResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        match self.executions.lock().await.get_mut(name) {
            Some(execution) => {
                execution.status = WorkflowExecutionStatus::Aborted;
                Ok(())
            }
            None => Err(AppError::NotFound(format!("execution '{name}' not found"))),
        }
    }
}

pub fn vault_args(vault: &str) -> GrantArgs {
    GrantArgs::from([("vault".to_owned(), vault.to_owned())])
}

pub fn window(start_in: Duration, end_in: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now + start_in, now + end_in)
}

pub fn valid_grant(id: &str, start_in: Duration, end_in: Duration) -> ValidGrant {
    let (start, end) = window(start_in, end_in);
    let mut candidate =
        GrantCandidate::new("testvault", "alice@example.com", vault_args("alpha"), start, end);
    candidate.id = id.to_owned();
    candidate
        .validate(Utc::now())
        .unwrap_or_else(|_| unreachable!())
}
