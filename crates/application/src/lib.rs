//! Application services and ports for the grant execution engine.

#![forbid(unsafe_code)]

mod distributed_runtime;
mod grant_lifecycle;
mod grant_service;
mod local_runtime;
mod provider_directory;
mod provider_ports;
mod provider_registry;
mod retry;
mod runtime_ports;
mod validation_engine;

#[cfg(test)]
mod test_support;

pub use distributed_runtime::{
    DistributedRuntime, GrantWorkflowHandler, StepOutcome, WorkflowStep, WorkflowStepKind,
};
pub use grant_lifecycle::GrantLifecycle;
pub use grant_service::{
    ConfigCheckReport, ConfigCheckStatus, ConfigValidationReport, GrantService,
};
pub use local_runtime::LocalRuntime;
pub use provider_directory::{
    ProviderDeployment, ProviderDirectory, ProviderEntry, ProviderSummary,
};
pub use provider_ports::{
    AccessTokener, Accessor, ArgDescriptor, ArgGroupDescriptor, ArgGroupOption, ArgOption,
    ArgOptioner, ArgOptions, ArgSchema, ArgSchemarer, ConfigField, ConfigLoader,
    ConfigValidationFn, ConfigValidationStep, ConfigValidationSteps, ConfigValidator,
    ConfigValues, ConfigurableProvider, Configurer, GrantValidationFn, GrantValidationStep,
    GrantValidationSteps, GrantValidator, Instructioner, Operationer, ProviderCapabilities,
    Validator,
};
pub use provider_registry::{
    ProviderFactory, ProviderRegistry, ProviderTypeSummary, RegisteredProvider, latest_version,
};
pub use retry::{
    FibonacciBackoff, RetryError, RetryPolicy, retry, retry_with_cancellation, retryable,
};
pub use runtime_ports::{
    EventBus, GrantRuntime, WorkflowExecution, WorkflowExecutionStatus, WorkflowOrchestrator,
    execution_name,
};
pub use validation_engine::{run_config_validations, run_grant_validations};
