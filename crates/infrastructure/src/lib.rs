//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod env_config_loader;
mod http_event_bus;
mod identity_center_provider;
mod map_config_loader;
mod redis_stream_event_bus;
mod redis_workflow_orchestrator;
mod testvault_provider;

pub use env_config_loader::{EnvConfigLoader, EnvLookup, process_env};
pub use http_event_bus::HttpEventBus;
pub use identity_center_provider::{
    AccountAssignment, AssignmentOperation, AssignmentStatus, IdentityCenterApi,
    IdentityCenterProvider, PermissionSet, SsoAccount, SsoApiError, SsoUser,
};
pub use map_config_loader::MapConfigLoader;
pub use redis_stream_event_bus::RedisStreamEventBus;
pub use redis_workflow_orchestrator::{RedisWorkflowOrchestrator, StepCompletion};
pub use testvault_provider::TestVaultProvider;
