use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use warden_core::{AppError, AppResult, Cancellation};
use warden_domain::{
    DiagnosticLog, Diagnostics, Grant, GrantArgs, GrantCandidate, ProviderRef, ValidationResult,
    ValidationResults,
};

use crate::provider_directory::{ProviderDirectory, ProviderEntry, ProviderSummary};
use crate::provider_ports::{ArgOptions, ArgSchema, ConfigValues};
use crate::provider_registry::{ProviderRegistry, ProviderTypeSummary};
use crate::runtime_ports::GrantRuntime;
use crate::validation_engine::{run_config_validations, run_grant_validations};

mod arguments;
mod config_validation;
mod grants;

use arguments::check_arguments;

pub use config_validation::{ConfigCheckReport, ConfigCheckStatus, ConfigValidationReport};

/// Inbound operations consumed by an API layer.
#[derive(Clone)]
pub struct GrantService {
    runtime: Arc<dyn GrantRuntime>,
    providers: Arc<ProviderDirectory>,
    registry: Arc<ProviderRegistry>,
}

impl GrantService {
    /// Creates a service.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn GrantRuntime>,
        providers: Arc<ProviderDirectory>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            runtime,
            providers,
            registry,
        }
    }

    /// Lists deployed providers ordered by ID.
    #[must_use]
    pub fn list_providers(&self) -> Vec<ProviderSummary> {
        self.providers.entries().map(ProviderEntry::summary).collect()
    }

    /// Lists catalog provider types and versions.
    #[must_use]
    pub fn list_provider_types(&self) -> Vec<ProviderTypeSummary> {
        self.registry
            .list()
            .into_iter()
            .map(|registered| registered.summary())
            .collect()
    }

    /// Invokes a custom provider operation.
    pub async fn invoke_provider_operation(
        &self,
        provider_id: &str,
        operation: &str,
        payload: Value,
    ) -> AppResult<Value> {
        let entry = self.providers.get(provider_id)?;
        let operationer = entry.accessor().as_operationer().ok_or_else(|| {
            AppError::Validation(format!(
                "provider '{provider_id}' does not expose custom operations"
            ))
        })?;

        if !operationer
            .operations()
            .iter()
            .any(|supported| supported == operation)
        {
            return Err(AppError::NotFound(format!(
                "operation '{operation}' is not supported by provider '{provider_id}'"
            )));
        }

        debug!(provider = %provider_id, operation, "invoking provider operation");
        operationer.invoke_operation(operation, payload).await
    }
}

#[cfg(test)]
mod tests;
