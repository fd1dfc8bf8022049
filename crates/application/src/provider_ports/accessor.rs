use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use warden_core::AppResult;
use warden_domain::GrantArgs;

use super::arguments::{ArgOptions, ArgSchema};
use super::config::{ConfigField, ConfigValues};
use super::validation_steps::{ConfigValidationSteps, GrantValidationSteps};

/// Minimal contract every provider satisfies.
///
/// Both calls must tolerate retries: granting twice for the same
/// `(subject, args, grant_id)` creates nothing new, and revoking access that
/// is already partly gone succeeds.
///
/// Optional capabilities are exposed through the `as_*` queries, which return
/// `None` unless the provider opts in.
#[async_trait]
pub trait Accessor: Send + Sync {
    /// Provisions access for `subject`.
    async fn grant(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()>;

    /// Removes access for `subject`.
    async fn revoke(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()>;

    /// Request satisfiability checks.
    fn as_validator(&self) -> Option<&dyn Validator> {
        None
    }

    /// Named pre-flight checks run by the validation engine.
    fn as_grant_validator(&self) -> Option<&dyn GrantValidator> {
        None
    }

    /// Argument schema description.
    fn as_arg_schemarer(&self) -> Option<&dyn ArgSchemarer> {
        None
    }

    /// Argument value enumeration.
    fn as_arg_optioner(&self) -> Option<&dyn ArgOptioner> {
        None
    }

    /// Post-grant guidance for the subject.
    fn as_instructioner(&self) -> Option<&dyn Instructioner> {
        None
    }

    /// Configuration health checks.
    fn as_config_validator(&self) -> Option<&dyn ConfigValidator> {
        None
    }

    /// Custom named operations.
    fn as_operationer(&self) -> Option<&dyn Operationer> {
        None
    }

    /// Access-token precondition.
    fn as_access_tokener(&self) -> Option<&dyn AccessTokener> {
        None
    }

    /// Summarises which optional capabilities this provider implements.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            validate: self.as_validator().is_some(),
            grant_validation: self.as_grant_validator().is_some(),
            arg_schema: self.as_arg_schemarer().is_some(),
            arg_options: self.as_arg_optioner().is_some(),
            instructions: self.as_instructioner().is_some(),
            config_validation: self.as_config_validator().is_some(),
            operations: self.as_operationer().is_some(),
            access_token: self.as_access_tokener().is_some(),
        }
    }
}

/// Optional capability flags of one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    /// Implements [`Validator`].
    pub validate: bool,
    /// Implements [`GrantValidator`].
    pub grant_validation: bool,
    /// Implements [`ArgSchemarer`].
    pub arg_schema: bool,
    /// Implements [`ArgOptioner`].
    pub arg_options: bool,
    /// Implements [`Instructioner`].
    pub instructions: bool,
    /// Implements [`ConfigValidator`].
    pub config_validation: bool,
    /// Implements [`Operationer`].
    pub operations: bool,
    /// Implements [`AccessTokener`].
    pub access_token: bool,
}

/// Checks whether a request could be satisfied without granting it.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Returns an error describing why the request cannot be satisfied.
    async fn validate(&self, subject: &str, args: &GrantArgs) -> AppResult<()>;
}

/// Supplies named checks that run concurrently before a grant is requested.
pub trait GrantValidator: Send + Sync {
    /// Returns checks keyed by stable step identifier.
    fn grant_validation_steps(&self) -> GrantValidationSteps;
}

/// Describes the shape of grant arguments.
pub trait ArgSchemarer: Send + Sync {
    /// Returns the argument schema.
    fn arg_schema(&self) -> ArgSchema;
}

/// Enumerates valid values of grant arguments.
#[async_trait]
pub trait ArgOptioner: Send + Sync {
    /// Lists options for one argument.
    async fn options(&self, arg_id: &str) -> AppResult<ArgOptions>;
}

/// Renders human-readable access instructions.
#[async_trait]
pub trait Instructioner: Send + Sync {
    /// Returns guidance for using a provisioned grant.
    async fn instructions(&self, subject: &str, args: &GrantArgs, grant_id: &str)
    -> AppResult<String>;
}

/// Supplies configuration health checks independent of any grant.
pub trait ConfigValidator: Send + Sync {
    /// Returns checks keyed by stable step identifier.
    fn config_validation_steps(&self) -> ConfigValidationSteps;
}

/// Exposes custom named operations beyond grant and revoke.
#[async_trait]
pub trait Operationer: Send + Sync {
    /// Lists the supported operation names.
    fn operations(&self) -> Vec<String>;

    /// Invokes one operation with a JSON payload.
    async fn invoke_operation(&self, operation: &str, payload: Value) -> AppResult<Value>;
}

/// Signals that the subject must hold a valid session token before granting.
pub trait AccessTokener: Send + Sync {
    /// Returns true when a token is required.
    fn requires_access_token(&self) -> bool;
}

/// Configuration lifecycle run before a provider serves requests.
#[async_trait]
pub trait Configurer: Send + Sync {
    /// Declares the configuration keys the provider reads.
    fn config_fields(&self) -> Vec<ConfigField>;

    /// Applies loaded configuration values.
    fn load_config(&mut self, values: &ConfigValues) -> AppResult<()>;

    /// Performs one-time setup such as building API clients.
    async fn init(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// A provider that can be configured and then shared as an [`Accessor`].
pub trait ConfigurableProvider: Accessor + Configurer {
    /// Converts the configured provider into a shared accessor.
    fn into_accessor(self: Box<Self>) -> Arc<dyn Accessor>;
}

impl<T> ConfigurableProvider for T
where
    T: Accessor + Configurer + 'static,
{
    fn into_accessor(self: Box<Self>) -> Arc<dyn Accessor> {
        let accessor: Box<dyn Accessor> = self;
        Arc::from(accessor)
    }
}
