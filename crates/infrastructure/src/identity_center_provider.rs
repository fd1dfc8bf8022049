//! Permission set assignments in an AWS IAM Identity Center style API.
//!
//! Assignment writes are asynchronous and eventually consistent: creation and
//! deletion return a request that must be polled until it leaves
//! `IN_PROGRESS`, and a write issued right after another write to the same
//! assignment may be rejected with a conflict. Both are retried under a
//! Fibonacci backoff; every other API error is terminal.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info};
use warden_application::{
    Accessor, ArgDescriptor, ArgOption, ArgOptioner, ArgOptions, ArgSchema, ArgSchemarer,
    ConfigField, ConfigValidationStep, ConfigValidationSteps, ConfigValidator, ConfigValues,
    Configurer, GrantValidationStep, GrantValidationSteps, GrantValidator, Instructioner,
    RetryError, RetryPolicy, Validator, retry, retryable,
};
use warden_core::{AppError, AppResult};
use warden_domain::{Diagnostics, GrantArgs};

mod api;

pub use api::{
    AccountAssignment, AssignmentOperation, AssignmentStatus, IdentityCenterApi, PermissionSet,
    SsoAccount, SsoApiError, SsoUser,
};

const ACCOUNT_ARG: &str = "accountId";
const PERMISSION_SET_ARG: &str = "permissionSetArn";
const DESCRIBE_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
struct IdentityCenterConfig {
    instance_arn: String,
    identity_store_id: String,
    portal_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignmentChange {
    Creation,
    Deletion,
}

/// Grants a permission set in one account to one user.
#[derive(Clone)]
pub struct IdentityCenterProvider {
    api: Arc<dyn IdentityCenterApi>,
    config: Option<IdentityCenterConfig>,
    policy: RetryPolicy,
}

impl IdentityCenterProvider {
    /// Creates an unconfigured provider over an API client.
    #[must_use]
    pub fn new(api: Arc<dyn IdentityCenterApi>) -> Self {
        Self {
            api,
            config: None,
            policy: RetryPolicy::standard(),
        }
    }

    /// Replaces the retry policy used for conflicts and polling.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn config(&self) -> AppResult<&IdentityCenterConfig> {
        self.config.as_ref().ok_or_else(|| {
            AppError::Internal("identity center provider is not configured".to_owned())
        })
    }

    async fn find_user(&self, subject: &str) -> AppResult<SsoUser> {
        let config = self.config()?;
        self.api
            .find_user(config.identity_store_id.as_str(), subject)
            .await
            .map_err(external)?
            .ok_or_else(|| {
                AppError::External(format!(
                    "could not find user '{subject}' in the identity store"
                ))
            })
    }

    async fn assignment(&self, subject: &str, args: &GrantArgs) -> AppResult<AccountAssignment> {
        let account_id = required_arg(args, ACCOUNT_ARG)?;
        let permission_set_arn = required_arg(args, PERMISSION_SET_ARG)?;
        let user = self.find_user(subject).await?;

        Ok(AccountAssignment {
            instance_arn: self.config()?.instance_arn.clone(),
            permission_set_arn: permission_set_arn.to_owned(),
            account_id: account_id.to_owned(),
            principal_id: user.id,
        })
    }

    /// Issues a write, retrying while it conflicts with a recent write.
    async fn write_assignment(
        &self,
        assignment: &AccountAssignment,
        change: AssignmentChange,
    ) -> AppResult<AssignmentOperation> {
        let api = self.api.as_ref();
        retry(&self.policy, || async move {
            let result = match change {
                AssignmentChange::Creation => api.create_account_assignment(assignment).await,
                AssignmentChange::Deletion => api.delete_account_assignment(assignment).await,
            };
            match (result, change) {
                (Ok(operation), _) => Ok(operation),
                // Nothing left to delete.
                (Err(SsoApiError::NotFound(_)), AssignmentChange::Deletion) => {
                    Ok(AssignmentOperation {
                        request_id: String::new(),
                        status: AssignmentStatus::Succeeded,
                    })
                }
                (Err(error @ SsoApiError::Conflict(_)), _) => Err(retryable(external(error))),
                (Err(error), _) => Err(RetryError::Fatal(external(error))),
            }
        })
        .await
    }

    /// Polls an asynchronous write until it leaves `IN_PROGRESS`.
    async fn await_completion(
        &self,
        operation: AssignmentOperation,
        change: AssignmentChange,
    ) -> AppResult<()> {
        let instance_arn = self.config()?.instance_arn.as_str();
        let api = self.api.as_ref();
        let request_id = operation.request_id.as_str();

        if let Some(outcome) = settled(&operation.status) {
            return outcome;
        }

        retry(&self.policy, || async move {
            let current = match change {
                AssignmentChange::Creation => {
                    api.describe_assignment_creation(instance_arn, request_id).await
                }
                AssignmentChange::Deletion => {
                    api.describe_assignment_deletion(instance_arn, request_id).await
                }
            }
            .map_err(|error| RetryError::Fatal(external(error)))?;

            match settled(&current.status) {
                Some(outcome) => outcome.map_err(RetryError::Fatal),
                None => Err(retryable(AppError::External(format!(
                    "assignment request '{request_id}' is still in progress"
                )))),
            }
        })
        .await
    }

    async fn permission_set_options(&self) -> AppResult<Vec<ArgOption>> {
        let instance_arn = self.config()?.instance_arn.clone();
        let arns = self
            .api
            .list_permission_sets(instance_arn.as_str())
            .await
            .map_err(external)?;

        let described = Arc::new(Mutex::new(Vec::with_capacity(arns.len())));
        let api = self.api.as_ref();
        stream::iter(arns)
            .for_each_concurrent(DESCRIBE_CONCURRENCY, |arn| {
                let described = described.clone();
                let instance_arn = instance_arn.as_str();
                async move {
                    let result = api.describe_permission_set(instance_arn, arn.as_str()).await;
                    described.lock().await.push(result);
                }
            })
            .await;

        let described = std::mem::take(&mut *described.lock().await);
        let mut options = described
            .into_iter()
            .map(|result| {
                result.map(|permission_set| ArgOption {
                    value: permission_set.arn,
                    label: permission_set.name,
                    description: permission_set.description,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(external)?;

        options.sort_by(|left, right| left.label.cmp(&right.label));
        Ok(options)
    }
}

fn external(error: SsoApiError) -> AppError {
    AppError::External(error.to_string())
}

fn settled(status: &AssignmentStatus) -> Option<AppResult<()>> {
    match status {
        AssignmentStatus::InProgress => None,
        AssignmentStatus::Succeeded => Some(Ok(())),
        AssignmentStatus::Failed(reason) => Some(Err(AppError::External(reason.clone()))),
    }
}

fn required_arg<'a>(args: &'a GrantArgs, key: &str) -> AppResult<&'a str> {
    args.get(key)
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::InvalidArgument {
            argument: key.to_owned(),
            reason: "required argument is missing".to_owned(),
        })
}

#[async_trait]
impl Accessor for IdentityCenterProvider {
    async fn grant(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()> {
        let assignment = self.assignment(subject, args).await?;
        let operation = self
            .write_assignment(&assignment, AssignmentChange::Creation)
            .await?;
        self.await_completion(operation, AssignmentChange::Creation)
            .await?;

        info!(
            grant_id = %grant_id,
            account_id = %assignment.account_id,
            permission_set = %assignment.permission_set_arn,
            "account assignment created"
        );
        Ok(())
    }

    async fn revoke(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()> {
        let assignment = self.assignment(subject, args).await?;
        let operation = self
            .write_assignment(&assignment, AssignmentChange::Deletion)
            .await?;
        if operation.request_id.is_empty() {
            debug!(grant_id = %grant_id, "account assignment already removed");
            return Ok(());
        }
        self.await_completion(operation, AssignmentChange::Deletion)
            .await?;

        info!(
            grant_id = %grant_id,
            account_id = %assignment.account_id,
            permission_set = %assignment.permission_set_arn,
            "account assignment deleted"
        );
        Ok(())
    }

    fn as_validator(&self) -> Option<&dyn Validator> {
        Some(self)
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
}

#[async_trait]
impl Validator for IdentityCenterProvider {
    async fn validate(&self, subject: &str, args: &GrantArgs) -> AppResult<()> {
        let assignment = self.assignment(subject, args).await?;
        self.api
            .describe_permission_set(
                assignment.instance_arn.as_str(),
                assignment.permission_set_arn.as_str(),
            )
            .await
            .map_err(external)?;
        Ok(())
    }
}

impl GrantValidator for IdentityCenterProvider {
    fn grant_validation_steps(&self) -> GrantValidationSteps {
        let mut steps = GrantValidationSteps::new();

        let provider = self.clone();
        steps.insert(
            "user-exists".to_owned(),
            GrantValidationStep::new(
                "The user exists in the identity store",
                "the user must be provisioned in the identity store before access can be granted",
                move |subject: String, _args| {
                    let provider = provider.clone();
                    async move {
                        match provider.find_user(subject.as_str()).await {
                            Ok(user) => Diagnostics::info(format!("found user {}", user.id)),
                            Err(error) => Diagnostics::error_from(error),
                        }
                    }
                },
            ),
        );

        let provider = self.clone();
        steps.insert(
            "permission-set-exists".to_owned(),
            GrantValidationStep::new(
                "The permission set exists",
                "choose a permission set that exists in the identity center instance",
                move |_subject, args: GrantArgs| {
                    let provider = provider.clone();
                    async move {
                        let instance_arn = match provider.config() {
                            Ok(config) => config.instance_arn.clone(),
                            Err(error) => return Diagnostics::error_from(error),
                        };
                        let arn = match required_arg(&args, PERMISSION_SET_ARG) {
                            Ok(arn) => arn,
                            Err(error) => return Diagnostics::error_from(error),
                        };
                        match provider
                            .api
                            .describe_permission_set(instance_arn.as_str(), arn)
                            .await
                        {
                            Ok(permission_set) => Diagnostics::info(format!(
                                "found permission set {}",
                                permission_set.name
                            )),
                            Err(error) => Diagnostics::error_from(error),
                        }
                    }
                },
            ),
        );

        steps
    }
}

impl ArgSchemarer for IdentityCenterProvider {
    fn arg_schema(&self) -> ArgSchema {
        ArgSchema::default()
            .with_arg(ArgDescriptor::required(ACCOUNT_ARG, "Account").with_options())
            .with_arg(
                ArgDescriptor::required(PERMISSION_SET_ARG, "Permission Set")
                    .described("The permission set to assign")
                    .with_options(),
            )
    }
}

#[async_trait]
impl ArgOptioner for IdentityCenterProvider {
    async fn options(&self, arg_id: &str) -> AppResult<ArgOptions> {
        let options = match arg_id {
            ACCOUNT_ARG => {
                let mut accounts = self.api.list_accounts().await.map_err(external)?;
                accounts.sort_by(|left, right| left.name.cmp(&right.name));
                accounts
                    .into_iter()
                    .map(|account| ArgOption {
                        value: account.id,
                        label: account.name,
                        description: None,
                    })
                    .collect()
            }
            PERMISSION_SET_ARG => self.permission_set_options().await?,
            other => {
                return Err(AppError::InvalidArgument {
                    argument: other.to_owned(),
                    reason: "argument has no options".to_owned(),
                });
            }
        };

        Ok(ArgOptions {
            options,
            ..ArgOptions::default()
        })
    }
}

#[async_trait]
impl Instructioner for IdentityCenterProvider {
    async fn instructions(
        &self,
        _subject: &str,
        args: &GrantArgs,
        _grant_id: &str,
    ) -> AppResult<String> {
        let account_id = required_arg(args, ACCOUNT_ARG)?;
        let portal = self
            .config()?
            .portal_url
            .as_deref()
            .unwrap_or("your AWS access portal");
        Ok(format!(
            "Sign in to {portal} and choose account {account_id}. The role may take a minute to appear."
        ))
    }
}

impl ConfigValidator for IdentityCenterProvider {
    fn config_validation_steps(&self) -> ConfigValidationSteps {
        let mut steps = ConfigValidationSteps::new();

        let provider = self.clone();
        steps.insert(
            "list-permission-sets".to_owned(),
            ConfigValidationStep::new(
                "Permission sets can be listed",
                "grant the broker permission to list permission sets of the instance",
                &["instance_arn"],
                move || {
                    let provider = provider.clone();
                    async move {
                        let instance_arn = match provider.config() {
                            Ok(config) => config.instance_arn.clone(),
                            Err(error) => return Diagnostics::error_from(error),
                        };
                        match provider.api.list_permission_sets(instance_arn.as_str()).await {
                            Ok(arns) => {
                                Diagnostics::info(format!("found {} permission sets", arns.len()))
                            }
                            Err(error) => Diagnostics::error_from(error),
                        }
                    }
                },
            ),
        );

        let provider = self.clone();
        steps.insert(
            "list-accounts".to_owned(),
            ConfigValidationStep::new(
                "Organization accounts can be listed",
                "grant the broker permission to list organization accounts",
                &[],
                move || {
                    let provider = provider.clone();
                    async move {
                        match provider.api.list_accounts().await {
                            Ok(accounts) => {
                                Diagnostics::info(format!("found {} accounts", accounts.len()))
                            }
                            Err(error) => Diagnostics::error_from(error),
                        }
                    }
                },
            ),
        );

        steps
    }
}

#[async_trait]
impl Configurer for IdentityCenterProvider {
    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::required("instance_arn", "Identity center instance ARN"),
            ConfigField::required("identity_store_id", "Identity store ID"),
            ConfigField::optional("portal_url", "Access portal URL shown to users", None),
        ]
    }

    fn load_config(&mut self, values: &ConfigValues) -> AppResult<()> {
        self.config = Some(IdentityCenterConfig {
            instance_arn: values.require("instance_arn")?.to_owned(),
            identity_store_id: values.require("identity_store_id")?.to_owned(),
            portal_url: values.get("portal_url").map(ToOwned::to_owned),
        });
        Ok(())
    }
}
