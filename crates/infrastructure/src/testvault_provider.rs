//! Provider for the TestVault membership API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};
use tracing::debug;
use warden_application::{
    Accessor, ArgDescriptor, ArgSchema, ArgSchemarer, ConfigField, ConfigValidationStep,
    ConfigValidationSteps, ConfigValidator, ConfigValues, Configurer, Instructioner, Operationer,
};
use warden_core::{AppError, AppResult};
use warden_domain::{Diagnostics, GrantArgs};

const DEFAULT_API_URL: &str = "https://prod.testvault.granted.run";
const CHECK_MEMBERSHIP: &str = "check_membership";

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestVaultConfig {
    api_url: String,
    unique_id: String,
}

/// Grants membership of a TestVault vault.
///
/// Vault names are namespaced by the deployment's `unique_id` so several
/// deployments can share one TestVault instance.
#[derive(Clone, Default)]
pub struct TestVaultProvider {
    http_client: reqwest::Client,
    config: Option<TestVaultConfig>,
}

impl TestVaultProvider {
    /// Creates an unconfigured provider.
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            config: None,
        }
    }

    fn config(&self) -> AppResult<&TestVaultConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| AppError::Internal("testvault provider is not configured".to_owned()))
    }

    fn membership_url(&self, vault: &str, member: &str) -> AppResult<Url> {
        let config = self.config()?;
        let mut url = parse_api_url(&config.api_url)?;
        url.path_segments_mut()
            .map_err(|()| {
                AppError::Internal(format!(
                    "testvault api_url '{}' cannot carry a path",
                    config.api_url
                ))
            })?
            .pop_if_empty()
            .push("vaults")
            .push(&format!("{}_{vault}", config.unique_id))
            .push("members")
            .push(member);
        Ok(url)
    }

    async fn send(&self, method: Method, vault: &str, member: &str) -> AppResult<StatusCode> {
        let url = self.membership_url(vault, member)?;
        let response = self
            .http_client
            .request(method.clone(), url.clone())
            .send()
            .await
            .map_err(|error| {
                AppError::External(format!("testvault request {method} {url} failed: {error}"))
            })?;

        debug!(method = %method, url = %url, status = %response.status(), "testvault response");
        Ok(response.status())
    }

    async fn is_member(&self, vault: &str, member: &str) -> AppResult<bool> {
        match self.send(Method::GET, vault, member).await? {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::External(format!(
                "testvault membership check returned {status}"
            ))),
        }
    }
}

fn vault_arg(args: &GrantArgs) -> AppResult<&str> {
    args.get("vault")
        .map(String::as_str)
        .filter(|vault| !vault.trim().is_empty())
        .ok_or_else(|| AppError::InvalidArgument {
            argument: "vault".to_owned(),
            reason: "required argument is missing".to_owned(),
        })
}

#[async_trait]
impl Accessor for TestVaultProvider {
    async fn grant(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()> {
        let vault = vault_arg(args)?;
        let status = self.send(Method::PUT, vault, subject).await?;
        if !status.is_success() {
            return Err(AppError::External(format!(
                "testvault refused membership for grant '{grant_id}': {status}"
            )));
        }
        Ok(())
    }

    async fn revoke(&self, subject: &str, args: &GrantArgs, grant_id: &str) -> AppResult<()> {
        let vault = vault_arg(args)?;
        match self.send(Method::DELETE, vault, subject).await? {
            status if status.is_success() => Ok(()),
            // Already removed.
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(AppError::External(format!(
                "testvault failed to remove membership for grant '{grant_id}': {status}"
            ))),
        }
    }

    fn as_arg_schemarer(&self) -> Option<&dyn ArgSchemarer> {
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

impl ArgSchemarer for TestVaultProvider {
    fn arg_schema(&self) -> ArgSchema {
        ArgSchema::default().with_arg(
            ArgDescriptor::required("vault", "Vault").described("The vault to grant access to"),
        )
    }
}

#[async_trait]
impl Instructioner for TestVaultProvider {
    async fn instructions(
        &self,
        subject: &str,
        args: &GrantArgs,
        _grant_id: &str,
    ) -> AppResult<String> {
        let url = self.membership_url(vault_arg(args)?, subject)?;
        Ok(format!(
            "Your membership is active. Confirm it with:\n\ncurl {url}"
        ))
    }
}

impl ConfigValidator for TestVaultProvider {
    fn config_validation_steps(&self) -> ConfigValidationSteps {
        let provider = self.clone();
        let mut steps = ConfigValidationSteps::new();
        steps.insert(
            "api-reachable".to_owned(),
            ConfigValidationStep::new(
                "TestVault API is reachable",
                "check that api_url points at a running TestVault instance",
                &["api_url", "unique_id"],
                move || {
                    let provider = provider.clone();
                    async move {
                        match provider.send(Method::GET, "config-check", "healthcheck").await {
                            Ok(status) if !status.is_server_error() => {
                                Diagnostics::info(format!("TestVault answered with {status}"))
                            }
                            Ok(status) => Diagnostics::error_from(format!(
                                "TestVault answered with {status}"
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

#[async_trait]
impl Operationer for TestVaultProvider {
    fn operations(&self) -> Vec<String> {
        vec![CHECK_MEMBERSHIP.to_owned()]
    }

    async fn invoke_operation(&self, operation: &str, payload: Value) -> AppResult<Value> {
        if operation != CHECK_MEMBERSHIP {
            return Err(AppError::NotFound(format!(
                "testvault has no operation '{operation}'"
            )));
        }

        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "{CHECK_MEMBERSHIP} payload requires string field '{key}'"
                    ))
                })
        };
        let vault = field("vault")?;
        let subject = field("subject")?;

        let member = self.is_member(vault.as_str(), subject.as_str()).await?;
        Ok(json!({ "vault": vault, "subject": subject, "member": member }))
    }
}

#[async_trait]
impl Configurer for TestVaultProvider {
    fn config_fields(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::optional("api_url", "TestVault API base URL", Some(DEFAULT_API_URL)),
            ConfigField::required("unique_id", "Namespace prefixed to every vault name"),
        ]
    }

    fn load_config(&mut self, values: &ConfigValues) -> AppResult<()> {
        let api_url = values.get("api_url").unwrap_or(DEFAULT_API_URL);
        parse_api_url(api_url)?;
        self.config = Some(TestVaultConfig {
            api_url: api_url.to_owned(),
            unique_id: values.require("unique_id")?.to_owned(),
        });
        Ok(())
    }
}

fn parse_api_url(api_url: &str) -> AppResult<Url> {
    Url::parse(api_url).map_err(|error| {
        AppError::Validation(format!("invalid testvault api_url '{api_url}': {error}"))
    })
}
