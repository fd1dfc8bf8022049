use super::*;

/// Outcome of one configuration check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigCheckStatus {
    /// No error-level logs.
    Success,
    /// At least one error-level log.
    Error,
    /// Interrupted before it reported.
    Cancelled,
}

/// Report row for one configuration check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCheckReport {
    /// Display name.
    pub name: String,
    /// Check outcome.
    pub status: ConfigCheckStatus,
    /// Logs the check produced.
    pub logs: Vec<DiagnosticLog>,
    /// Configuration keys the check exercises.
    pub fields_validated: Vec<String>,
    /// Guidance shown when the check did not succeed.
    pub failure_message: Option<String>,
}

/// Per-check configuration health of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigValidationReport {
    /// Checks keyed by step identifier.
    pub checks: BTreeMap<String, ConfigCheckReport>,
}

impl ConfigValidationReport {
    /// Returns true when any check did not succeed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.checks
            .values()
            .any(|check| check.status != ConfigCheckStatus::Success)
    }
}

impl GrantService {
    /// Configures a fresh catalog provider with `values` and runs its health checks.
    ///
    /// Nothing is deployed; the instance is dropped afterwards.
    pub async fn run_config_validation(
        &self,
        provider_ref: &str,
        values: ConfigValues,
        cancellation: &Cancellation,
    ) -> AppResult<ConfigValidationReport> {
        let reference = ProviderRef::parse(provider_ref)?;
        let registered = self.registry.resolve(&reference)?;

        let mut provider = registered.instantiate();
        let values = values.resolve(&provider.config_fields())?;
        provider.load_config(&values)?;
        provider.init().await?;

        let Some(validator) = provider.as_config_validator() else {
            return Ok(ConfigValidationReport::default());
        };
        let steps = validator.config_validation_steps();

        let metadata: Vec<(String, String, String, Vec<String>)> = steps
            .iter()
            .map(|(step_id, step)| {
                (
                    step_id.clone(),
                    step.name.clone(),
                    step.failure_message.clone(),
                    step.fields_validated.clone(),
                )
            })
            .collect();

        let results = run_config_validations(steps, cancellation).await;
        let report = build_report(metadata, &results);

        info!(
            provider_type = %registered.provider_type(),
            version = %registered.version(),
            checks = report.checks.len(),
            failed = report.failed(),
            "provider config validated"
        );
        Ok(report)
    }
}

fn build_report(
    metadata: Vec<(String, String, String, Vec<String>)>,
    results: &ValidationResults,
) -> ConfigValidationReport {
    let checks = metadata
        .into_iter()
        .map(|(step_id, name, failure_message, fields_validated)| {
            let (status, logs) = match results.get(&step_id) {
                Some(result) if result.logs.has_succeeded() => {
                    (ConfigCheckStatus::Success, result.logs.logs().to_vec())
                }
                Some(result) => (ConfigCheckStatus::Error, result.logs.logs().to_vec()),
                None => (ConfigCheckStatus::Cancelled, Vec::new()),
            };

            let failure_message =
                (status != ConfigCheckStatus::Success).then_some(failure_message);

            (
                step_id,
                ConfigCheckReport {
                    name,
                    status,
                    logs,
                    fields_validated,
                    failure_message,
                },
            )
        })
        .collect();

    ConfigValidationReport { checks }
}
