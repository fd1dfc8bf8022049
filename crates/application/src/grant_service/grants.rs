use super::*;

impl GrantService {
    /// Validates a request and hands it to the runtime.
    pub async fn create_grant(&self, candidate: GrantCandidate) -> AppResult<Grant> {
        self.create_grant_at(candidate, Utc::now()).await
    }

    /// Same as [`GrantService::create_grant`] with an explicit clock.
    pub async fn create_grant_at(
        &self,
        candidate: GrantCandidate,
        now: DateTime<Utc>,
    ) -> AppResult<Grant> {
        let grant = candidate.validate(now)?;
        let entry = self.providers.get(grant.provider())?;
        check_arguments(entry, &grant.candidate().with)?;

        let created = self.runtime.create_grant(grant).await?;
        info!(
            grant_id = %created.id(),
            provider = %created.provider(),
            subject = %created.subject(),
            "grant requested"
        );
        Ok(created)
    }

    /// Revokes a grant before its end time.
    pub async fn revoke_grant(&self, grant_id: &str, revoker: &str) -> AppResult<Grant> {
        self.runtime.revoke_grant(grant_id, revoker).await
    }

    /// Returns the current state of a grant.
    pub async fn get_grant(&self, grant_id: &str) -> AppResult<Grant> {
        self.runtime.get_grant(grant_id).await
    }

    /// Runs the provider's pre-flight checks without creating anything.
    ///
    /// The provider's own `Validator` result is reported under the
    /// `provider-validate` step next to its named validation steps.
    pub async fn validate_grant_request(
        &self,
        provider_id: &str,
        subject: &str,
        args: &GrantArgs,
        cancellation: &Cancellation,
    ) -> AppResult<ValidationResults> {
        let entry = self.providers.get(provider_id)?;
        check_arguments(entry, args)?;

        let accessor = entry.accessor();
        let mut results = match accessor.as_grant_validator() {
            Some(validator) => {
                run_grant_validations(
                    validator.grant_validation_steps(),
                    subject,
                    args,
                    cancellation,
                )
                .await
            }
            None => ValidationResults::new(),
        };

        if let Some(validator) = accessor.as_validator() {
            let logs = match validator.validate(subject, args).await {
                Ok(()) => Diagnostics::info("request can be satisfied"),
                Err(error) => Diagnostics::error_from(error),
            };
            results.insert(
                "provider-validate",
                ValidationResult {
                    display_name: "Provider validation".to_owned(),
                    logs,
                },
            );
        }

        debug!(
            provider = %provider_id,
            steps = results.len(),
            failed = results.failed(),
            "grant request validated"
        );
        Ok(results)
    }

    /// Returns the provider's guidance for using a grant, if it offers any.
    pub async fn access_instructions(&self, grant_id: &str) -> AppResult<Option<String>> {
        let grant = self.runtime.get_grant(grant_id).await?;
        let entry = self.providers.get(grant.provider())?;

        match entry.accessor().as_instructioner() {
            Some(instructioner) => instructioner
                .instructions(grant.subject(), grant.with(), grant.id())
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}
