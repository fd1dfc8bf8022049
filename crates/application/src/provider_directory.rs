use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use warden_core::{AppError, AppResult};
use warden_domain::{ProviderRef, ProviderType, next_available_provider_id};

use crate::provider_ports::{Accessor, ConfigLoader, ProviderCapabilities};
use crate::provider_registry::ProviderRegistry;

/// Live, configured provider instance.
#[derive(Clone)]
pub struct ProviderEntry {
    id: String,
    provider_type: ProviderType,
    version: String,
    description: String,
    accessor: Arc<dyn Accessor>,
}

impl ProviderEntry {
    /// Creates an entry for an already configured provider.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        provider_type: ProviderType,
        version: impl Into<String>,
        description: impl Into<String>,
        accessor: Arc<dyn Accessor>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_type,
            version: version.into(),
            description: description.into(),
            accessor,
        }
    }

    /// Returns the deployment ID.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the provider type.
    #[must_use]
    pub fn provider_type(&self) -> &ProviderType {
        &self.provider_type
    }

    /// Returns the provider version.
    #[must_use]
    pub fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the shared provider instance.
    #[must_use]
    pub fn accessor(&self) -> &Arc<dyn Accessor> {
        &self.accessor
    }

    /// Returns a serializable summary.
    #[must_use]
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            provider_type: self.provider_type.to_string(),
            version: self.version.clone(),
            description: self.description.clone(),
            capabilities: self.accessor.capabilities(),
            requires_access_token: self
                .accessor
                .as_access_tokener()
                .is_some_and(|tokener| tokener.requires_access_token()),
        }
    }
}

/// Provider listing projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    /// Deployment ID.
    pub id: String,
    /// Type in `publisher/name` form.
    pub provider_type: String,
    /// Version string.
    pub version: String,
    /// Human-readable description.
    pub description: String,
    /// Optional capabilities.
    pub capabilities: ProviderCapabilities,
    /// Whether grants need a subject session token.
    pub requires_access_token: bool,
}

/// Static deployment of one catalog provider.
#[derive(Clone)]
pub struct ProviderDeployment {
    /// Chosen ID, or `None` to use the catalog default.
    pub id: Option<String>,
    /// Catalog reference, `publisher/name[@version]`.
    pub uses: String,
    /// Source of configuration values.
    pub config: Arc<dyn ConfigLoader>,
}

/// Deployed providers keyed by ID.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderDirectory {
    entries: BTreeMap<String, ProviderEntry>,
}

impl ProviderDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures and initialises every deployment.
    ///
    /// `in_setup_ids` lists IDs reserved by providers still being set up; default
    /// IDs never collide with them.
    pub async fn build(
        registry: &ProviderRegistry,
        deployments: Vec<ProviderDeployment>,
        in_setup_ids: &[String],
    ) -> AppResult<Self> {
        let mut directory = Self::new();

        for deployment in deployments {
            let reference = ProviderRef::parse(deployment.uses.as_str())?;
            let registered = registry.resolve(&reference)?;

            let mut provider = registered.instantiate();
            let values = deployment.config.load(&provider.config_fields()).await?;
            provider.load_config(&values)?;
            provider.init().await?;

            let id = match deployment.id {
                Some(id) => id,
                None => next_available_provider_id(
                    registered.default_id(),
                    directory
                        .entries
                        .keys()
                        .map(String::as_str)
                        .chain(in_setup_ids.iter().map(String::as_str)),
                ),
            };

            info!(
                provider = %id,
                provider_type = %registered.provider_type(),
                version = %registered.version(),
                "provider initialised"
            );

            directory.insert(ProviderEntry::new(
                id,
                registered.provider_type().clone(),
                registered.version().to_string(),
                registered.description(),
                provider.into_accessor(),
            ))?;
        }

        Ok(directory)
    }

    /// Adds one entry, rejecting duplicate IDs.
    pub fn insert(&mut self, entry: ProviderEntry) -> AppResult<()> {
        if self.entries.contains_key(entry.id()) {
            return Err(AppError::Conflict(format!(
                "provider id '{}' is already in use",
                entry.id()
            )));
        }

        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Finds a deployed provider.
    pub fn get(&self, id: &str) -> AppResult<&ProviderEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| AppError::ProviderNotFound(id.to_owned()))
    }

    /// Lists deployed providers ordered by ID.
    pub fn entries(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_ports::ConfigValues;
    use crate::test_support::{FakeProvider, StaticConfigLoader, fake_factory};

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        let registered = registry.register(
            "commonfate/testvault",
            "v1",
            "testvault",
            "Test vault",
            fake_factory(FakeProvider::default),
        );
        assert!(registered.is_ok());
        registry
    }

    fn deployment(id: Option<&str>) -> ProviderDeployment {
        ProviderDeployment {
            id: id.map(ToOwned::to_owned),
            uses: "commonfate/testvault".to_owned(),
            config: Arc::new(StaticConfigLoader(ConfigValues::from_pairs([(
                "vault_prefix",
                "demo",
            )]))),
        }
    }

    #[tokio::test]
    async fn default_ids_skip_deployed_and_in_setup_ids() {
        let directory = ProviderDirectory::build(
            &registry(),
            vec![deployment(None), deployment(None)],
            &["testvault-2".to_owned()],
        )
        .await;
        assert!(directory.is_ok());
        let directory = directory.unwrap_or_default();

        let ids: Vec<&str> = directory.entries().map(ProviderEntry::id).collect();
        assert_eq!(ids, vec!["testvault", "testvault-3"]);
    }

    #[tokio::test]
    async fn explicit_duplicate_ids_conflict() {
        let directory = ProviderDirectory::build(
            &registry(),
            vec![deployment(Some("vault")), deployment(Some("vault"))],
            &[],
        )
        .await;
        assert!(matches!(directory, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn missing_config_fails_the_build() {
        let mut broken = deployment(None);
        broken.config = Arc::new(StaticConfigLoader(ConfigValues::new()));

        let directory = ProviderDirectory::build(&registry(), vec![broken], &[]).await;
        assert!(matches!(directory, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_provider_is_reported() {
        let directory = ProviderDirectory::build(&registry(), Vec::new(), &[]).await;
        let directory = directory.unwrap_or_default();
        assert!(matches!(
            directory.get("missing"),
            Err(AppError::ProviderNotFound(_))
        ));
    }
}
