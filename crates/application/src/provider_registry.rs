use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use warden_core::{AppError, AppResult};
use warden_domain::{ProviderRef, ProviderType, ProviderVersion};

use crate::provider_ports::ConfigurableProvider;

/// Builds an unconfigured provider instance.
pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn ConfigurableProvider> + Send + Sync>;

/// One catalog entry for a provider type and version.
#[derive(Clone)]
pub struct RegisteredProvider {
    provider_type: ProviderType,
    version: ProviderVersion,
    default_id: String,
    description: String,
    factory: ProviderFactory,
}

impl RegisteredProvider {
    /// Returns the provider type.
    #[must_use]
    pub fn provider_type(&self) -> &ProviderType {
        &self.provider_type
    }

    /// Returns the version.
    #[must_use]
    pub fn version(&self) -> &ProviderVersion {
        &self.version
    }

    /// Returns the ID deployments use when none is chosen.
    #[must_use]
    pub fn default_id(&self) -> &str {
        self.default_id.as_str()
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Builds a fresh, unconfigured instance.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn ConfigurableProvider> {
        (self.factory)()
    }

    /// Returns a serializable summary.
    #[must_use]
    pub fn summary(&self) -> ProviderTypeSummary {
        ProviderTypeSummary {
            provider_type: self.provider_type.to_string(),
            version: self.version.to_string(),
            default_id: self.default_id.clone(),
            description: self.description.clone(),
        }
    }
}

/// Catalog listing projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTypeSummary {
    /// Type in `publisher/name` form.
    pub provider_type: String,
    /// Version string.
    pub version: String,
    /// Default deployment ID.
    pub default_id: String,
    /// Human-readable description.
    pub description: String,
}

/// Catalog of provider implementations keyed by type and version.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderType, BTreeMap<String, RegisteredProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one provider implementation.
    pub fn register(
        &mut self,
        provider_type: &str,
        version: &str,
        default_id: &str,
        description: &str,
        factory: ProviderFactory,
    ) -> AppResult<()> {
        let provider_type = ProviderType::parse(provider_type)?;
        let version = ProviderVersion::parse(version)?;
        if default_id.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "provider '{provider_type}' must declare a default id"
            )));
        }

        let versions = self.providers.entry(provider_type.clone()).or_default();
        if versions.contains_key(version.as_str()) {
            return Err(AppError::Conflict(format!(
                "provider '{provider_type}@{version}' is already registered"
            )));
        }

        versions.insert(
            version.as_str().to_owned(),
            RegisteredProvider {
                provider_type,
                version,
                default_id: default_id.to_owned(),
                description: description.to_owned(),
                factory,
            },
        );
        Ok(())
    }

    /// Looks up an exact type and version.
    pub fn lookup(&self, provider_type: &ProviderType, version: &str) -> AppResult<&RegisteredProvider> {
        self.providers
            .get(provider_type)
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| AppError::ProviderNotFound(format!("{provider_type}@{version}")))
    }

    /// Looks up the highest version of a type.
    ///
    /// Releases outrank pre-releases of the same number.
    pub fn lookup_latest(&self, provider_type: &ProviderType) -> AppResult<&RegisteredProvider> {
        let versions = self
            .providers
            .get(provider_type)
            .ok_or_else(|| AppError::ProviderNotFound(provider_type.to_string()))?;

        let latest = latest_version(versions.keys().map(String::as_str))?
            .ok_or_else(|| AppError::ProviderNotFound(provider_type.to_string()))?;

        self.lookup(provider_type, latest.as_str())
    }

    /// Resolves a `publisher/name[@version]` reference.
    pub fn resolve(&self, reference: &ProviderRef) -> AppResult<&RegisteredProvider> {
        match &reference.version {
            Some(version) => self.lookup(&reference.provider_type, version),
            None => self.lookup_latest(&reference.provider_type),
        }
    }

    /// Lists entries ordered by type, then version.
    #[must_use]
    pub fn list(&self) -> Vec<&RegisteredProvider> {
        let mut entries: Vec<&RegisteredProvider> = self
            .providers
            .values()
            .flat_map(BTreeMap::values)
            .collect();
        entries.sort_by(|left, right| {
            left.provider_type
                .cmp(&right.provider_type)
                .then_with(|| left.version.cmp(&right.version))
        });
        entries
    }
}

/// Returns the highest of `versions`, failing on any malformed entry.
pub fn latest_version<'a>(
    versions: impl IntoIterator<Item = &'a str>,
) -> AppResult<Option<ProviderVersion>> {
    let mut latest: Option<ProviderVersion> = None;
    for version in versions {
        let parsed = ProviderVersion::parse(version)?;
        if latest.as_ref().is_none_or(|current| parsed > *current) {
            latest = Some(parsed);
        }
    }

    Ok(latest)
}
