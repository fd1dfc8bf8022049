use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

/// Provider type key in `publisher/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderType {
    publisher: String,
    name: String,
}

impl ProviderType {
    /// Creates a type key from its parts.
    pub fn new(publisher: impl Into<String>, name: impl Into<String>) -> AppResult<Self> {
        let publisher = publisher.into();
        let name = name.into();
        for (label, part) in [("publisher", &publisher), ("name", &name)] {
            if part.trim().is_empty() || part.contains('/') || part.contains('@') {
                return Err(AppError::Validation(format!(
                    "provider {label} '{part}' must be non-empty and contain no '/' or '@'"
                )));
            }
        }

        Ok(Self { publisher, name })
    }

    /// Parses `publisher/name`.
    pub fn parse(value: &str) -> AppResult<Self> {
        let (publisher, name) = value.split_once('/').ok_or_else(|| {
            AppError::Validation(format!(
                "provider type '{value}' must have the form 'publisher/name'"
            ))
        })?;

        Self::new(publisher, name)
    }

    /// Returns the publisher.
    #[must_use]
    pub fn publisher(&self) -> &str {
        self.publisher.as_str()
    }

    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Display for ProviderType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}/{}", self.publisher, self.name)
    }
}

impl FromStr for ProviderType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ProviderType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<ProviderType> for String {
    fn from(value: ProviderType) -> Self {
        value.to_string()
    }
}

/// Reference to a catalog entry: `publisher/name` or `publisher/name@version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
    /// Referenced provider type.
    pub provider_type: ProviderType,
    /// Exact version, or `None` for the latest release.
    pub version: Option<String>,
}

impl ProviderRef {
    /// Parses a provider reference.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.split_once('@') {
            Some((provider_type, version)) => {
                if version.trim().is_empty() {
                    return Err(AppError::Validation(format!(
                        "provider reference '{value}' has an empty version"
                    )));
                }

                Ok(Self {
                    provider_type: ProviderType::parse(provider_type)?,
                    version: Some(version.to_owned()),
                })
            }
            None => Ok(Self {
                provider_type: ProviderType::parse(value)?,
                version: None,
            }),
        }
    }
}

impl Display for ProviderRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(formatter, "{}@{version}", self.provider_type),
            None => write!(formatter, "{}", self.provider_type),
        }
    }
}

/// Returns `default_id`, or the first `default_id-N` (N >= 2) not already taken.
///
/// `taken` must include both deployed providers and providers still being set up.
#[must_use]
pub fn next_available_provider_id<'a>(
    default_id: &str,
    taken: impl IntoIterator<Item = &'a str>,
) -> String {
    let taken: HashSet<&str> = taken.into_iter().collect();
    if !taken.contains(default_id) {
        return default_id.to_owned();
    }

    (2_u64..)
        .map(|suffix| format!("{default_id}-{suffix}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| default_id.to_owned())
}
