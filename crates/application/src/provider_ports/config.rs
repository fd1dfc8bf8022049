use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

/// One configuration key declared by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Configuration key.
    pub key: String,
    /// Human-readable description.
    pub description: String,
    /// Whether the value must be kept out of logs.
    pub is_secret: bool,
    /// Whether the value may be absent.
    pub is_optional: bool,
    /// Value used when an optional key is absent.
    pub default: Option<String>,
}

impl ConfigField {
    /// Declares a required plain value.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            is_secret: false,
            is_optional: false,
            default: None,
        }
    }

    /// Declares an optional value with a default.
    #[must_use]
    pub fn optional(
        key: impl Into<String>,
        description: impl Into<String>,
        default: Option<&str>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            is_secret: false,
            is_optional: true,
            default: default.map(ToOwned::to_owned),
        }
    }

    /// Marks the value as secret.
    #[must_use]
    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }
}

/// Loaded configuration values.
///
/// `Debug` output redacts secret values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigValues {
    values: BTreeMap<String, String>,
    secret_keys: BTreeSet<String>,
}

impl ConfigValues {
    /// Creates an empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds values from plain key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = Self::new();
        for (key, value) in pairs {
            values.insert(key, value);
        }
        values
    }

    /// Stores one value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Stores one secret value.
    pub fn insert_secret(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.secret_keys.insert(key.clone());
        self.values.insert(key, value.into());
    }

    /// Returns a value if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns a value or a validation error naming the key.
    pub fn require(&self, key: &str) -> AppResult<&str> {
        self.get(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Validation(format!("missing required config value '{key}'")))
    }

    /// Checks values against declared fields and applies defaults.
    pub fn resolve(mut self, fields: &[ConfigField]) -> AppResult<Self> {
        for field in fields {
            let present = self
                .get(field.key.as_str())
                .is_some_and(|value| !value.trim().is_empty());

            if !present {
                match (&field.default, field.is_optional) {
                    (Some(default), _) => self.insert(field.key.clone(), default.clone()),
                    (None, true) => {}
                    (None, false) => {
                        return Err(AppError::Validation(format!(
                            "missing required config value '{}'",
                            field.key
                        )));
                    }
                }
            }

            if field.is_secret {
                self.secret_keys.insert(field.key.clone());
            }
        }

        Ok(self)
    }
}

impl Debug for ConfigValues {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = formatter.debug_map();
        for (key, value) in &self.values {
            if self.secret_keys.contains(key) {
                map.entry(key, &"<redacted>");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Port that sources configuration values for a declaration.
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Loads values for every declared field.
    async fn load(&self, fields: &[ConfigField]) -> AppResult<ConfigValues>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_defaults_and_rejects_missing_required() {
        let fields = vec![
            ConfigField::required("instance_arn", "SSO instance"),
            ConfigField::optional("region", "AWS region", Some("us-east-1")),
        ];

        let resolved = ConfigValues::from_pairs([("instance_arn", "arn:aws:sso:::instance/x")])
            .resolve(&fields);
        assert!(resolved.is_ok());
        let resolved = resolved.unwrap_or_default();
        assert_eq!(resolved.get("region"), Some("us-east-1"));

        let missing = ConfigValues::new().resolve(&fields);
        assert!(matches!(missing, Err(AppError::Validation(message)) if message.contains("instance_arn")));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let fields = vec![ConfigField::required("api_token", "token").secret()];
        let values = ConfigValues::from_pairs([("api_token", "hunter2")])
            .resolve(&fields)
            .unwrap_or_default();

        let rendered = format!("{values:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        assert_eq!(values.get("api_token"), Some("hunter2"));
    }
}
