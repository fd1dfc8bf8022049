//! Provider configuration from a flat JSON object.

use async_trait::async_trait;
use serde_json::{Map, Value};
use warden_application::{ConfigField, ConfigLoader, ConfigValues};
use warden_core::{AppError, AppResult};

use crate::env_config_loader::{EnvLookup, process_env};

const ENV_REFERENCE_PREFIX: &str = "env:";

/// Loads values from a flat JSON object.
///
/// A string of the form `env:NAME` is replaced by the environment variable
/// `NAME`; numbers and booleans are used in their JSON text form.
#[derive(Clone)]
pub struct MapConfigLoader {
    values: Map<String, Value>,
    lookup: EnvLookup,
}

impl MapConfigLoader {
    /// Creates a loader resolving references against the process environment.
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self::with_lookup(values, process_env())
    }

    /// Creates a loader with a custom variable source.
    #[must_use]
    pub fn with_lookup(values: Map<String, Value>, lookup: EnvLookup) -> Self {
        Self { values, lookup }
    }

    fn resolve_value(&self, key: &str, value: &Value) -> AppResult<Option<String>> {
        match value {
            Value::Null => Ok(None),
            Value::String(text) => match text.strip_prefix(ENV_REFERENCE_PREFIX) {
                Some(variable) => (self.lookup)(variable).map(Some).ok_or_else(|| {
                    AppError::Validation(format!(
                        "config value '{key}' references unset environment variable '{variable}'"
                    ))
                }),
                None => Ok(Some(text.clone())),
            },
            Value::Bool(_) | Value::Number(_) => Ok(Some(value.to_string())),
            Value::Array(_) | Value::Object(_) => Err(AppError::Validation(format!(
                "config value '{key}' must be a string, number or boolean"
            ))),
        }
    }
}

#[async_trait]
impl ConfigLoader for MapConfigLoader {
    async fn load(&self, fields: &[ConfigField]) -> AppResult<ConfigValues> {
        let mut values = ConfigValues::new();
        for field in fields {
            let Some(raw) = self.values.get(field.key.as_str()) else {
                continue;
            };
            if let Some(value) = self.resolve_value(field.key.as_str(), raw)? {
                values.insert(field.key.clone(), value);
            }
        }

        values.resolve(fields)
    }
}
