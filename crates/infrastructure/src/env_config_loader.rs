//! Provider configuration sourced from environment variables.

use std::sync::Arc;

use async_trait::async_trait;
use warden_application::{ConfigField, ConfigLoader, ConfigValues};
use warden_core::AppResult;

/// Reads one environment variable.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Returns a lookup over the process environment.
#[must_use]
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Loads each declared key from `<PREFIX>_<KEY>` in upper snake case.
#[derive(Clone)]
pub struct EnvConfigLoader {
    prefix: String,
    lookup: EnvLookup,
}

impl EnvConfigLoader {
    /// Creates a loader over the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_lookup(prefix, process_env())
    }

    /// Creates a loader over a custom variable source.
    #[must_use]
    pub fn with_lookup(prefix: impl Into<String>, lookup: EnvLookup) -> Self {
        Self {
            prefix: prefix.into(),
            lookup,
        }
    }

    fn variable_name(&self, key: &str) -> String {
        let key = key.replace(['-', '.'], "_").to_uppercase();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{key}", self.prefix.to_uppercase())
        }
    }
}

#[async_trait]
impl ConfigLoader for EnvConfigLoader {
    async fn load(&self, fields: &[ConfigField]) -> AppResult<ConfigValues> {
        let mut values = ConfigValues::new();
        for field in fields {
            if let Some(value) = (self.lookup)(self.variable_name(field.key.as_str()).as_str()) {
                values.insert(field.key.clone(), value);
            }
        }

        values.resolve(fields)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use warden_core::AppError;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> EnvLookup {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        Arc::new(move |name| variables.get(name).cloned())
    }

    #[tokio::test]
    async fn keys_map_to_prefixed_upper_snake_variables() {
        let loader = EnvConfigLoader::with_lookup(
            "testvault",
            lookup(&[("TESTVAULT_API_URL", "https://vault.example.com")]),
        );
        let fields = vec![
            ConfigField::required("api_url", "API base URL"),
            ConfigField::optional("unique_id", "Vault prefix", Some("default")),
        ];

        let values = loader.load(&fields).await.unwrap_or_default();
        assert_eq!(values.get("api_url"), Some("https://vault.example.com"));
        assert_eq!(values.get("unique_id"), Some("default"));
    }

    #[tokio::test]
    async fn missing_required_variable_names_the_key() {
        let loader = EnvConfigLoader::with_lookup("testvault", lookup(&[]));
        let fields = vec![ConfigField::required("api_url", "API base URL")];

        let result = loader.load(&fields).await;
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("api_url")));
    }
}
