use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use warden_domain::{Diagnostics, GrantArgs};

/// Boxed request check receiving `(subject, args)`.
pub type GrantValidationFn =
    Arc<dyn Fn(String, GrantArgs) -> BoxFuture<'static, Diagnostics> + Send + Sync>;

/// Boxed configuration check.
pub type ConfigValidationFn = Arc<dyn Fn() -> BoxFuture<'static, Diagnostics> + Send + Sync>;

/// Named request check.
#[derive(Clone)]
pub struct GrantValidationStep {
    /// Display name.
    pub name: String,
    /// Message shown when the check fails.
    pub failure_message: String,
    /// Check body.
    pub run: GrantValidationFn,
}

impl GrantValidationStep {
    /// Creates a step from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, failure_message: impl Into<String>, run: F) -> Self
    where
        F: Fn(String, GrantArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Diagnostics> + Send + 'static,
    {
        Self {
            name: name.into(),
            failure_message: failure_message.into(),
            run: Arc::new(move |subject, args| run(subject, args).boxed()),
        }
    }
}

/// Request checks keyed by step identifier.
pub type GrantValidationSteps = BTreeMap<String, GrantValidationStep>;

/// Named configuration check.
#[derive(Clone)]
pub struct ConfigValidationStep {
    /// Display name.
    pub name: String,
    /// Message shown when the check fails.
    pub failure_message: String,
    /// Configuration keys the check exercises.
    pub fields_validated: Vec<String>,
    /// Check body.
    pub run: ConfigValidationFn,
}

impl ConfigValidationStep {
    /// Creates a step from an async closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        failure_message: impl Into<String>,
        fields_validated: &[&str],
        run: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Diagnostics> + Send + 'static,
    {
        Self {
            name: name.into(),
            failure_message: failure_message.into(),
            fields_validated: fields_validated
                .iter()
                .map(|field| (*field).to_owned())
                .collect(),
            run: Arc::new(move || run().boxed()),
        }
    }
}

/// Configuration checks keyed by step identifier.
pub type ConfigValidationSteps = BTreeMap<String, ConfigValidationStep>;
