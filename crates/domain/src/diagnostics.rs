use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Severity of one diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Informational message.
    Info,
    /// Something looks off but the check still passes.
    Warning,
    /// The check failed.
    Error,
}

/// One leveled diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLog {
    /// Message severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
}

/// Ordered messages reporting the outcome of one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics {
    logs: Vec<DiagnosticLog>,
}

impl Diagnostics {
    /// Creates an empty log set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log set holding one info message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        let mut diagnostics = Self::new();
        diagnostics.push_info(message);
        diagnostics
    }

    /// Creates a log set holding one error message rendered from `error`.
    #[must_use]
    pub fn error_from(error: impl Display) -> Self {
        let mut diagnostics = Self::new();
        diagnostics.push_error(error.to_string());
        diagnostics
    }

    /// Appends an info message.
    pub fn push_info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    /// Appends a warning message.
    pub fn push_warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    /// Appends an error message.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(DiagnosticLog {
            level,
            message: message.into(),
        });
    }

    /// Returns true when no error-level message was recorded.
    #[must_use]
    pub fn has_succeeded(&self) -> bool {
        self.logs.iter().all(|log| log.level != LogLevel::Error)
    }

    /// Returns messages in insertion order.
    #[must_use]
    pub fn logs(&self) -> &[DiagnosticLog] {
        self.logs.as_slice()
    }

    /// Returns error-level messages.
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticLog> {
        self.logs.iter().filter(|log| log.level == LogLevel::Error)
    }
}

impl Extend<DiagnosticLog> for Diagnostics {
    fn extend<T: IntoIterator<Item = DiagnosticLog>>(&mut self, iter: T) {
        self.logs.extend(iter);
    }
}
