//! Core types for sandbox execution

use serde::{Deserialize, Serialize};

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute
    pub code: String,

    /// Requested language identifier (normalized to lowercase at lookup)
    pub language: String,
}

impl ExecutionRequest {
    /// Create a simple execution request
    pub fn new(code: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
        }
    }
}

/// Result of code execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Captured stdout
    pub output: String,

    /// Human-readable error text; `None` on a clean run
    pub error: Option<String>,

    /// Exit code (0 = success, 124 = timed out)
    pub exit_code: i32,

    /// Wall-clock duration of the run step, millisecond precision
    pub execution_time_seconds: f64,
}

impl ExecutionResult {
    /// Check if execution succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    /// A zero-duration failure result with exit code 1
    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: Some(message.into()),
            exit_code: 1,
            execution_time_seconds: 0.0,
        }
    }
}

/// Unique execution identifier, used for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
