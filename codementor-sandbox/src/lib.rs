//! Codementor sandbox - multi-language code execution
//!
//! Given arbitrary user-submitted source text and a declared language,
//! compiles (if needed) and runs it in an isolated, time-bounded
//! subprocess, capturing stdout, stderr, exit code, and wall-clock
//! duration. Missing toolchains, unsupported languages, compile failures,
//! and timeouts are all reported through the result, never raised.

mod engine;
mod registry;
mod staging;
mod textscan;
mod types;

pub use engine::{CodeExecutor, ExecutionFailure};
pub use registry::{LanguageProfile, ToolchainRegistry, ToolchainStrategy};
pub use staging::StagingArea;
pub use textscan::{derive_entry_name, filter_diagnostics};
pub use types::{ExecutionId, ExecutionRequest, ExecutionResult};

/// Re-export common error types
pub type Result<T> = anyhow::Result<T>;
