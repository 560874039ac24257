//! Execution engine: runs one request to completion and always returns a
//! result, never an error

use crate::registry::{LanguageProfile, ToolchainRegistry, ToolchainStrategy};
use crate::staging::StagingArea;
use crate::textscan::{derive_entry_name, filter_diagnostics};
use crate::types::{ExecutionId, ExecutionRequest, ExecutionResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Fixed entry-point basename for languages that accept any filename
const DEFAULT_ENTRY_STEM: &str = "main";

/// Fallback type name when no public declaration is found in the source
const DERIVED_ENTRY_FALLBACK: &str = "Main";

/// Project manifest and entry-point filenames for project-based toolchains
const PROJECT_MANIFEST: &str = "Project.csproj";
const PROJECT_ENTRY: &str = "Program.cs";

/// Failure taxonomy; every variant renders into a fully-populated
/// [`ExecutionResult`], so nothing crosses the engine boundary as an error.
///
/// A run step that exits nonzero is not a failure variant: it is an
/// ordinary result carrying the subprocess's exit code and stderr.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("Language {language} is not supported for execution.")]
    UnsupportedLanguage { language: String },

    #[error("{runtime} is not installed. {hint}")]
    ToolchainMissing { runtime: String, hint: String },

    #[error("{diagnostics}")]
    CompileFailed { diagnostics: String, exit_code: i32 },

    #[error("Execution timed out after {timeout_secs} seconds.")]
    Timeout { timeout_secs: u64 },

    #[error("Execution error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ExecutionFailure {
    pub fn into_result(self) -> ExecutionResult {
        let message = self.to_string();
        match self {
            Self::Timeout { timeout_secs } => ExecutionResult {
                output: String::new(),
                error: Some(message),
                exit_code: 124,
                execution_time_seconds: timeout_secs as f64,
            },
            Self::CompileFailed { exit_code, .. } => ExecutionResult {
                output: String::new(),
                error: Some(message),
                exit_code,
                execution_time_seconds: 0.0,
            },
            _ => ExecutionResult::failure(message),
        }
    }
}

/// Outcome of one bounded subprocess invocation
enum Spawned {
    Completed(std::process::Output),
    TimedOut,
}

/// Placeholder values substituted into command templates
#[derive(Debug, Default)]
struct CommandVars {
    file: String,
    executable: String,
    class_name: String,
    project_dir: String,
}

/// Multi-language code execution engine
///
/// Stateless across calls apart from the shared read-only registry; the
/// hosting service may run any number of `execute` calls concurrently,
/// each owning its own staging directory and process tree.
pub struct CodeExecutor {
    registry: Arc<ToolchainRegistry>,
}

impl CodeExecutor {
    /// Engine over the default language table
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ToolchainRegistry::with_defaults()))
    }

    /// Engine over an injected registry (tests use fake profiles)
    pub fn with_registry(registry: Arc<ToolchainRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    /// Run one request to completion. Every failure path is captured into
    /// the returned result; this method never returns an error.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let id = ExecutionId::new();
        let language = request.language.to_lowercase();
        tracing::info!(
            execution_id = %id,
            language = %language,
            code_len = request.code.len(),
            "Executing code"
        );

        match self.try_execute(&language, &request.code).await {
            Ok(result) => {
                tracing::debug!(
                    execution_id = %id,
                    exit_code = result.exit_code,
                    execution_time_seconds = result.execution_time_seconds,
                    "Execution finished"
                );
                result
            }
            Err(failure) => {
                tracing::warn!(execution_id = %id, language = %language, %failure, "Execution failed");
                failure.into_result()
            }
        }
    }

    async fn try_execute(
        &self,
        language: &str,
        code: &str,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let profile = self.registry.resolve(language).ok_or_else(|| {
            ExecutionFailure::UnsupportedLanguage {
                language: language.to_string(),
            }
        })?;

        // Check every binary the protocol will need before touching the
        // filesystem, so a missing toolchain leaves no staging directory.
        for binary in profile.required_binaries() {
            if self.registry.locate_binary(binary).is_none() {
                return Err(ExecutionFailure::ToolchainMissing {
                    runtime: capitalize(binary),
                    hint: profile.install_hint.clone(),
                });
            }
        }

        // StagingArea removal on drop covers every return path below.
        let staging = StagingArea::create()?;
        match profile.strategy {
            ToolchainStrategy::Interpreted => self.run_interpreted(profile, code, &staging).await,
            ToolchainStrategy::CompileThenRun | ToolchainStrategy::CompileThenRunFiltered => {
                self.run_compiled(profile, code, &staging).await
            }
            ToolchainStrategy::NameDerivedCompile => {
                self.run_name_derived(profile, code, &staging).await
            }
            ToolchainStrategy::ProjectBased => self.run_project(profile, code, &staging).await,
        }
    }

    /// Single run invocation over the staged source file
    async fn run_interpreted(
        &self,
        profile: &LanguageProfile,
        code: &str,
        staging: &StagingArea,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let file_name = format!("{DEFAULT_ENTRY_STEM}{}", profile.source_extension);
        let file = staging.write_source(&file_name, code)?;

        let vars = CommandVars {
            file: file.to_string_lossy().into_owned(),
            ..CommandVars::default()
        };
        let argv = substitute(&profile.run_command, &vars);
        self.run_step(profile, &argv, staging.path()).await
    }

    /// Explicit compile step producing an artifact, then run it
    async fn run_compiled(
        &self,
        profile: &LanguageProfile,
        code: &str,
        staging: &StagingArea,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let file_name = format!("{DEFAULT_ENTRY_STEM}{}", profile.source_extension);
        let file = staging.write_source(&file_name, code)?;

        let compile_vars = CommandVars {
            file: file.to_string_lossy().into_owned(),
            executable: staging
                .path()
                .join(DEFAULT_ENTRY_STEM)
                .to_string_lossy()
                .into_owned(),
            ..CommandVars::default()
        };
        let compile_argv = compile_command(profile, &compile_vars)?;
        let filter = profile.strategy == ToolchainStrategy::CompileThenRunFiltered;
        self.compile_step(profile, &compile_argv, staging.path(), filter)
            .await?;

        let run_vars = CommandVars {
            executable: DEFAULT_ENTRY_STEM.to_string(),
            ..CommandVars::default()
        };
        let argv = substitute(&profile.run_command, &run_vars);
        self.run_step(profile, &argv, staging.path()).await
    }

    /// The source filename must match the public type declared inside the
    /// source; compile uses the derived name, run invokes the type by name
    async fn run_name_derived(
        &self,
        profile: &LanguageProfile,
        code: &str,
        staging: &StagingArea,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let class_name =
            derive_entry_name(code).unwrap_or_else(|| DERIVED_ENTRY_FALLBACK.to_string());
        let file_name = format!("{class_name}{}", profile.source_extension);
        let file = staging.write_source(&file_name, code)?;

        let compile_vars = CommandVars {
            file: file.to_string_lossy().into_owned(),
            ..CommandVars::default()
        };
        let compile_argv = compile_command(profile, &compile_vars)?;
        self.compile_step(profile, &compile_argv, staging.path(), false)
            .await?;

        let run_vars = CommandVars {
            class_name,
            ..CommandVars::default()
        };
        let argv = substitute(&profile.run_command, &run_vars);
        self.run_step(profile, &argv, staging.path()).await
    }

    /// Compile and run fused into one project-runner invocation; failures
    /// from it are classified as run failures, never compile failures
    async fn run_project(
        &self,
        profile: &LanguageProfile,
        code: &str,
        staging: &StagingArea,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let file_name = format!("{DEFAULT_ENTRY_STEM}{}", profile.source_extension);
        staging.write_source(&file_name, code)?;

        let template = profile.project_template.as_deref().unwrap_or_default();
        let project_dir = staging.scaffold_project(PROJECT_MANIFEST, template, PROJECT_ENTRY, code)?;

        let vars = CommandVars {
            project_dir: project_dir.to_string_lossy().into_owned(),
            ..CommandVars::default()
        };
        let argv = substitute(&profile.run_command, &vars);
        self.run_step(profile, &argv, &project_dir).await
    }

    /// Invoke the compiler, bounded by the profile timeout. Nonzero exit
    /// short-circuits the protocol; the run step is never attempted.
    async fn compile_step(
        &self,
        profile: &LanguageProfile,
        argv: &[String],
        cwd: &Path,
        filter: bool,
    ) -> Result<(), ExecutionFailure> {
        tracing::debug!(command = ?argv, "Compiling");
        match self.spawn_bounded(profile, argv, cwd).await? {
            Spawned::TimedOut => Err(ExecutionFailure::Timeout {
                timeout_secs: profile.timeout_secs,
            }),
            Spawned::Completed(output) if output.status.success() => Ok(()),
            Spawned::Completed(output) => {
                let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
                if filter {
                    diagnostics = filter_diagnostics(&diagnostics);
                }
                if diagnostics.trim().is_empty() {
                    diagnostics = "Compilation failed".to_string();
                }
                Err(ExecutionFailure::CompileFailed {
                    diagnostics,
                    exit_code: output.status.code().unwrap_or(1),
                })
            }
        }
    }

    /// Invoke the run command and normalize its outcome. Wall-clock time is
    /// measured around this call only; compile time is excluded.
    async fn run_step(
        &self,
        profile: &LanguageProfile,
        argv: &[String],
        cwd: &Path,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        tracing::debug!(command = ?argv, "Running");
        let started = Instant::now();
        match self.spawn_bounded(profile, argv, cwd).await? {
            Spawned::TimedOut => Err(ExecutionFailure::Timeout {
                timeout_secs: profile.timeout_secs,
            }),
            Spawned::Completed(output) => {
                let execution_time_seconds = round_to_millis(started.elapsed().as_secs_f64());
                let exit_code = output.status.code().unwrap_or(1);
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                Ok(ExecutionResult {
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    error: (exit_code != 0).then_some(stderr),
                    exit_code,
                    execution_time_seconds,
                })
            }
        }
    }

    /// Spawn one subprocess with captured output, bounded by the profile
    /// timeout. The child is spawned with `kill_on_drop`, so timeout expiry
    /// SIGKILLs it before the staging directory is removed.
    async fn spawn_bounded(
        &self,
        profile: &LanguageProfile,
        argv: &[String],
        cwd: &Path,
    ) -> Result<Spawned, ExecutionFailure> {
        let program = argv
            .first()
            .ok_or_else(|| ExecutionFailure::Internal(anyhow::anyhow!("empty command template")))?;

        // Bare names resolve through the registry so binaries found only in
        // fallback locations are still reachable; `./artifact` resolves
        // against the staging directory.
        let program: PathBuf = if let Some(relative) = program.strip_prefix("./") {
            cwd.join(relative)
        } else if program.contains('/') {
            PathBuf::from(program)
        } else {
            self.registry
                .locate_binary(program)
                .ok_or_else(|| self.missing_command(profile, program))?
        };

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .current_dir(cwd)
            .env("PATH", self.registry.extended_path())
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Race between the presence check and execution, or a
                // binary invoked only at run time
                return Err(self.missing_command(profile, &argv[0]));
            }
            Err(err) => return Err(ExecutionFailure::Internal(err.into())),
        };

        let bounded = tokio::time::timeout(
            Duration::from_secs(profile.timeout_secs),
            child.wait_with_output(),
        )
        .await;

        match bounded {
            Ok(Ok(output)) => Ok(Spawned::Completed(output)),
            Ok(Err(err)) => Err(ExecutionFailure::Internal(err.into())),
            // Dropping the wait future drops the child handle, which kills
            // the process via kill_on_drop.
            Err(_) => Ok(Spawned::TimedOut),
        }
    }

    fn missing_command(&self, profile: &LanguageProfile, name: &str) -> ExecutionFailure {
        ExecutionFailure::ToolchainMissing {
            runtime: capitalize(name),
            hint: profile.install_hint.clone(),
        }
    }
}

impl Default for CodeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_command(
    profile: &LanguageProfile,
    vars: &CommandVars,
) -> Result<Vec<String>, ExecutionFailure> {
    let template = profile.compile_command.as_ref().ok_or_else(|| {
        ExecutionFailure::Internal(anyhow::anyhow!(
            "profile '{}' declares a compiled strategy but no compile command",
            profile.name
        ))
    })?;
    Ok(substitute(template, vars))
}

fn substitute(template: &[String], vars: &CommandVars) -> Vec<String> {
    template
        .iter()
        .map(|part| {
            part.replace("{file}", &vars.file)
                .replace("{executable}", &vars.executable)
                .replace("{class_name}", &vars.class_name)
                .replace("{project_dir}", &vars.project_dir)
        })
        .collect()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn round_to_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_all_placeholders() {
        let template = vec![
            "g++".to_string(),
            "{file}".to_string(),
            "-o".to_string(),
            "{executable}".to_string(),
        ];
        let vars = CommandVars {
            file: "/tmp/stage/main.cpp".to_string(),
            executable: "/tmp/stage/main".to_string(),
            ..CommandVars::default()
        };
        assert_eq!(
            substitute(&template, &vars),
            vec!["g++", "/tmp/stage/main.cpp", "-o", "/tmp/stage/main"]
        );
    }

    #[test]
    fn test_substitute_relative_artifact() {
        let template = vec!["./{executable}".to_string()];
        let vars = CommandVars {
            executable: "main".to_string(),
            ..CommandVars::default()
        };
        assert_eq!(substitute(&template, &vars), vec!["./main"]);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("python3"), "Python3");
        assert_eq!(capitalize("g++"), "G++");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_round_to_millis() {
        assert_eq!(round_to_millis(0.123456), 0.123);
        assert_eq!(round_to_millis(1.9996), 2.0);
        assert_eq!(round_to_millis(0.0), 0.0);
    }

    #[test]
    fn test_failure_renders_unsupported_language() {
        let result = ExecutionFailure::UnsupportedLanguage {
            language: "cobol".to_string(),
        }
        .into_result();
        assert_eq!(result.exit_code, 1);
        assert_eq!(
            result.error.as_deref(),
            Some("Language cobol is not supported for execution.")
        );
        assert!(result.output.is_empty());
        assert_eq!(result.execution_time_seconds, 0.0);
    }

    #[test]
    fn test_failure_renders_timeout_sentinel() {
        let result = ExecutionFailure::Timeout { timeout_secs: 10 }.into_result();
        assert_eq!(result.exit_code, 124);
        assert_eq!(result.execution_time_seconds, 10.0);
        assert_eq!(
            result.error.as_deref(),
            Some("Execution timed out after 10 seconds.")
        );
    }

    #[test]
    fn test_failure_preserves_compiler_exit_code() {
        let result = ExecutionFailure::CompileFailed {
            diagnostics: "main.cpp:1: error: expected declaration".to_string(),
            exit_code: 2,
        }
        .into_result();
        assert_eq!(result.exit_code, 2);
        assert!(result.error.unwrap().contains("expected declaration"));
    }
}
