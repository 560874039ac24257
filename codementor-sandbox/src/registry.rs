//! Toolchain registry: per-language build/run recipes and binary location

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How a language's toolchain sequences staging, compilation, and running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainStrategy {
    /// Single run invocation, no compile step (python, ruby, php, go run)
    Interpreted,
    /// Explicit compile step producing an executable, then run it (c, cpp)
    CompileThenRun,
    /// Like `CompileThenRun`, but compiler stderr is scrubbed of
    /// toolchain-manager advisory noise before being classified (rust)
    CompileThenRunFiltered,
    /// Source filename derives from a declaration inside the source;
    /// compile uses the derived name, run invokes the compiled type (java)
    NameDerivedCompile,
    /// Compile and run fused into one project-runner invocation over a
    /// generated manifest (csharp)
    ProjectBased,
}

/// Build/run recipe for one supported language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageProfile {
    /// Canonical lowercase identifier
    pub name: String,

    /// File suffix required by the toolchain, including the dot
    pub source_extension: String,

    /// Run argument template; `{file}`, `{executable}`, `{class_name}` and
    /// `{project_dir}` are substituted at execution time
    pub run_command: Vec<String>,

    /// Compile argument template, present only for ahead-of-time-compiled
    /// languages
    pub compile_command: Option<Vec<String>>,

    /// Ceiling on run (and compile) duration, in seconds
    pub timeout_secs: u64,

    /// Sequencing variant for this toolchain
    pub strategy: ToolchainStrategy,

    /// Manifest content written when the strategy is project-based
    pub project_template: Option<String>,

    /// Remediation text shown when the toolchain binary cannot be located
    pub install_hint: String,
}

impl LanguageProfile {
    /// Whether a generated project manifest is needed before build
    pub fn requires_project(&self) -> bool {
        matches!(self.strategy, ToolchainStrategy::ProjectBased)
    }

    /// Every binary the protocol will need to locate before staging.
    ///
    /// Leading tokens that are paths or placeholders (`./{executable}`) are
    /// artifacts of our own compile step, not host binaries.
    pub fn required_binaries(&self) -> Vec<&str> {
        let mut binaries = Vec::new();
        for command in [Some(&self.run_command), self.compile_command.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Some(first) = command.first() {
                if !first.contains('/') && !first.contains('{') && !binaries.contains(&first.as_str())
                {
                    binaries.push(first.as_str());
                }
            }
        }
        binaries
    }
}

/// Static table of language recipes plus binary location
///
/// Read-only after construction; shared across concurrent executions behind
/// an `Arc`. Constructed once at startup and injected into the engine so
/// tests can substitute fake profiles.
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    profiles: HashMap<String, LanguageProfile>,
    fallback_dirs: Vec<PathBuf>,
}

impl ToolchainRegistry {
    /// Build a registry from explicit profiles and the standard fallback
    /// search locations
    pub fn new(profiles: Vec<LanguageProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            fallback_dirs: default_fallback_dirs(),
        }
    }

    /// Override the fallback search locations (used by tests)
    pub fn with_fallback_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.fallback_dirs = dirs;
        self
    }

    /// Registry covering every supported language
    pub fn with_defaults() -> Self {
        Self::new(default_profiles())
    }

    /// Look up a language profile; the identifier is lowercased first.
    /// `None` means the language is unsupported, which is a reported
    /// outcome, never a fault.
    pub fn resolve(&self, language: &str) -> Option<&LanguageProfile> {
        self.profiles.get(language.to_lowercase().as_str())
    }

    /// Canned remediation message for a language
    pub fn install_hint(&self, language: &str) -> Option<&str> {
        self.resolve(language).map(|p| p.install_hint.as_str())
    }

    /// Locate a binary on the standard search path, falling back to
    /// well-known install locations that per-user toolchain managers use
    /// but the inherited `PATH` may omit. The first readable+executable
    /// match wins.
    pub fn locate_binary(&self, name: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(name, Some(self.extended_path()), cwd).ok()
    }

    /// `PATH` value for spawned subprocesses: the inherited search path
    /// with the fallback locations appended
    pub fn extended_path(&self) -> std::ffi::OsString {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let mut dirs: Vec<PathBuf> = std::env::split_paths(&inherited).collect();
        for dir in &self.fallback_dirs {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        std::env::join_paths(dirs).unwrap_or(inherited)
    }

    /// Names of every registered language, sorted
    pub fn supported_languages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Well-known install locations for per-user toolchain managers
fn default_fallback_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/opt/homebrew/bin"),
        PathBuf::from("/usr/local/bin"),
    ];
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.push(home.join(".local/bin"));
        dirs.push(home.join(".cargo/bin"));
        dirs.push(home.join(".dotnet"));
    }
    dirs
}

const CSHARP_PROJECT_TEMPLATE: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
    <ImplicitUsings>enable</ImplicitUsings>
    <Nullable>enable</Nullable>
  </PropertyGroup>
</Project>"#;

fn default_profiles() -> Vec<LanguageProfile> {
    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    vec![
        LanguageProfile {
            name: "python".to_string(),
            source_extension: ".py".to_string(),
            run_command: args(&["python3", "{file}"]),
            compile_command: None,
            timeout_secs: 10,
            strategy: ToolchainStrategy::Interpreted,
            project_template: None,
            install_hint: "Install Python 3 from https://www.python.org/downloads/ or via your system package manager.".to_string(),
        },
        LanguageProfile {
            name: "java".to_string(),
            source_extension: ".java".to_string(),
            run_command: args(&["java", "{class_name}"]),
            compile_command: Some(args(&["javac", "{file}"])),
            timeout_secs: 10,
            strategy: ToolchainStrategy::NameDerivedCompile,
            project_template: None,
            install_hint: "Install a JDK (e.g. Temurin from https://adoptium.net/) so that javac and java are available.".to_string(),
        },
        LanguageProfile {
            name: "ruby".to_string(),
            source_extension: ".rb".to_string(),
            run_command: args(&["ruby", "{file}"]),
            compile_command: None,
            timeout_secs: 10,
            strategy: ToolchainStrategy::Interpreted,
            project_template: None,
            install_hint: "Install Ruby from https://www.ruby-lang.org/ or via your system package manager.".to_string(),
        },
        LanguageProfile {
            name: "php".to_string(),
            source_extension: ".php".to_string(),
            run_command: args(&["php", "{file}"]),
            compile_command: None,
            timeout_secs: 10,
            strategy: ToolchainStrategy::Interpreted,
            project_template: None,
            install_hint: "Install PHP from https://www.php.net/downloads or via your system package manager.".to_string(),
        },
        LanguageProfile {
            name: "cpp".to_string(),
            source_extension: ".cpp".to_string(),
            run_command: args(&["./{executable}"]),
            compile_command: Some(args(&["g++", "{file}", "-o", "{executable}"])),
            timeout_secs: 10,
            strategy: ToolchainStrategy::CompileThenRun,
            project_template: None,
            install_hint: "Install g++ via your system package manager (e.g. apt install g++ or the Xcode command line tools).".to_string(),
        },
        LanguageProfile {
            name: "c".to_string(),
            source_extension: ".c".to_string(),
            run_command: args(&["./{executable}"]),
            compile_command: Some(args(&["gcc", "{file}", "-o", "{executable}"])),
            timeout_secs: 10,
            strategy: ToolchainStrategy::CompileThenRun,
            project_template: None,
            install_hint: "Install gcc via your system package manager (e.g. apt install gcc or the Xcode command line tools).".to_string(),
        },
        LanguageProfile {
            name: "csharp".to_string(),
            source_extension: ".cs".to_string(),
            run_command: args(&["dotnet", "run", "--project", "{project_dir}"]),
            compile_command: None,
            timeout_secs: 10,
            strategy: ToolchainStrategy::ProjectBased,
            project_template: Some(CSHARP_PROJECT_TEMPLATE.to_string()),
            install_hint: "Install the .NET SDK from https://dotnet.microsoft.com/download.".to_string(),
        },
        LanguageProfile {
            name: "go".to_string(),
            source_extension: ".go".to_string(),
            run_command: args(&["go", "run", "{file}"]),
            compile_command: None,
            timeout_secs: 10,
            strategy: ToolchainStrategy::Interpreted,
            project_template: None,
            install_hint: "Install Go from https://go.dev/dl/.".to_string(),
        },
        LanguageProfile {
            name: "rust".to_string(),
            source_extension: ".rs".to_string(),
            run_command: args(&["./{executable}"]),
            compile_command: Some(args(&["rustc", "{file}", "-o", "{executable}"])),
            timeout_secs: 15,
            strategy: ToolchainStrategy::CompileThenRunFiltered,
            project_template: None,
            install_hint: "Install Rust via rustup: https://rustup.rs/.".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = ToolchainRegistry::with_defaults();
        assert_eq!(registry.resolve("Python").unwrap().name, "python");
        assert_eq!(registry.resolve("CPP").unwrap().name, "cpp");
        assert!(registry.resolve("cobol").is_none());
    }

    #[test]
    fn test_default_table_covers_all_languages() {
        let registry = ToolchainRegistry::with_defaults();
        assert_eq!(
            registry.supported_languages(),
            vec!["c", "cpp", "csharp", "go", "java", "php", "python", "ruby", "rust"]
        );
    }

    #[test]
    fn test_required_binaries_skip_artifact_paths() {
        let registry = ToolchainRegistry::with_defaults();

        // cpp's run command invokes our own compiled artifact, so only the
        // compiler must exist on the host
        assert_eq!(registry.resolve("cpp").unwrap().required_binaries(), vec!["g++"]);
        assert_eq!(
            registry.resolve("java").unwrap().required_binaries(),
            vec!["java", "javac"]
        );
        assert_eq!(
            registry.resolve("csharp").unwrap().required_binaries(),
            vec!["dotnet"]
        );
    }

    #[test]
    fn test_project_template_only_for_project_based() {
        let registry = ToolchainRegistry::with_defaults();
        let csharp = registry.resolve("csharp").unwrap();
        assert!(csharp.requires_project());
        assert!(csharp.project_template.as_deref().unwrap().contains("net8.0"));
        assert!(!registry.resolve("python").unwrap().requires_project());
    }

    #[test]
    fn test_locate_binary_searches_path() {
        let registry = ToolchainRegistry::with_defaults();
        // sh is present on any unix host running the test suite
        let path = registry.locate_binary("sh").expect("sh should exist");
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_locate_binary_missing() {
        let registry = ToolchainRegistry::with_defaults();
        assert!(registry.locate_binary("definitely-not-a-real-binary").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_binary_falls_back_to_alternate_dirs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("fake-toolchain");
        std::fs::write(&candidate, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&candidate, std::fs::Permissions::from_mode(0o755)).unwrap();

        let registry = ToolchainRegistry::with_defaults()
            .with_fallback_dirs(vec![dir.path().to_path_buf()]);
        assert_eq!(registry.locate_binary("fake-toolchain"), Some(candidate));

        // Non-executable files are not acceptable matches
        let plain = dir.path().join("not-executable");
        std::fs::write(&plain, "data").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(registry.locate_binary("not-executable").is_none());
    }

    #[test]
    fn test_extended_path_appends_fallback_dirs() {
        let registry = ToolchainRegistry::with_defaults()
            .with_fallback_dirs(vec![PathBuf::from("/nonexistent/fallback-bin")]);
        let extended = registry.extended_path();
        let dirs: Vec<PathBuf> = std::env::split_paths(&extended).collect();
        assert!(dirs.contains(&PathBuf::from("/nonexistent/fallback-bin")));
    }
}
