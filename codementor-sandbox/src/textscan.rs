//! Best-effort text scanning for toolchain-specific behavior
//!
//! Two pure helpers kept separate from the engine so their heuristics can
//! be tested against many toolchain message formats without spawning real
//! subprocesses.

/// Derive the entry-point basename from source that declares a public type.
///
/// Scans line by line for the first `public class` declaration and returns
/// the identifier immediately following it. Java's compiler requires the
/// file basename to match that identifier.
pub fn derive_entry_name(source: &str) -> Option<String> {
    for line in source.lines() {
        if let Some(rest) = line.split_once("public class").map(|(_, r)| r) {
            let ident: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
                .collect();
            if !ident.is_empty() {
                return Some(ident);
            }
        }
    }
    None
}

/// Strip toolchain-manager advisory noise from compiler stderr.
///
/// rustup injects `info:` lines (component downloads, toolchain syncs) into
/// stderr of the proxied compiler, and non-fatal `warning:` lines do not by
/// themselves indicate a failed compile. Only prefix matching is attempted;
/// toolchain versions with different message formats may slip through.
pub fn filter_diagnostics(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.starts_with("info:") && !trimmed.starts_with("warning:")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
