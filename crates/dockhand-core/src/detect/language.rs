//! Language fingerprinting from manifest and lockfile names.

use std::path::Path;

use tracing::debug;

/// Manifest or lockfile name to language identifier.
pub const LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("Cargo.lock", "rust"),
    ("go.mod", "go"),
    ("go.sum", "go"),
    ("package.json", "node"),
    ("package-lock.json", "node"),
    ("yarn.lock", "node"),
    ("pnpm-lock.yaml", "node"),
    ("bun.lockb", "node"),
    ("pyproject.toml", "python"),
    ("requirements.txt", "python"),
    ("Pipfile", "python"),
    ("Pipfile.lock", "python"),
    ("poetry.lock", "python"),
    ("uv.lock", "python"),
    ("setup.py", "python"),
    ("Gemfile", "ruby"),
    ("Gemfile.lock", "ruby"),
    ("pom.xml", "java"),
    ("build.gradle", "java"),
    ("build.gradle.kts", "kotlin"),
    ("composer.json", "php"),
    ("composer.lock", "php"),
    ("mix.exs", "elixir"),
    ("mix.lock", "elixir"),
    ("Package.swift", "swift"),
    ("global.json", "dotnet"),
    ("deno.json", "deno"),
    ("deno.jsonc", "deno"),
];

/// Language identifier for a single file name.
pub fn language_for(file_name: &str) -> Option<&'static str> {
    LANGUAGE_TABLE
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, lang)| *lang)
        .or_else(|| {
            let lower = file_name.to_ascii_lowercase();
            (lower.ends_with(".csproj") || lower.ends_with(".fsproj") || lower.ends_with(".sln"))
                .then_some("dotnet")
        })
}

/// Scan `root` (non-recursively) for manifests.
///
/// Returns the first matching language in lexical entry order and every
/// matching file name. Unreadable directories yield nothing.
pub fn scan(root: &Path) -> (String, Vec<String>) {
    let mut names: Vec<String> = match std::fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            debug!(root = %root.display(), error = %e, "language scan skipped");
            return (String::new(), Vec::new());
        }
    };
    names.sort();

    let mut language = String::new();
    let mut lockfiles = Vec::new();
    for name in names {
        if let Some(lang) = language_for(&name) {
            if language.is_empty() {
                language = lang.to_string();
            }
            lockfiles.push(name);
        }
    }
    (language, lockfiles)
}
