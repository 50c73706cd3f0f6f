//! Domain-level error taxonomy for Dockhand.

/// Dockhand domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DockhandError {
    #[error("no usable build file for build '{build}': {reason}")]
    NoBuildFile { build: String, reason: String },

    #[error("unknown build: {0}")]
    UnknownBuild(String),

    #[error("missing credentials for registry {registry}: set {}", vars.join(", "))]
    MissingCredentials { registry: String, vars: Vec<String> },

    #[error("invalid tag '{tag}' for build '{build}', registry target #{index} ({registry})")]
    InvalidTag {
        build: String,
        index: usize,
        registry: String,
        tag: String,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("{program} exited with code {code}: {stderr}")]
    ProcessFailed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Dockhand domain operations.
pub type Result<T> = std::result::Result<T, DockhandError>;
