use thiserror::Error;

/// Crate-wide error type shared by every SnowCat component.
///
/// Most variants map directly onto the error kinds enumerated in spec.md
/// §7: transient backend failures propagate for the caller to retry,
/// topology validation failures are collected and surfaced before ingress
/// starts, and configuration errors are reported at load time.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend KV store was unreachable or a script execution failed.
    /// Callers should retry; this is never a logical failure of an
    /// operation (spec.md §4.1 "Failure semantics").
    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// One or more topology validation errors (empty stage name, unknown
    /// dependency, or a cycle). Collected rather than returned eagerly so
    /// the operator sees every problem at once (spec.md §7).
    #[error("topology validation failed: {}", .0.join("; "))]
    TopologyValidation(Vec<String>),

    #[error("circular stage dependency: {0}")]
    CircularDependency(String),

    /// A named lease, stage, queue, or stream was referenced but does not
    /// exist in the current topology/runtime.
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
