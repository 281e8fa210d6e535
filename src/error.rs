//! Error types for Strata.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

/// Main error type for Strata.
#[derive(Error, Debug)]
pub enum StrataError {
    // Configuration errors
    #[error("Stack not found in config: {name}")]
    StackNotFound { name: String },

    #[error("Missing required field for stack {stack}: {field}")]
    MissingField { stack: String, field: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Template resolution errors
    #[error("Stack {stack} has no source template")]
    EmptySource { stack: String },

    #[error("Malformed reference in stack {stack}: {{{{{reference}}}}}")]
    MalformedReference { stack: String, reference: String },

    #[error("Unresolved reference in stack {stack}: {{{{{reference}}}}} ({reason})")]
    UnresolvedReference { stack: String, reference: String, reason: String },

    #[error("Cyclic dependency detected: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    // Remote provider errors
    #[error("Provider {op} failed for stack {stack}: {reason}")]
    RemoteApi { op: String, stack: String, reason: String },

    // Change-set lifecycle errors
    #[error("Change-set {name} on stack {stack}: cannot {op} from state {state}")]
    ChangeSetState { stack: String, name: String, op: String, state: String },

    #[error("No changes to apply for stack {stack}: rendered template matches deployed template")]
    NoChanges { stack: String },

    // Orchestration errors
    #[error("Dependency cycle among actioned stacks: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    // Serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StrataError {
    /// Create a RemoteApi error from any error type.
    pub fn remote(op: impl Into<String>, stack: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::RemoteApi { op: op.into(), stack: stack.into(), reason: err.to_string() }
    }

    /// True for the non-fatal "already up to date" outcome of change-set creation.
    pub fn is_no_changes(&self) -> bool {
        matches!(self, Self::NoChanges { .. })
    }
}
