//! Explicit run context.
//!
//! Every operation takes a `Context` instead of relying on process-wide
//! singletons: the registry, the provider client, and run options travel
//! together.

use crate::provider::CloudProvider;
use crate::registry::StackRegistry;
use std::sync::Arc;

/// Options for one orchestration run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Bound on concurrent in-flight remote calls, to respect provider
    /// rate limits under large stack counts.
    pub max_in_flight: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { max_in_flight: 8 }
    }
}

/// Shared state for one project: registry, provider client, run options.
#[derive(Clone)]
pub struct Context {
    /// Project name; deployed stack names are qualified `{project}-{stack}`.
    pub project: String,
    pub registry: Arc<StackRegistry>,
    pub provider: Arc<dyn CloudProvider>,
    pub options: RunOptions,
}

impl Context {
    /// Create a context with default run options.
    pub fn new(
        project: impl Into<String>,
        registry: Arc<StackRegistry>,
        provider: Arc<dyn CloudProvider>,
    ) -> Self {
        Self { project: project.into(), registry, provider, options: RunOptions::default() }
    }

    /// Override run options.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Provider-side name for a stack in this project.
    pub fn qualified(&self, stack: &str) -> String {
        format!("{}-{}", self.project, stack)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("project", &self.project)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
