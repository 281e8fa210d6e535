//! Remote-provider abstraction.
//!
//! All provider integrations implement the `CloudProvider` trait. The engine
//! never talks to a provider SDK directly; everything remote goes through
//! this seam, which also makes the engine testable with an in-memory
//! implementation.

use crate::error::Result;
use crate::types::{DeployedInstance, Parameter};
use async_trait::async_trait;

/// A named value exported by a deployed stack, readable project-wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub value: String,
    pub exporting_stack: String,
}

/// One resource-level change inside a staged change-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    /// Provider action, e.g. "Add", "Modify", "Remove".
    pub action: String,
    /// Logical id of the affected resource.
    pub logical_id: String,
}

/// Human-readable summary of a staged change-set's effect.
#[derive(Debug, Clone)]
pub struct ChangeSetDescription {
    pub change_name: String,
    pub status: String,
    pub changes: Vec<ResourceChange>,
}

/// Remote provider operations consumed by the engine.
///
/// Stack names passed here are provider-side qualified names
/// (`{project}-{stack}`). Implementations surface failures per call and
/// never retry; retry policy is the caller's responsibility.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Create a stack directly (non-staged path).
    async fn create_stack(&self, name: &str, template: &str, parameters: &[Parameter]) -> Result<()>;

    /// Update a deployed stack directly (non-staged path).
    ///
    /// Returns `StrataError::NoChanges` when the submitted template matches
    /// the deployed one.
    async fn update_stack(&self, name: &str, template: &str, parameters: &[Parameter]) -> Result<()>;

    /// Delete a deployed stack. Deleting an absent stack is a no-op.
    async fn delete_stack(&self, name: &str) -> Result<()>;

    /// Describe a stack's deployed instances (outputs and parameters).
    ///
    /// Returns `Ok(vec![])` for a stack with no deployed instance; errors
    /// are reserved for real provider failures.
    async fn describe_stack(&self, name: &str) -> Result<Vec<DeployedInstance>>;

    /// Register a staged change with the provider.
    ///
    /// Returns `StrataError::NoChanges` when the submitted template matches
    /// the deployed one.
    async fn create_change_set(
        &self,
        name: &str,
        change_name: &str,
        template: &str,
        parameters: &[Parameter],
    ) -> Result<()>;

    /// Fetch a summary of a staged change's effect.
    async fn describe_change_set(&self, name: &str, change_name: &str) -> Result<ChangeSetDescription>;

    /// Apply a staged change. Not idempotent on the provider side.
    async fn execute_change_set(&self, name: &str, change_name: &str) -> Result<()>;

    /// Discard a staged, unexecuted change.
    async fn delete_change_set(&self, name: &str, change_name: &str) -> Result<()>;

    /// Push a protection-policy document to a deployed stack.
    async fn set_stack_policy(&self, name: &str, policy: &str) -> Result<()>;

    /// Validate a rendered template without deploying it.
    async fn validate_template(&self, template: &str) -> Result<()>;

    /// List all exports visible to the project.
    async fn list_exports(&self) -> Result<Vec<Export>>;
}
