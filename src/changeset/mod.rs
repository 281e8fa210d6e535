//! Staged-change lifecycle.
//!
//! A change-set is a staged, previewable, explicitly-applied set of
//! modifications to a deployed stack. Transitions are strictly monotonic:
//!
//! ```text
//! None -> Created -> Described -> Executed
//!            \----------\-> Removed
//! (any non-terminal) -> Failed
//! ```
//!
//! The operator confirmation gate sits between describe and execute/remove;
//! it is injectable so the lifecycle is testable headlessly.

mod confirm;

pub use confirm::{AlwaysNo, AlwaysYes, Confirm, Decision, TerminalConfirm};

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::provider::ChangeSetDescription;
use crate::resolver::TemplateResolver;
use crate::types::Parameter;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Lifecycle state of a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeSetState {
    /// Not yet registered with the provider.
    #[default]
    None,
    /// Registered, effect not yet summarized.
    Created,
    /// Effect summary fetched, awaiting a decision.
    Described,
    /// Applied. Terminal.
    Executed,
    /// Discarded without applying. Terminal.
    Removed,
    /// A provider call failed mid-lifecycle. Terminal.
    Failed,
}

impl ChangeSetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeSetState::None => "none",
            ChangeSetState::Created => "created",
            ChangeSetState::Described => "described",
            ChangeSetState::Executed => "executed",
            ChangeSetState::Removed => "removed",
            ChangeSetState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChangeSetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A staged change against one stack.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Owning stack (registry name, not the qualified provider name).
    pub stack: String,
    /// Provider-side change-set name.
    pub name: String,
    /// Current lifecycle state.
    pub state: ChangeSetState,
}

impl ChangeSet {
    /// Create a change-set handle in the initial state.
    pub fn new(stack: impl Into<String>, name: impl Into<String>) -> Self {
        Self { stack: stack.into(), name: name.into(), state: ChangeSetState::None }
    }

    /// Create a change-set with a generated name.
    pub fn generated(stack: impl Into<String>) -> Self {
        let stack = stack.into();
        let name = format!("{}-change-{}", stack, Uuid::new_v4().simple());
        Self { stack, name, state: ChangeSetState::None }
    }
}

/// Outcome of the staged update workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Change executed.
    Applied,
    /// Operator declined; change removed.
    Declined,
    /// Rendered template matches the deployed one; nothing staged.
    NoChanges,
}

/// Drives the staged-change lifecycle for stacks.
pub struct ChangeLifecycle {
    ctx: Context,
    resolver: TemplateResolver,
    confirm: Arc<dyn Confirm>,
}

impl ChangeLifecycle {
    pub fn new(ctx: Context, confirm: Arc<dyn Confirm>) -> Self {
        let resolver = TemplateResolver::new(ctx.clone());
        Self { ctx, resolver, confirm }
    }

    /// Register a staged change with the provider. `None -> Created`.
    ///
    /// `NoChanges` is a normal, non-fatal outcome: the rendered template is
    /// identical to the deployed one and the state stays `None`.
    #[instrument(skip(self), fields(stack = %change.stack, change = %change.name))]
    pub async fn create(&self, change: &mut ChangeSet) -> Result<()> {
        self.expect_state(change, &[ChangeSetState::None], "create")?;
        let (template, parameters) = self.resolved_template(&change.stack).await?;
        let qualified = self.ctx.qualified(&change.stack);

        match self
            .ctx
            .provider
            .create_change_set(&qualified, &change.name, &template, &parameters)
            .await
        {
            Ok(()) => {
                change.state = ChangeSetState::Created;
                info!(stack = %change.stack, "Change-set created");
                Ok(())
            }
            Err(e) if e.is_no_changes() => Err(e),
            Err(e) => {
                change.state = ChangeSetState::Failed;
                Err(e)
            }
        }
    }

    /// Fetch the staged change's effect summary. `Created -> Described`.
    #[instrument(skip(self), fields(stack = %change.stack, change = %change.name))]
    pub async fn describe(&self, change: &mut ChangeSet) -> Result<ChangeSetDescription> {
        self.expect_state(change, &[ChangeSetState::Created], "describe")?;
        let qualified = self.ctx.qualified(&change.stack);
        match self.ctx.provider.describe_change_set(&qualified, &change.name).await {
            Ok(description) => {
                change.state = ChangeSetState::Described;
                Ok(description)
            }
            Err(e) => {
                change.state = ChangeSetState::Failed;
                Err(e)
            }
        }
    }

    /// Apply the staged change. `Created | Described -> Executed`.
    ///
    /// Not idempotent: executing an already-executed change-set is an
    /// invalid-state error, not a silent no-op.
    #[instrument(skip(self), fields(stack = %change.stack, change = %change.name))]
    pub async fn execute(&self, change: &mut ChangeSet) -> Result<()> {
        self.expect_state(change, &[ChangeSetState::Created, ChangeSetState::Described], "execute")?;
        let qualified = self.ctx.qualified(&change.stack);
        match self.ctx.provider.execute_change_set(&qualified, &change.name).await {
            Ok(()) => {
                change.state = ChangeSetState::Executed;
                info!(stack = %change.stack, "Change-set executed");
                Ok(())
            }
            Err(e) => {
                change.state = ChangeSetState::Failed;
                Err(e)
            }
        }
    }

    /// Discard a staged, unexecuted change. `Created | Described -> Removed`.
    #[instrument(skip(self), fields(stack = %change.stack, change = %change.name))]
    pub async fn remove(&self, change: &mut ChangeSet) -> Result<()> {
        self.expect_state(change, &[ChangeSetState::Created, ChangeSetState::Described], "remove")?;
        let qualified = self.ctx.qualified(&change.stack);
        match self.ctx.provider.delete_change_set(&qualified, &change.name).await {
            Ok(()) => {
                change.state = ChangeSetState::Removed;
                info!(stack = %change.stack, "Change-set removed");
                Ok(())
            }
            Err(e) => {
                change.state = ChangeSetState::Failed;
                Err(e)
            }
        }
    }

    /// Full staged update workflow for one stack:
    /// render, create, describe, confirm, then execute or remove.
    #[instrument(skip(self))]
    pub async fn update(&self, stack: &str) -> Result<UpdateOutcome> {
        self.resolver.render(stack).await?;

        let mut change = ChangeSet::generated(stack);
        match self.create(&mut change).await {
            Ok(()) => {}
            Err(e) if e.is_no_changes() => {
                info!(stack = %stack, "Stack already up to date");
                return Ok(UpdateOutcome::NoChanges);
            }
            Err(e) => return Err(e),
        }

        let description = self.describe(&mut change).await?;
        for resource in &description.changes {
            info!(
                stack = %stack,
                action = %resource.action,
                resource = %resource.logical_id,
                "Staged change"
            );
        }

        let prompt =
            format!("The above changes will be applied to stack [{stack}], do you want to proceed?");
        match self.confirm.confirm(&prompt) {
            Decision::Yes => {
                self.execute(&mut change).await?;
                info!(stack = %stack, "Update completed");
                Ok(UpdateOutcome::Applied)
            }
            Decision::No => {
                self.remove(&mut change).await?;
                warn!(stack = %stack, "Update declined, change-set removed");
                Ok(UpdateOutcome::Declined)
            }
        }
    }

    fn expect_state(&self, change: &ChangeSet, allowed: &[ChangeSetState], op: &str) -> Result<()> {
        if allowed.contains(&change.state) {
            Ok(())
        } else {
            Err(StrataError::ChangeSetState {
                stack: change.stack.clone(),
                name: change.name.clone(),
                op: op.to_string(),
                state: change.state.as_str().to_string(),
            })
        }
    }

    async fn resolved_template(&self, stack: &str) -> Result<(String, Vec<Parameter>)> {
        let handle = self
            .ctx
            .registry
            .get(stack)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: stack.to_string() })?;
        let guard = handle.read().await;
        let template = guard.resolved.clone().ok_or_else(|| {
            StrataError::Internal(format!("stack {stack} has no resolved template; render it first"))
        })?;
        Ok((template, guard.parameters.clone()))
    }
}
