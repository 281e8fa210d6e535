//! Strata Orchestration Engine
//!
//! Lifecycle management for named infrastructure stacks described in a
//! declarative configuration: template rendering with cross-stack output
//! references, a staged change-set workflow, and dependency-ordered
//! deploy/terminate across many stacks.

pub mod changeset;
pub mod config;
pub mod context;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod outputs;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod types;

// Re-export commonly used items
pub use changeset::{ChangeLifecycle, ChangeSet, ChangeSetState, UpdateOutcome};
pub use config::{ProjectConfig, StackConfig};
pub use context::{Context, RunOptions};
pub use error::{Result, StrataError};
pub use orchestrator::{Orchestrator, Plan, StackOutcome};
pub use outputs::OutputSynchronizer;
pub use policy::PolicyApplier;
pub use provider::CloudProvider;
pub use registry::{StackHandle, StackRegistry};
pub use resolver::TemplateResolver;
pub use types::{DeployedInstance, OutputSnapshot, Parameter, Stack, StackStatus};
