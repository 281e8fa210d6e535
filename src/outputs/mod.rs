//! Output and parameter synchronization with the remote provider.
//!
//! The synchronizer fetches a stack's live deployed state and overwrites the
//! stack's output snapshot. It also produces the structured dumps consumed
//! by downstream tooling: key-ordered output JSON, a parameter report that
//! flags divergence from locally configured values, and a YAML dump of a
//! stack's local values.

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::types::{OutputSnapshot, Stack};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument};

/// Fetches live deployed state (outputs, parameters) for stacks.
#[derive(Clone)]
pub struct OutputSynchronizer {
    ctx: Context,
}

impl OutputSynchronizer {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Fetch the live state of one stack and overwrite its snapshot.
    ///
    /// On failure the previous snapshot is left unchanged, not cleared. An
    /// absent stack yields an empty snapshot and `NotDeployed` status.
    /// Concurrent calls for the same stack are not deduplicated; last
    /// writer wins.
    #[instrument(skip(self))]
    pub async fn sync(&self, name: &str) -> Result<()> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;

        let qualified = self.ctx.qualified(name);
        let instances = self.ctx.provider.describe_stack(&qualified).await?;

        debug!(stack = %name, instances = instances.len(), "Synchronized outputs");

        let snapshot = OutputSnapshot { instances, synced_at: Some(SystemTime::now()) };
        let mut stack = handle.write().await;
        stack.status = Stack::status_from_snapshot(&snapshot);
        stack.snapshot = snapshot;
        Ok(())
    }

    /// Synchronize several stacks in parallel, bounded by the run options.
    ///
    /// Failures are per stack; siblings continue. Returns an error map for
    /// the stacks that failed.
    #[instrument(skip(self, names))]
    pub async fn sync_many<I, S>(&self, names: I) -> HashMap<String, StrataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let semaphore = Arc::new(Semaphore::new(self.ctx.options.max_in_flight));
        let mut tasks = JoinSet::new();

        for name in names {
            let name = name.into();
            let sync = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // Closed only if the JoinSet is dropped first.
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = sync.sync(&name).await;
                (name, result)
            });
        }

        let mut failures = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(stack = %name, "Outputs up to date"),
                Ok((name, Err(e))) => {
                    error!(stack = %name, error = %e, "Output sync failed");
                    failures.insert(name, e);
                }
                Err(e) => error!(error = %e, "Output sync task panicked"),
            }
        }
        failures
    }

    /// Key-ordered pretty JSON of a stack's deployed outputs, one object
    /// per deployed instance.
    pub async fn outputs_json(&self, name: &str) -> Result<String> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;
        let stack = handle.read().await;
        let dump: Vec<_> = stack.snapshot.instances.iter().map(|i| &i.outputs).collect();
        Ok(serde_json::to_string_pretty(&dump)?)
    }

    /// Sorted parameter report for a stack's deployed instances.
    ///
    /// Each line is `key: value`; when a locally configured parameter
    /// diverges from the deployed one, the local value is appended as
    /// `vs. <local>` so drift is explicit.
    pub async fn parameter_report(&self, name: &str) -> Result<String> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;
        let stack = handle.read().await;

        let mut report = String::new();
        for instance in &stack.snapshot.instances {
            let mut deployed = instance.parameters.clone();
            deployed.sort_by(|a, b| a.key.cmp(&b.key));
            for param in &deployed {
                let _ = write!(report, "{}: {}", param.key, param.value);
                if let Some(local) =
                    stack.parameters.iter().find(|p| p.key == param.key && p.value != param.value)
                {
                    let _ = write!(report, " vs. {}", local.value);
                }
                report.push('\n');
            }
        }
        Ok(report)
    }

    /// Human-readable YAML dump of a stack's local config values.
    pub async fn values_yaml(&self, name: &str) -> Result<String> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;
        let stack = handle.read().await;
        Ok(serde_yaml::to_string(&stack.values)?)
    }

    /// List all exports visible to the project.
    pub async fn exports(&self) -> Result<Vec<crate::provider::Export>> {
        self.ctx.provider.list_exports().await
    }
}
