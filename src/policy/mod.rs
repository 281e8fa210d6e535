//! Stack protection policies.
//!
//! Pushes a stack's configured protection-policy document to the provider.
//! Independent of deployment ordering; batch application fans out
//! concurrently and reports failures per stack.

use crate::context::Context;
use crate::error::{Result, StrataError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

/// Applies protection-policy documents to deployed stacks.
#[derive(Clone)]
pub struct PolicyApplier {
    ctx: Context,
}

impl PolicyApplier {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Push one stack's configured policy document to the provider.
    #[instrument(skip(self))]
    pub async fn apply(&self, name: &str) -> Result<()> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;

        let policy = handle.read().await.policy.clone().ok_or_else(|| {
            StrataError::MissingField { stack: name.to_string(), field: "policy".to_string() }
        })?;

        let qualified = self.ctx.qualified(name);
        self.ctx.provider.set_stack_policy(&qualified, &policy).await?;
        info!(stack = %name, "Stack policy applied");
        Ok(())
    }

    /// Apply policies for every actioned stack, concurrently.
    ///
    /// Failure is per stack and does not block siblings. Actioned flags are
    /// cleared afterwards. Returns an error map for the stacks that failed.
    #[instrument(skip(self))]
    pub async fn apply_actioned(&self) -> HashMap<String, StrataError> {
        let names = self.ctx.registry.actioned().await;
        let semaphore = Arc::new(Semaphore::new(self.ctx.options.max_in_flight));
        let mut tasks = JoinSet::new();

        for name in names {
            let applier = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = applier.apply(&name).await;
                (name, result)
            });
        }

        let mut failures = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    error!(stack = %name, error = %e, "Policy application failed");
                    failures.insert(name, e);
                }
                Err(e) => error!(error = %e, "Policy task panicked"),
            }
        }
        self.ctx.registry.clear_actioned().await;
        failures
    }
}
