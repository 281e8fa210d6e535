//! Multi-stack deployment orchestration.
//!
//! The orchestrator computes dependency order over the actioned subset of
//! the registry and drives create/update/delete across it. Stacks are
//! grouped into tiers by topological sort: within a tier stacks proceed in
//! parallel (bounded by the run options), tiers execute sequentially.
//! Terminate processes tiers in reverse. A failure skips the not-yet-started
//! stacks that depend on it (deploy) or are depended on by it (terminate);
//! unaffected stacks continue, and the result is always a per-stack map.

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::outputs::OutputSynchronizer;
use crate::resolver::TemplateResolver;
use crate::types::StackStatus;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Per-stack result of an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackOutcome {
    /// Operation completed.
    Succeeded,
    /// Nothing to do (already up to date, or already absent).
    NoOp,
    /// Operation attempted and failed.
    Failed(String),
    /// Never attempted: an upstream stack did not complete.
    Skipped { blocked_on: String },
}

/// Dependency ordering over the actioned stacks.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Ordered tiers; a stack's tier is one greater than the maximum tier
    /// of any actioned stack it references.
    pub tiers: Vec<Vec<String>>,
    /// Edges stack -> actioned stacks that reference it.
    pub dependents: HashMap<String, Vec<String>>,
    /// Edges stack -> actioned stacks it references.
    pub dependencies: HashMap<String, Vec<String>>,
}

/// Drives create/update/delete across a batch of stacks.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Context,
    resolver: TemplateResolver,
    sync: OutputSynchronizer,
}

impl Orchestrator {
    pub fn new(ctx: Context) -> Self {
        let resolver = TemplateResolver::new(ctx.clone());
        let sync = OutputSynchronizer::new(ctx.clone());
        Self { ctx, resolver, sync }
    }

    /// Build the dependency plan for the actioned stacks.
    ///
    /// Edges come from the resolver's reference scan, without triggering
    /// full resolution or any remote call. A cycle among actioned stacks is
    /// fatal here, before any remote mutation.
    #[instrument(skip(self))]
    pub async fn plan(&self) -> Result<Plan> {
        let actioned = self.ctx.registry.actioned().await;

        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for name in &actioned {
            dependents.entry(name.clone()).or_default();
            let deps: Vec<String> = self
                .resolver
                .dependencies(name)
                .await?
                .into_iter()
                .filter(|d| actioned.contains(d))
                .collect();
            for dep in &deps {
                dependents.entry(dep.clone()).or_default().push(name.clone());
            }
            dependencies.insert(name.clone(), deps);
        }

        // Kahn's algorithm, tracking tier depth per node.
        let mut in_degree: HashMap<&str, usize> =
            actioned.iter().map(|n| (n.as_str(), dependencies[n].len())).collect();
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<&str> = actioned
            .iter()
            .map(String::as_str)
            .filter(|n| in_degree[n] == 0)
            .collect();
        for node in &queue {
            depth.insert(*node, 0);
        }

        let mut processed = 0;
        while let Some(node) = queue.pop_front() {
            processed += 1;
            let node_depth = depth[node];
            for dependent in &dependents[node] {
                let tier = depth.entry(dependent.as_str()).or_insert(0);
                *tier = (*tier).max(node_depth + 1);
                let remaining = in_degree
                    .get_mut(dependent.as_str())
                    .expect("dependent is an actioned stack");
                *remaining -= 1;
                if *remaining == 0 {
                    queue.push_back(dependent.as_str());
                }
            }
        }

        if processed != actioned.len() {
            let mut chain: Vec<String> = actioned
                .iter()
                .filter(|n| in_degree[n.as_str()] > 0)
                .cloned()
                .collect();
            chain.sort();
            return Err(StrataError::DependencyCycle { chain });
        }

        let tier_count = depth.values().copied().max().map_or(0, |d| d + 1);
        let mut tiers = vec![Vec::new(); tier_count];
        for name in &actioned {
            tiers[depth[name.as_str()]].push(name.clone());
        }
        for tier in &mut tiers {
            tier.sort();
        }

        info!(stacks = actioned.len(), tiers = tiers.len(), "Deployment plan computed");
        Ok(Plan { tiers, dependents, dependencies })
    }

    /// Deploy the actioned stacks in dependency order.
    #[instrument(skip(self))]
    pub async fn deploy(&self) -> Result<HashMap<String, StackOutcome>> {
        let plan = self.plan().await?;
        let outcomes = self.run_tiers(&plan, plan.tiers.clone(), Operation::Deploy).await;
        self.ctx.registry.clear_actioned().await;
        Ok(outcomes)
    }

    /// Terminate the actioned stacks in reverse dependency order: a stack
    /// with dependents is torn down only after all of them are gone.
    #[instrument(skip(self))]
    pub async fn terminate(&self) -> Result<HashMap<String, StackOutcome>> {
        let plan = self.plan().await?;
        let mut tiers = plan.tiers.clone();
        tiers.reverse();
        let outcomes = self.run_tiers(&plan, tiers, Operation::Terminate).await;
        self.ctx.registry.clear_actioned().await;
        Ok(outcomes)
    }

    async fn run_tiers(
        &self,
        plan: &Plan,
        tiers: Vec<Vec<String>>,
        operation: Operation,
    ) -> HashMap<String, StackOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.ctx.options.max_in_flight));
        let mut outcomes = HashMap::new();
        // stack -> failed upstream root that blocks it
        let mut blocked: HashMap<String, String> = HashMap::new();

        for tier in tiers {
            let mut tasks = JoinSet::new();
            for name in tier {
                if let Some(cause) = blocked.get(&name) {
                    warn!(stack = %name, blocked_on = %cause, "Skipping stack, upstream failed");
                    self.mark_failed(&name).await;
                    outcomes.insert(name, StackOutcome::Skipped { blocked_on: cause.clone() });
                    continue;
                }

                let orchestrator = self.clone();
                let semaphore = semaphore.clone();
                tasks.spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    let outcome = match operation {
                        Operation::Deploy => orchestrator.deploy_one(&name).await,
                        Operation::Terminate => orchestrator.terminate_one(&name).await,
                    };
                    (name, outcome)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (name, outcome) = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        error!(error = %e, "Orchestration task panicked");
                        continue;
                    }
                };
                if matches!(outcome, StackOutcome::Failed(_)) {
                    self.block_downstream(plan, &name, operation, &mut blocked);
                }
                outcomes.insert(name, outcome);
            }
        }
        outcomes
    }

    /// Mark everything that transitively depends on `root` (deploy) or is
    /// depended on by it (terminate) as blocked.
    fn block_downstream(
        &self,
        plan: &Plan,
        root: &str,
        operation: Operation,
        blocked: &mut HashMap<String, String>,
    ) {
        let edges = match operation {
            Operation::Deploy => &plan.dependents,
            Operation::Terminate => &plan.dependencies,
        };
        let mut pending = vec![root.to_string()];
        while let Some(node) = pending.pop() {
            if let Some(next) = edges.get(&node) {
                for name in next {
                    if !blocked.contains_key(name) {
                        blocked.insert(name.clone(), root.to_string());
                        pending.push(name.clone());
                    }
                }
            }
        }
    }

    /// Deploy one stack: resolve, then create or update depending on the
    /// live status, then refresh outputs so dependents can resolve.
    async fn deploy_one(&self, name: &str) -> StackOutcome {
        if let Err(e) = self.resolver.render(name).await {
            error!(stack = %name, error = %e, "Template resolution failed");
            self.mark_failed(name).await;
            return StackOutcome::Failed(e.to_string());
        }
        if let Err(e) = self.sync.sync(name).await {
            error!(stack = %name, error = %e, "Status fetch failed");
            self.mark_failed(name).await;
            return StackOutcome::Failed(e.to_string());
        }

        let handle = self.ctx.registry.must_get(name).await;
        let (status, template, parameters) = {
            let stack = handle.read().await;
            let template = stack.resolved.clone().unwrap_or_default();
            (stack.status, template, stack.parameters.clone())
        };
        handle.write().await.status = StackStatus::InProgress;

        let qualified = self.ctx.qualified(name);
        let result = match status {
            StackStatus::NotDeployed => {
                info!(stack = %name, "Creating stack");
                self.ctx.provider.create_stack(&qualified, &template, &parameters).await
            }
            _ => {
                info!(stack = %name, "Updating stack");
                self.ctx.provider.update_stack(&qualified, &template, &parameters).await
            }
        };

        match result {
            Ok(()) => {
                // Refresh outputs before reporting success; dependents in the
                // next tier read this snapshot.
                if let Err(e) = self.sync.sync(name).await {
                    warn!(stack = %name, error = %e, "Deployed but output refresh failed");
                    handle.write().await.status = StackStatus::Deployed;
                }
                info!(stack = %name, "Stack deployed");
                StackOutcome::Succeeded
            }
            Err(e) if e.is_no_changes() => {
                info!(stack = %name, "Stack already up to date");
                handle.write().await.status = StackStatus::Deployed;
                StackOutcome::NoOp
            }
            Err(e) => {
                error!(stack = %name, error = %e, "Deploy failed");
                self.mark_failed(name).await;
                StackOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tear down one stack. Absent stacks are a no-op, not an error.
    async fn terminate_one(&self, name: &str) -> StackOutcome {
        if let Err(e) = self.sync.sync(name).await {
            error!(stack = %name, error = %e, "Status fetch failed");
            self.mark_failed(name).await;
            return StackOutcome::Failed(e.to_string());
        }

        let handle = self.ctx.registry.must_get(name).await;
        if handle.read().await.status == StackStatus::NotDeployed {
            info!(stack = %name, "Stack already absent");
            return StackOutcome::NoOp;
        }
        handle.write().await.status = StackStatus::InProgress;

        let qualified = self.ctx.qualified(name);
        match self.ctx.provider.delete_stack(&qualified).await {
            Ok(()) => {
                if let Err(e) = self.sync.sync(name).await {
                    warn!(stack = %name, error = %e, "Deleted but status refresh failed");
                    handle.write().await.status = StackStatus::NotDeployed;
                }
                info!(stack = %name, "Stack terminated");
                StackOutcome::Succeeded
            }
            Err(e) => {
                error!(stack = %name, error = %e, "Terminate failed");
                self.mark_failed(name).await;
                StackOutcome::Failed(e.to_string())
            }
        }
    }

    async fn mark_failed(&self, name: &str) {
        if let Some(handle) = self.ctx.registry.get(name).await {
            handle.write().await.status = StackStatus::Failed;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Deploy,
    Terminate,
}
