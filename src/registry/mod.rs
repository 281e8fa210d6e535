//! Concurrency-safe named collection of stacks.
//!
//! The registry hands out per-stack handles (`Arc<RwLock<Stack>>`) so tasks
//! touching different stacks never contend. No atomic snapshot is guaranteed
//! across multiple calls; callers that check existence and then act follow a
//! single-writer-per-stack discipline.

use crate::config::ProjectConfig;
use crate::types::Stack;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to one stack.
pub type StackHandle = Arc<RwLock<Stack>>;

/// Mapping from stack name to stack, safe under arbitrary concurrent callers.
#[derive(Debug, Default)]
pub struct StackRegistry {
    stacks: RwLock<HashMap<String, StackHandle>>,
}

impl StackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a validated project config.
    pub fn from_project(config: &ProjectConfig) -> Self {
        let mut stacks = HashMap::new();
        for (name, entry) in &config.stacks {
            let mut stack = Stack::new(name, &entry.source, &entry.template);
            stack.values = entry.values.clone();
            stack.parameters = entry.parameters.clone();
            stack.policy = entry.policy.clone();
            stacks.insert(name.clone(), Arc::new(RwLock::new(stack)));
        }
        Self { stacks: RwLock::new(stacks) }
    }

    /// Insert or replace a stack.
    pub async fn insert(&self, stack: Stack) -> StackHandle {
        let handle = Arc::new(RwLock::new(stack));
        let name = handle.read().await.name.clone();
        self.stacks.write().await.insert(name, handle.clone());
        handle
    }

    /// Look up a stack by name.
    pub async fn get(&self, name: &str) -> Option<StackHandle> {
        self.stacks.read().await.get(name).cloned()
    }

    /// Forced lookup.
    ///
    /// # Panics
    /// Panics if the stack is absent. Reserved for call sites that already
    /// validated existence; a miss here is a programmer error, not a
    /// recoverable condition.
    pub async fn must_get(&self, name: &str) -> StackHandle {
        self.get(name)
            .await
            .unwrap_or_else(|| panic!("stack not in registry: {name} (validate with get() first)"))
    }

    /// Existence check.
    pub async fn contains(&self, name: &str) -> bool {
        self.stacks.read().await.contains_key(name)
    }

    /// Number of stacks.
    pub async fn count(&self) -> usize {
        self.stacks.read().await.len()
    }

    /// Names of all stacks, in no particular order.
    pub async fn names(&self) -> Vec<String> {
        self.stacks.read().await.keys().cloned().collect()
    }

    /// Call `visit` for each entry in unspecified order, stopping early if
    /// `visit` returns false. Returns false if iteration stopped early.
    pub async fn range<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(&str, &StackHandle) -> bool,
    {
        let stacks = self.stacks.read().await;
        for (name, handle) in stacks.iter() {
            if !visit(name, handle) {
                return false;
            }
        }
        true
    }

    /// Names of stacks flagged for the current orchestration run.
    pub async fn actioned(&self) -> Vec<String> {
        let stacks = self.stacks.read().await;
        let mut names = Vec::new();
        for (name, handle) in stacks.iter() {
            if handle.read().await.actioned {
                names.push(name.clone());
            }
        }
        names
    }

    /// Flag a stack for the current orchestration run.
    pub async fn set_actioned(&self, name: &str) -> bool {
        match self.get(name).await {
            Some(handle) => {
                handle.write().await.actioned = true;
                true
            }
            None => false,
        }
    }

    /// Clear all actioned flags. Flags are scoped to a single orchestration
    /// run and must not leak into the next.
    pub async fn clear_actioned(&self) {
        let stacks = self.stacks.read().await;
        for handle in stacks.values() {
            handle.write().await.actioned = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(name: &str) -> Stack {
        Stack::new(name, format!("templates/{name}.yml"), "body")
    }

    #[tokio::test]
    async fn get_agrees_with_range() {
        let registry = StackRegistry::new();
        registry.insert(stack("vpc")).await;
        registry.insert(stack("subnet")).await;

        let mut seen = Vec::new();
        registry
            .range(|name, _| {
                seen.push(name.to_string());
                true
            })
            .await;
        assert_eq!(seen.len(), 2);

        for name in seen {
            let handle = registry.get(&name).await.expect("ranged name must resolve");
            assert_eq!(handle.read().await.name, name);
        }
    }

    #[tokio::test]
    async fn range_stops_early() {
        let registry = StackRegistry::new();
        registry.insert(stack("a")).await;
        registry.insert(stack("b")).await;
        registry.insert(stack("c")).await;

        let mut visited = 0;
        let completed = registry
            .range(|_, _| {
                visited += 1;
                false
            })
            .await;
        assert!(!completed);
        assert_eq!(visited, 1);
    }

    #[tokio::test]
    async fn actioned_flags_are_scoped_to_a_run() {
        let registry = StackRegistry::new();
        registry.insert(stack("vpc")).await;
        assert!(registry.set_actioned("vpc").await);
        assert!(!registry.set_actioned("missing").await);
        assert_eq!(registry.actioned().await, vec!["vpc".to_string()]);

        registry.clear_actioned().await;
        assert!(registry.actioned().await.is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "stack not in registry")]
    async fn must_get_panics_on_absence() {
        let registry = StackRegistry::new();
        registry.must_get("ghost").await;
    }
}
