//! Shared test fixtures: an in-memory provider and context builders.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use strata::config::ProjectConfig;
use strata::context::Context;
use strata::error::{Result, StrataError};
use strata::provider::{ChangeSetDescription, CloudProvider, Export, ResourceChange};
use strata::registry::StackRegistry;
use strata::types::{DeployedInstance, Parameter, StackStatus};

/// A deployed stack as the fake provider sees it.
#[derive(Debug, Clone, Default)]
pub struct RemoteStack {
    pub template: String,
    pub parameters: Vec<Parameter>,
    pub outputs: BTreeMap<String, String>,
    pub policy: Option<String>,
}

#[derive(Debug, Clone)]
struct StagedChange {
    stack: String,
    template: String,
    parameters: Vec<Parameter>,
    executed: bool,
}

#[derive(Debug, Default)]
struct ProviderState {
    deployed: HashMap<String, RemoteStack>,
    // preset outputs attached when a stack is (re)deployed
    preset_outputs: HashMap<String, BTreeMap<String, String>>,
    changes: HashMap<String, StagedChange>,
    exports: Vec<Export>,
    fail_mutations: HashSet<String>,
    fail_describe: HashSet<String>,
    fail_validation: bool,
}

/// In-memory provider for tests; no network, deterministic.
///
/// Records every remote call in `calls` (e.g. `create:acme-vpc`) so tests
/// can assert ordering.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{op}:{name}"));
    }

    fn check_mutation(&self, op: &str, name: &str) -> Result<()> {
        if self.state.lock().unwrap().fail_mutations.contains(name) {
            return Err(StrataError::remote(op, name, "injected failure"));
        }
        Ok(())
    }

    /// Outputs to attach whenever `name` is deployed.
    pub fn set_outputs<const N: usize>(&self, name: &str, outputs: [(&str, &str); N]) {
        let map = outputs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.state.lock().unwrap().preset_outputs.insert(name.to_string(), map);
    }

    /// Pre-deploy a stack on the provider side.
    pub fn seed_deployed(&self, name: &str, template: &str) {
        let mut state = self.state.lock().unwrap();
        let outputs = state.preset_outputs.get(name).cloned().unwrap_or_default();
        state.deployed.insert(
            name.to_string(),
            RemoteStack { template: template.to_string(), outputs, ..Default::default() },
        );
    }

    /// Every mutation on `name` fails from now on.
    pub fn fail_mutations_on(&self, name: &str) {
        self.state.lock().unwrap().fail_mutations.insert(name.to_string());
    }

    /// Every describe of `name` fails from now on.
    pub fn fail_describe_on(&self, name: &str) {
        self.state.lock().unwrap().fail_describe.insert(name.to_string());
    }

    /// Every template validation fails from now on.
    pub fn fail_validation(&self) {
        self.state.lock().unwrap().fail_validation = true;
    }

    pub fn add_export(&self, name: &str, value: &str, stack: &str) {
        self.state.lock().unwrap().exports.push(Export {
            name: name.to_string(),
            value: value.to_string(),
            exporting_stack: stack.to_string(),
        });
    }

    pub fn deployed(&self, name: &str) -> Option<RemoteStack> {
        self.state.lock().unwrap().deployed.get(name).cloned()
    }

    pub fn call_index(&self, call: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == call)
    }

    fn change_key(name: &str, change_name: &str) -> String {
        format!("{name}/{change_name}")
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    async fn create_stack(&self, name: &str, template: &str, parameters: &[Parameter]) -> Result<()> {
        self.record("create", name);
        self.check_mutation("create-stack", name)?;
        let mut state = self.state.lock().unwrap();
        if state.deployed.contains_key(name) {
            return Err(StrataError::remote("create-stack", name, "stack already exists"));
        }
        let outputs = state.preset_outputs.get(name).cloned().unwrap_or_default();
        state.deployed.insert(
            name.to_string(),
            RemoteStack {
                template: template.to_string(),
                parameters: parameters.to_vec(),
                outputs,
                policy: None,
            },
        );
        Ok(())
    }

    async fn update_stack(&self, name: &str, template: &str, parameters: &[Parameter]) -> Result<()> {
        self.record("update", name);
        self.check_mutation("update-stack", name)?;
        let mut state = self.state.lock().unwrap();
        let stack = state
            .deployed
            .get_mut(name)
            .ok_or_else(|| StrataError::remote("update-stack", name, "stack does not exist"))?;
        if stack.template == template {
            return Err(StrataError::NoChanges { stack: name.to_string() });
        }
        stack.template = template.to_string();
        stack.parameters = parameters.to_vec();
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        self.record("delete", name);
        self.check_mutation("delete-stack", name)?;
        self.state.lock().unwrap().deployed.remove(name);
        Ok(())
    }

    async fn describe_stack(&self, name: &str) -> Result<Vec<DeployedInstance>> {
        self.record("describe", name);
        let state = self.state.lock().unwrap();
        if state.fail_describe.contains(name) {
            return Err(StrataError::remote("describe-stack", name, "injected failure"));
        }
        Ok(state
            .deployed
            .get(name)
            .map(|stack| {
                vec![DeployedInstance {
                    instance_id: format!("{name}-1"),
                    outputs: stack.outputs.clone(),
                    parameters: stack.parameters.clone(),
                    status: StackStatus::Deployed,
                }]
            })
            .unwrap_or_default())
    }

    async fn create_change_set(
        &self,
        name: &str,
        change_name: &str,
        template: &str,
        parameters: &[Parameter],
    ) -> Result<()> {
        self.record("create-change-set", name);
        self.check_mutation("create-change-set", name)?;
        let mut state = self.state.lock().unwrap();
        let deployed = state
            .deployed
            .get(name)
            .ok_or_else(|| StrataError::remote("create-change-set", name, "stack does not exist"))?;
        if deployed.template == template {
            return Err(StrataError::NoChanges { stack: name.to_string() });
        }
        state.changes.insert(
            Self::change_key(name, change_name),
            StagedChange {
                stack: name.to_string(),
                template: template.to_string(),
                parameters: parameters.to_vec(),
                executed: false,
            },
        );
        Ok(())
    }

    async fn describe_change_set(&self, name: &str, change_name: &str) -> Result<ChangeSetDescription> {
        self.record("describe-change-set", name);
        let state = self.state.lock().unwrap();
        state
            .changes
            .get(&Self::change_key(name, change_name))
            .map(|_| ChangeSetDescription {
                change_name: change_name.to_string(),
                status: "CREATE_COMPLETE".to_string(),
                changes: vec![ResourceChange {
                    action: "Modify".to_string(),
                    logical_id: "Resource".to_string(),
                }],
            })
            .ok_or_else(|| StrataError::remote("describe-change-set", name, "change-set not found"))
    }

    async fn execute_change_set(&self, name: &str, change_name: &str) -> Result<()> {
        self.record("execute-change-set", name);
        self.check_mutation("execute-change-set", name)?;
        let mut state = self.state.lock().unwrap();
        let key = Self::change_key(name, change_name);
        let change = state
            .changes
            .get_mut(&key)
            .ok_or_else(|| StrataError::remote("execute-change-set", name, "change-set not found"))?;
        if change.executed {
            return Err(StrataError::remote("execute-change-set", name, "already executed"));
        }
        change.executed = true;
        let (stack_name, template, parameters) =
            (change.stack.clone(), change.template.clone(), change.parameters.clone());
        let deployed = state
            .deployed
            .get_mut(&stack_name)
            .ok_or_else(|| StrataError::remote("execute-change-set", name, "stack does not exist"))?;
        deployed.template = template;
        deployed.parameters = parameters;
        Ok(())
    }

    async fn delete_change_set(&self, name: &str, change_name: &str) -> Result<()> {
        self.record("delete-change-set", name);
        self.state.lock().unwrap().changes.remove(&Self::change_key(name, change_name));
        Ok(())
    }

    async fn set_stack_policy(&self, name: &str, policy: &str) -> Result<()> {
        self.record("set-policy", name);
        self.check_mutation("set-stack-policy", name)?;
        let mut state = self.state.lock().unwrap();
        let stack = state
            .deployed
            .get_mut(name)
            .ok_or_else(|| StrataError::remote("set-stack-policy", name, "stack does not exist"))?;
        stack.policy = Some(policy.to_string());
        Ok(())
    }

    async fn validate_template(&self, _template: &str) -> Result<()> {
        if self.state.lock().unwrap().fail_validation {
            return Err(StrataError::remote("validate-template", "-", "injected failure"));
        }
        Ok(())
    }

    async fn list_exports(&self) -> Result<Vec<Export>> {
        Ok(self.state.lock().unwrap().exports.clone())
    }
}

/// Build a context from a YAML project config and a fake provider.
pub fn context_from_yaml(config_yaml: &str, provider: Arc<FakeProvider>) -> Context {
    let config = ProjectConfig::from_yaml_str(config_yaml).expect("test config parses");
    let registry = Arc::new(StackRegistry::from_project(&config));
    Context::new(config.project.clone(), registry, provider)
}
