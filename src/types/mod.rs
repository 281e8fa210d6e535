//! Stack domain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Deployment status of a stack, as last observed from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    /// Never synchronized with the provider.
    #[default]
    Unknown,
    /// No deployed instance exists for this stack.
    NotDeployed,
    /// At least one instance is deployed and settled.
    Deployed,
    /// A create/update/delete is in flight on the provider side.
    InProgress,
    /// The last operation on this stack failed.
    Failed,
}

impl StackStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StackStatus::Unknown => "unknown",
            StackStatus::NotDeployed => "not-deployed",
            StackStatus::Deployed => "deployed",
            StackStatus::InProgress => "in-progress",
            StackStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named input value supplied to a stack at deploy time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// One deployed instance of a logical stack, as observed from the provider.
///
/// A project may map one logical stack to several deployed instances
/// (e.g. one per region), so a snapshot holds zero or more of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedInstance {
    /// Provider-side identifier of the instance.
    pub instance_id: String,

    /// Deployed outputs, keyed by output name. Key-ordered for stable dumps.
    pub outputs: BTreeMap<String, String>,

    /// Raw parameters as last observed on the provider.
    pub parameters: Vec<Parameter>,

    /// Instance status as reported by the provider.
    pub status: StackStatus,
}

/// Snapshot of a stack's live deployed state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSnapshot {
    /// Deployed instances, zero or more.
    pub instances: Vec<DeployedInstance>,

    /// When the snapshot was last overwritten from the provider.
    pub synced_at: Option<SystemTime>,
}

impl OutputSnapshot {
    /// True if no instance has been observed.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Look up an output key across all instances, first match wins.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.instances.iter().find_map(|i| i.outputs.get(key).map(String::as_str))
    }
}

/// A named unit of infrastructure: template, config values, deployed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name, unique within a registry.
    pub name: String,

    /// Source locator for the template body.
    pub source: String,

    /// Raw template body.
    pub template_body: String,

    /// Local config value mapping (arbitrary nested key/value data).
    pub values: serde_yaml::Value,

    /// Ordered parameter list mirrored to the provider.
    pub parameters: Vec<Parameter>,

    /// Protection-policy document, if configured.
    pub policy: Option<String>,

    /// Rendered template text, produced by the resolver.
    pub resolved: Option<String>,

    /// Live deployed state as last observed.
    pub snapshot: OutputSnapshot,

    /// Operator selected this stack for the current orchestration run.
    pub actioned: bool,

    /// Deployment status as last observed.
    pub status: StackStatus,
}

impl Stack {
    /// Create a stack with the given name and template body.
    pub fn new(name: impl Into<String>, source: impl Into<String>, template_body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            template_body: template_body.into(),
            values: serde_yaml::Value::Null,
            parameters: Vec::new(),
            policy: None,
            resolved: None,
            snapshot: OutputSnapshot::default(),
            actioned: false,
            status: StackStatus::Unknown,
        }
    }

    /// Aggregate status from the instances of a fresh snapshot.
    pub fn status_from_snapshot(snapshot: &OutputSnapshot) -> StackStatus {
        if snapshot.instances.is_empty() {
            return StackStatus::NotDeployed;
        }
        if snapshot.instances.iter().any(|i| i.status == StackStatus::Failed) {
            StackStatus::Failed
        } else if snapshot.instances.iter().any(|i| i.status == StackStatus::InProgress) {
            StackStatus::InProgress
        } else {
            StackStatus::Deployed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        assert_eq!(StackStatus::Deployed.as_str(), "deployed");
        assert_eq!(StackStatus::NotDeployed.to_string(), "not-deployed");
        assert_eq!(StackStatus::default(), StackStatus::Unknown);
    }

    #[test]
    fn snapshot_output_lookup_first_match_wins() {
        let snapshot = OutputSnapshot {
            instances: vec![
                DeployedInstance {
                    instance_id: "i-1".into(),
                    outputs: BTreeMap::from([("vpc_id".to_string(), "vpc-aaa".to_string())]),
                    parameters: vec![],
                    status: StackStatus::Deployed,
                },
                DeployedInstance {
                    instance_id: "i-2".into(),
                    outputs: BTreeMap::from([("vpc_id".to_string(), "vpc-bbb".to_string())]),
                    parameters: vec![],
                    status: StackStatus::Deployed,
                },
            ],
            synced_at: Some(SystemTime::now()),
        };
        assert_eq!(snapshot.output("vpc_id"), Some("vpc-aaa"));
        assert_eq!(snapshot.output("missing"), None);
    }

    #[test]
    fn aggregate_status_prefers_failure() {
        let mut snapshot = OutputSnapshot::default();
        assert_eq!(Stack::status_from_snapshot(&snapshot), StackStatus::NotDeployed);

        snapshot.instances.push(DeployedInstance {
            instance_id: "i-1".into(),
            outputs: BTreeMap::new(),
            parameters: vec![],
            status: StackStatus::Deployed,
        });
        assert_eq!(Stack::status_from_snapshot(&snapshot), StackStatus::Deployed);

        snapshot.instances.push(DeployedInstance {
            instance_id: "i-2".into(),
            outputs: BTreeMap::new(),
            parameters: vec![],
            status: StackStatus::Failed,
        });
        assert_eq!(Stack::status_from_snapshot(&snapshot), StackStatus::Failed);
    }
}
