//! Project configuration document.
//!
//! A project config names the project and declares its stacks: source
//! template, local value mapping, parameter list, and an optional
//! protection-policy document. Cross-stack references live inside template
//! bodies, not in this document.

use crate::error::{Result, StrataError};
use crate::types::Parameter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-stack configuration entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Source locator for the template body.
    pub source: String,

    /// Raw template body.
    pub template: String,

    /// Arbitrary nested config value mapping.
    pub values: serde_yaml::Value,

    /// Ordered key/value parameters mirrored to the provider.
    pub parameters: Vec<Parameter>,

    /// Protection-policy document body.
    pub policy: Option<String>,
}

/// A project: a name plus a set of named stack entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name; deployed stack names are qualified `{project}-{stack}`.
    pub project: String,

    /// Stack entries keyed by name.
    #[serde(default)]
    pub stacks: BTreeMap<String, StackConfig>,
}

impl ProjectConfig {
    /// Parse and validate a project config from a YAML document.
    ///
    /// Validation happens once here so the resolver never has to guess a
    /// value's shape at substitution time: values are restricted to the
    /// YAML scalar/list/map universe with string keys.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the in-memory document.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(StrataError::InvalidConfig { reason: "project name is empty".to_string() });
        }
        for (name, stack) in &self.stacks {
            if name.trim().is_empty() {
                return Err(StrataError::InvalidConfig {
                    reason: "stack with empty name".to_string(),
                });
            }
            validate_value(name, &stack.values)?;
        }
        Ok(())
    }

    /// Remote-provider name for one of this project's stacks.
    pub fn qualified_name(&self, stack: &str) -> String {
        format!("{}-{}", self.project, stack)
    }
}

/// Reject value shapes the resolver cannot substitute.
fn validate_value(stack: &str, value: &serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::Tagged(_) => Err(StrataError::InvalidConfig {
            reason: format!("stack {stack}: tagged values are not supported"),
        }),
        serde_yaml::Value::Mapping(map) => {
            for (key, nested) in map {
                if !key.is_string() {
                    return Err(StrataError::InvalidConfig {
                        reason: format!("stack {stack}: non-string value key"),
                    });
                }
                validate_value(stack, nested)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(items) => {
            for item in items {
                validate_value(stack, item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
