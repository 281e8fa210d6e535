//! Template resolution.
//!
//! A stack's source template is rendered against its local config values and
//! other stacks' deployed outputs. References use `{{...}}` interpolation:
//!
//! - `{{key}}` or `{{key.path}}` where the first segment does not name a
//!   registry stack: dotted-path lookup into the stack's local value mapping.
//! - `{{stack.output_key}}` where the first segment names a registry stack:
//!   cross-stack output reference, synchronized from the provider on demand.
//!
//! A reference to a nonexistent value or output key fails; nothing is ever
//! silently substituted with an empty string. Cyclic reference chains are
//! detected before any substitution or network call.

use crate::context::Context;
use crate::error::{Result, StrataError};
use crate::outputs::OutputSynchronizer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, instrument};

static REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("static regex"));
static SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// One interpolation found in a template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Interior text as written, trimmed.
    pub raw: String,
    /// Dot-separated segments.
    pub segments: Vec<String>,
}

impl Reference {
    /// First segment; a stack name when the reference is cross-stack.
    pub fn first(&self) -> &str {
        &self.segments[0]
    }
}

/// Scan a template body for references without resolving them.
///
/// Fails with `MalformedReference` on empty or syntactically invalid
/// interpolations.
pub fn scan_references(stack: &str, template: &str) -> Result<Vec<Reference>> {
    let mut references = Vec::new();
    for capture in REFERENCE.captures_iter(template) {
        let raw = capture[1].trim().to_string();
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if raw.is_empty() || segments.iter().any(|s| !SEGMENT.is_match(s)) {
            return Err(StrataError::MalformedReference { stack: stack.to_string(), reference: raw });
        }
        references.push(Reference { raw, segments });
    }
    Ok(references)
}

/// Renders stack templates, pulling dependency outputs via the synchronizer.
#[derive(Clone)]
pub struct TemplateResolver {
    ctx: Context,
    sync: OutputSynchronizer,
}

impl TemplateResolver {
    pub fn new(ctx: Context) -> Self {
        let sync = OutputSynchronizer::new(ctx.clone());
        Self { ctx, sync }
    }

    /// Names of registry stacks referenced by a stack's template.
    ///
    /// Discovered from the reference scan alone; no resolution, no network.
    pub async fn dependencies(&self, name: &str) -> Result<Vec<String>> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;
        let template = handle.read().await.template_body.clone();

        let mut deps = Vec::new();
        for reference in scan_references(name, &template)? {
            let first = reference.first().to_string();
            if self.ctx.registry.contains(&first).await && !deps.contains(&first) {
                deps.push(first);
            }
        }
        Ok(deps)
    }

    /// Render a stack's source template and store the result on the stack.
    ///
    /// Re-resolving with unchanged config values and unchanged referenced
    /// outputs yields byte-identical text.
    #[instrument(skip(self))]
    pub async fn render(&self, name: &str) -> Result<String> {
        let handle = self
            .ctx
            .registry
            .get(name)
            .await
            .ok_or_else(|| StrataError::StackNotFound { name: name.to_string() })?;

        let (template, values) = {
            let stack = handle.read().await;
            (stack.template_body.clone(), stack.values.clone())
        };
        if template.trim().is_empty() {
            return Err(StrataError::EmptySource { stack: name.to_string() });
        }

        // Walk the reference graph before touching anything remote; a chain
        // that revisits a stack already being resolved is a hard error.
        self.check_cycles(name).await?;

        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;
        for capture in REFERENCE.captures_iter(&template) {
            let whole = capture.get(0).expect("capture 0 always present");
            let reference = parse_one(name, &capture[1])?;

            rendered.push_str(&template[last..whole.start()]);
            let substituted = if self.ctx.registry.contains(reference.first()).await {
                self.resolve_output(name, &reference).await?
            } else {
                resolve_local(name, &values, &reference)?
            };
            rendered.push_str(&substituted);
            last = whole.end();
        }
        rendered.push_str(&template[last..]);

        debug!(stack = %name, bytes = rendered.len(), "Template rendered");
        handle.write().await.resolved = Some(rendered.clone());
        Ok(rendered)
    }

    /// Render a stack's template and submit the result for provider-side
    /// validation, without deploying anything.
    #[instrument(skip(self))]
    pub async fn validate(&self, name: &str) -> Result<()> {
        let rendered = self.render(name).await?;
        self.ctx.provider.validate_template(&rendered).await?;
        debug!(stack = %name, "Template validated");
        Ok(())
    }

    /// Resolve a cross-stack output reference, synchronizing the referenced
    /// stack's snapshot if it has never been fetched.
    async fn resolve_output(&self, stack: &str, reference: &Reference) -> Result<String> {
        if reference.segments.len() != 2 {
            return Err(StrataError::MalformedReference {
                stack: stack.to_string(),
                reference: reference.raw.clone(),
            });
        }
        let (dep, key) = (&reference.segments[0], &reference.segments[1]);

        // get() cannot miss here: contains() was checked by the caller and
        // stacks are never removed mid-run.
        let handle = self.ctx.registry.must_get(dep).await;
        if handle.read().await.snapshot.is_empty() {
            self.sync.sync(dep).await?;
        }

        let stack_ref = handle.read().await;
        match stack_ref.snapshot.output(key) {
            Some(value) => Ok(value.to_string()),
            None if stack_ref.snapshot.is_empty() => Err(StrataError::UnresolvedReference {
                stack: stack.to_string(),
                reference: reference.raw.clone(),
                reason: format!("stack {dep} has no deployed outputs"),
            }),
            None => Err(StrataError::UnresolvedReference {
                stack: stack.to_string(),
                reference: reference.raw.clone(),
                reason: format!("output key {key} not found on stack {dep}"),
            }),
        }
    }

    /// Fail with `CyclicDependency` if the reference graph reachable from
    /// `root` revisits a stack already on the resolution chain.
    async fn check_cycles(&self, root: &str) -> Result<()> {
        let graph = self.reference_graph(root).await?;
        let mut chain = Vec::new();
        find_cycle(&graph, root, &mut chain)
    }

    /// Cross-stack reference edges reachable from `root`, collected without
    /// resolving anything.
    async fn reference_graph(&self, root: &str) -> Result<HashMap<String, Vec<String>>> {
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        let mut pending = vec![root.to_string()];
        while let Some(name) = pending.pop() {
            if graph.contains_key(&name) {
                continue;
            }
            let handle = self.ctx.registry.must_get(&name).await;
            let template = handle.read().await.template_body.clone();
            let mut deps = Vec::new();
            for reference in scan_references(&name, &template)? {
                let first = reference.first().to_string();
                if self.ctx.registry.contains(&first).await && !deps.contains(&first) {
                    pending.push(first.clone());
                    deps.push(first);
                }
            }
            graph.insert(name, deps);
        }
        Ok(graph)
    }
}

/// Parse one interpolation interior.
fn parse_one(stack: &str, interior: &str) -> Result<Reference> {
    let raw = interior.trim().to_string();
    let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
    if raw.is_empty() || segments.iter().any(|s| !SEGMENT.is_match(s)) {
        return Err(StrataError::MalformedReference { stack: stack.to_string(), reference: raw });
    }
    Ok(Reference { raw, segments })
}

/// Depth-first walk reporting the first cycle found as the full chain.
fn find_cycle(graph: &HashMap<String, Vec<String>>, node: &str, chain: &mut Vec<String>) -> Result<()> {
    if let Some(position) = chain.iter().position(|n| n == node) {
        let mut cycle: Vec<String> = chain[position..].to_vec();
        cycle.push(node.to_string());
        return Err(StrataError::CyclicDependency { chain: cycle });
    }
    chain.push(node.to_string());
    if let Some(deps) = graph.get(node) {
        for dep in deps {
            find_cycle(graph, dep, chain)?;
        }
    }
    chain.pop();
    Ok(())
}

/// Resolve a dotted path into the stack's local value mapping.
fn resolve_local(stack: &str, values: &serde_yaml::Value, reference: &Reference) -> Result<String> {
    let mut current = values;
    for segment in &reference.segments {
        current = match current {
            serde_yaml::Value::Mapping(map) => {
                match map.get(serde_yaml::Value::String(segment.clone())) {
                    Some(nested) => nested,
                    None => {
                        return Err(StrataError::UnresolvedReference {
                            stack: stack.to_string(),
                            reference: reference.raw.clone(),
                            reason: format!("no value at key {segment}"),
                        })
                    }
                }
            }
            _ => {
                return Err(StrataError::UnresolvedReference {
                    stack: stack.to_string(),
                    reference: reference.raw.clone(),
                    reason: format!("value at {segment} is not a mapping"),
                })
            }
        };
    }
    scalar_to_string(stack, reference, current)
}

/// Substitute a value as text: scalars in their plain form, lists and maps
/// as flow-style (JSON) so they stay valid inside a YAML template.
fn scalar_to_string(stack: &str, reference: &Reference, value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Err(StrataError::UnresolvedReference {
            stack: stack.to_string(),
            reference: reference.raw.clone(),
            reason: "value is null".to_string(),
        }),
        other => {
            let json = serde_json::to_value(other).map_err(StrataError::Json)?;
            serde_json::to_string(&json).map_err(StrataError::Json)
        }
    }
}
