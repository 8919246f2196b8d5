//! Apply engine
//!
//! Diffs a declared stack against recorded state and drives the provider.
//! Removed resources are deleted first, dependents before dependencies.
//! Instances being replaced are deleted next in the same order, so nothing
//! is deleted while something recorded still depends on it. Declared
//! resources are then applied level by level, each resource only once every
//! output it references is bound.

use crate::action::{Action, ActionType, ApplyResult, Plan, PlanSummary};
use crate::error::Result;
use crate::outputs::OutputBinder;
use crate::provider::{CloudProvider, ResourceOutputs, ResourceRequest, RetryConfig, with_retry};
use crate::state::{GlobalState, ResourceState, ResourceStatus};
use futures_util::stream::{self, StreamExt};
use infraflow_core::{DependencyGraph, ResourceDecl, Stack};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Independent resources applied at the same time by default
pub const DEFAULT_PARALLELISM: usize = 4;

/// Outcome of one apply
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Summary of the plan that was applied
    pub summary: PlanSummary,

    /// Provider calls that succeeded or failed
    pub result: ApplyResult,

    /// Updates skipped because their resolved inputs were unchanged
    pub skipped: Vec<String>,

    /// Changes never attempted because an earlier step failed
    pub not_attempted: Vec<String>,

    /// Resolved stack outputs
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.result.is_success() && self.not_attempted.is_empty()
    }
}

/// A provider call waiting to run
struct Operation {
    action: Action,
    request: ResourceRequest,
    current: Option<ResourceState>,
}

/// A provider call that ran
struct Completed {
    action: Action,
    request: ResourceRequest,
    outcome: Result<ResourceOutputs>,
    /// the previous instance was deleted before the call failed
    removed: bool,
}

/// Reconciles declared stacks with a provider
pub struct Engine {
    provider: Arc<dyn CloudProvider>,
    parallelism: usize,
    retry: RetryConfig,
}

impl Engine {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            parallelism: DEFAULT_PARALLELISM,
            retry: RetryConfig::default(),
        }
    }

    /// Maximum number of concurrent provider calls within a level
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &dyn CloudProvider {
        self.provider.as_ref()
    }

    /// Compute the actions an apply would perform
    ///
    /// Fails on declaration errors (cycles, unresolved references) before
    /// anything reaches the provider.
    pub fn plan(&self, stack: &Stack, state: &GlobalState) -> Result<Plan> {
        let graph = DependencyGraph::build(stack)?;
        diff(stack, state, &graph)
    }

    /// The actions `destroy` would perform
    pub fn destroy_plan(&self, state: &GlobalState) -> Result<Plan> {
        let actions = state
            .dependency_graph()?
            .reverse_order()
            .into_iter()
            .filter_map(|name| {
                let kind = state.get_resource(&name)?.kind;
                Some(Action::new(ActionType::Delete, name, kind))
            })
            .collect();
        Ok(Plan::new(actions))
    }

    /// Reconcile the provider with `stack`, recording every step in `state`
    ///
    /// Provider failures do not return `Err`: they are recorded in the
    /// report, and levels after a failed one are not attempted. Whatever was
    /// applied stays in `state` and is reconciled by the next apply.
    #[tracing::instrument(skip_all, fields(stack = %stack.name, provider = self.provider.name()))]
    pub async fn apply(&self, stack: &Stack, state: &mut GlobalState) -> Result<ApplyReport> {
        let start = Instant::now();
        let graph = DependencyGraph::build(stack)?;
        let plan = diff(stack, state, &graph)?;

        let mut report = ApplyReport {
            summary: plan.summary(),
            ..Default::default()
        };
        let mut attempted: BTreeSet<String> = BTreeSet::new();
        state.stack = Some(stack.name.clone());

        if plan.has_changes {
            info!(summary = %report.summary, "Applying plan");
        } else {
            info!("No changes, infrastructure is up to date");
        }

        // 1. removed resources, dependents first
        for action in plan.actions_by_type(ActionType::Delete) {
            let Some(recorded) = state.get_resource(&action.resource).cloned() else {
                continue;
            };
            attempted.insert(action.resource.clone());
            info!(resource = %action.resource, kind = %action.kind, "Deleting removed resource");

            match with_retry(&self.retry, "delete", || self.provider.delete(&recorded)).await {
                Ok(()) => {
                    state.remove_resource(&action.resource);
                    report
                        .result
                        .add_success(action.id.clone(), action.description.clone());
                }
                Err(e) => {
                    error!(resource = %action.resource, error = %e, "Delete failed");
                    report.result.add_failure(action.id.clone(), e.to_string());
                    break;
                }
            }
        }

        // 2. instances being replaced, dependents first
        if report.result.is_success() {
            let replacing: BTreeSet<&str> = plan
                .actions_by_type(ActionType::Replace)
                .into_iter()
                .map(|a| a.resource.as_str())
                .collect();
            for name in state.dependency_graph()?.reverse_order() {
                if !replacing.contains(name.as_str()) {
                    continue;
                }
                let (Some(recorded), Some(action)) =
                    (state.get_resource(&name).cloned(), plan.action_for(&name))
                else {
                    continue;
                };
                info!(resource = %name, kind = %recorded.kind, "Deleting instance to replace");

                match with_retry(&self.retry, "delete", || self.provider.delete(&recorded)).await {
                    Ok(()) => {
                        state.remove_resource(&name);
                    }
                    Err(e) => {
                        error!(resource = %name, error = %e, "Delete failed");
                        attempted.insert(name.clone());
                        report.result.add_failure(action.id.clone(), e.to_string());
                        break;
                    }
                }
            }
        }

        // 3. declared resources, level by level
        let mut binder = OutputBinder::new();
        if report.result.is_success() {
            for (depth, level) in graph.levels().into_iter().enumerate() {
                let mut operations = Vec::new();

                for name in &level {
                    let (Some(decl), Some(action)) = (stack.get(name), plan.action_for(name))
                    else {
                        continue;
                    };
                    let recorded = state.get_resource(name).cloned();

                    if action.action_type == ActionType::NoOp {
                        if let Some(recorded) = &recorded {
                            binder.seed(name, &recorded.outputs)?;
                        }
                        continue;
                    }

                    attempted.insert(name.clone());
                    let inputs = match binder.resolve_properties(name, &decl.properties) {
                        Ok(inputs) => inputs,
                        Err(e) => {
                            error!(resource = %name, error = %e, "Cannot resolve inputs");
                            report.result.add_failure(action.id.clone(), e.to_string());
                            continue;
                        }
                    };

                    let mut action = action.clone();
                    if action.action_type == ActionType::Update
                        && let Some(recorded) = &recorded
                    {
                        let changed = changed_properties(&recorded.inputs, &inputs);
                        if changed.is_empty() && recorded.status == ResourceStatus::Succeeded {
                            debug!(resource = %name, "Resolved inputs unchanged, skipping update");
                            let refreshed = recorded
                                .clone()
                                .with_config(decl.declared_config())
                                .with_depends_on(decl.dependencies());
                            binder.seed(name, &refreshed.outputs)?;
                            state.set_resource(name.clone(), refreshed);
                            report.skipped.push(name.clone());
                            continue;
                        }
                        if changed.iter().any(|p| decl.kind.is_immutable(p)) {
                            action = Action::new(ActionType::Replace, name.clone(), decl.kind)
                                .with_detail("changed", json!(changed));
                        }
                    }

                    operations.push(Operation {
                        action,
                        request: ResourceRequest::new(name.clone(), decl.kind, inputs),
                        current: recorded,
                    });
                }

                debug!(
                    level = depth,
                    operations = operations.len(),
                    "Applying level"
                );
                let mut completed = stream::iter(operations)
                    .map(|op| self.execute(op))
                    .buffer_unordered(self.parallelism);
                while let Some(done) = completed.next().await {
                    record(done, stack, state, &mut binder, &mut report)?;
                }

                if !report.result.is_success() {
                    warn!(level = depth, "Level failed, stopping");
                    break;
                }
            }
        }

        // 4. stack outputs
        let mut outputs = BTreeMap::new();
        for (key, value) in &stack.outputs {
            match binder.resolve(&format!("output {}", key), value) {
                Ok(resolved) => {
                    outputs.insert(key.clone(), resolved);
                }
                Err(e) => {
                    debug!(output = %key, error = %e, "Stack output not resolvable");
                    if let Some(previous) = state.outputs.get(key) {
                        outputs.insert(key.clone(), previous.clone());
                    }
                }
            }
        }
        state.outputs = outputs.clone();
        report.outputs = outputs;

        report.not_attempted = plan
            .actions
            .iter()
            .filter(|a| a.is_change() && !attempted.contains(&a.resource))
            .map(|a| a.resource.clone())
            .collect();
        report.result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            succeeded = report.result.succeeded.len(),
            failed = report.result.failed.len(),
            skipped = report.skipped.len(),
            duration_ms = report.result.duration_ms,
            "Apply finished"
        );
        Ok(report)
    }

    /// Delete every recorded resource, dependents first
    ///
    /// Stops at the first failure; what is left stays recorded.
    #[tracing::instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn destroy(&self, state: &mut GlobalState) -> Result<ApplyResult> {
        let start = Instant::now();
        let mut result = ApplyResult::new();

        for action in self.destroy_plan(state)?.actions {
            let Some(recorded) = state.get_resource(&action.resource).cloned() else {
                continue;
            };
            info!(resource = %action.resource, kind = %action.kind, "Deleting");

            match with_retry(&self.retry, "delete", || self.provider.delete(&recorded)).await {
                Ok(()) => {
                    state.remove_resource(&action.resource);
                    result.add_success(action.id, action.description);
                }
                Err(e) => {
                    error!(resource = %action.resource, error = %e, "Delete failed");
                    result.add_failure(action.id, e.to_string());
                    break;
                }
            }
        }

        if state.is_empty() {
            state.outputs.clear();
        }
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn execute(&self, op: Operation) -> Completed {
        let Operation {
            action,
            request,
            current,
        } = op;
        info!(
            resource = %request.name,
            kind = %request.kind,
            action = %action.action_type,
            "Applying"
        );

        let mut removed = false;
        let outcome = match (action.action_type, &current) {
            (ActionType::Update, Some(current)) => {
                with_retry(&self.retry, "update", || {
                    self.provider.update(&request, current)
                })
                .await
            }
            (ActionType::Replace, Some(current)) => {
                match with_retry(&self.retry, "delete", || self.provider.delete(current)).await {
                    Ok(()) => {
                        removed = true;
                        with_retry(&self.retry, "create", || self.provider.create(&request)).await
                    }
                    Err(e) => Err(e),
                }
            }
            _ => with_retry(&self.retry, "create", || self.provider.create(&request)).await,
        };

        Completed {
            action,
            request,
            outcome,
            removed,
        }
    }
}

/// Record a finished provider call in state, binder and report
fn record(
    done: Completed,
    stack: &Stack,
    state: &mut GlobalState,
    binder: &mut OutputBinder,
    report: &mut ApplyReport,
) -> Result<()> {
    let Completed {
        action,
        request,
        outcome,
        removed,
    } = done;
    let name = request.name.clone();

    match outcome {
        Ok(outputs) => {
            let id = outputs
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or(name.as_str())
                .to_string();
            let mut recorded = ResourceState::new(id, request.kind)
                .with_status(ResourceStatus::Succeeded)
                .with_inputs(request.inputs)
                .with_outputs(outputs.clone());
            if let Some(decl) = stack.get(&name) {
                recorded = recorded
                    .with_config(decl.declared_config())
                    .with_depends_on(decl.dependencies());
            }
            if action.action_type == ActionType::Update
                && let Some(previous) = state.get_resource(&name)
            {
                recorded.created_at = previous.created_at;
            }

            binder.bind(&name, outputs)?;
            state.set_resource(name.clone(), recorded);
            info!(resource = %name, action = %action.action_type, "Applied");
            report.result.add_success(action.id, action.description);
        }
        Err(e) => {
            error!(resource = %name, error = %e, "Provider call failed");
            if removed {
                state.remove_resource(&name);
            } else if let Some(previous) = state.get_resource_mut(&name) {
                previous.set_status(ResourceStatus::Failed);
            }
            report.result.add_failure(action.id, e.to_string());
        }
    }
    Ok(())
}

/// Diff declared resources against recorded state
fn diff(stack: &Stack, state: &GlobalState, graph: &DependencyGraph) -> Result<Plan> {
    let mut actions = Vec::new();

    let removed: BTreeSet<&str> = state
        .resources
        .keys()
        .filter(|name| !stack.contains(name))
        .map(String::as_str)
        .collect();
    if !removed.is_empty() {
        for name in state.dependency_graph()?.reverse_order() {
            if let Some(recorded) = state.get_resource(&name)
                && removed.contains(name.as_str())
            {
                actions.push(Action::new(ActionType::Delete, name, recorded.kind));
            }
        }
    }

    let mut changed: BTreeSet<String> = BTreeSet::new();
    let mut replaced: BTreeSet<String> = BTreeSet::new();
    for name in graph.topological_order() {
        let Some(decl) = stack.get(name) else {
            continue;
        };
        let action = match state.get_resource(name) {
            None => Action::new(ActionType::Create, name.clone(), decl.kind),
            Some(recorded) => {
                let upstream: BTreeSet<String> = decl
                    .dependencies()
                    .union(&recorded.depends_on)
                    .filter(|dep| replaced.contains(*dep))
                    .cloned()
                    .collect();
                if upstream.is_empty() {
                    diff_resource(decl, recorded, &changed)
                } else {
                    // the instance it depends on goes away, so it has to as well
                    Action::new(ActionType::Replace, name.clone(), decl.kind)
                        .with_detail("replaced_upstream", json!(upstream))
                }
            }
        };
        if action.action_type == ActionType::Replace {
            replaced.insert(name.clone());
        }
        if action.is_change() {
            changed.insert(name.clone());
        }
        actions.push(action);
    }

    Ok(Plan::new(actions))
}

/// Action for a declared resource that is already recorded
///
/// `changed` holds the resources planned to change so far; a resource that
/// references one of them may see new inputs and is planned as an update.
fn diff_resource(
    decl: &ResourceDecl,
    recorded: &ResourceState,
    changed: &BTreeSet<String>,
) -> Action {
    if recorded.kind != decl.kind {
        return Action::new(ActionType::Replace, decl.name.clone(), decl.kind)
            .with_detail("previous_kind", json!(recorded.kind));
    }

    let changed_props = changed_properties(&recorded.config, &decl.declared_config());
    let forces_replacement: Vec<&String> = changed_props
        .iter()
        .filter(|p| decl.kind.is_immutable(p))
        .collect();
    if !forces_replacement.is_empty() {
        return Action::new(ActionType::Replace, decl.name.clone(), decl.kind)
            .with_detail("changed", json!(changed_props))
            .with_detail("forces_replacement", json!(forces_replacement));
    }

    if !changed_props.is_empty()
        || recorded.depends_on != decl.dependencies()
        || recorded.status != ResourceStatus::Succeeded
    {
        return Action::new(ActionType::Update, decl.name.clone(), decl.kind)
            .with_detail("changed", json!(changed_props));
    }

    let upstream: BTreeSet<&str> = decl
        .references()
        .into_iter()
        .map(|r| r.resource.as_str())
        .filter(|r| changed.contains(*r))
        .collect();
    if !upstream.is_empty() {
        return Action::new(ActionType::Update, decl.name.clone(), decl.kind)
            .with_detail("upstream", json!(upstream));
    }

    Action::new(ActionType::NoOp, decl.name.clone(), decl.kind)
}

/// Top-level keys whose values differ between two JSON objects
fn changed_properties(old: &serde_json::Value, new: &serde_json::Value) -> Vec<String> {
    let empty = serde_json::Map::new();
    let old = old.as_object().unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    old.keys()
        .chain(new.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect()
}
