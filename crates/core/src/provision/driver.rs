//! Provisioning driver: applies a compiled stack through a control plane.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::error::{ApplyError, ProviderError};
use super::planning::{plan_changes, plan_destroy, Change, Removal};
use super::report::{ApplyReport, DestroyReport, RemovalReport, RemovalStatus, ResourceReport};
use super::resource::{resolve_references, Identities};
use super::retry::{with_retry, RetryPolicy};
use super::state::{AppliedResource, AppliedState, ResourceState};
use super::traits::{ControlPlane, EnsureOutcome, Ensured};
use crate::descriptor::ResourceId;
use crate::graph::DependencyGraph;
use crate::stack::Stack;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    pub retry: RetryPolicy,
    /// Upper bound on control plane calls in flight.
    pub max_concurrency: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_concurrency: 4,
        }
    }
}

type TaskOutput = (ResourceId, Result<Ensured, ProviderError>, u32);

#[derive(Clone)]
pub struct Driver {
    control_plane: Arc<dyn ControlPlane>,
    options: DriverOptions,
}

/// Bookkeeping of one apply, indexed by position in dependency order.
struct Progress<'a> {
    order: &'a [ResourceId],
    graph: &'a DependencyGraph,
    position: HashMap<&'a ResourceId, usize>,
    reports: Vec<ResourceReport>,
    waiting: Vec<usize>,
    ready: BTreeSet<usize>,
}

impl<'a> Progress<'a> {
    fn new(order: &'a [ResourceId], graph: &'a DependencyGraph, changes: Vec<Change>) -> Self {
        let waiting: Vec<usize> = order
            .iter()
            .map(|id| graph.dependencies(id).len())
            .collect();
        let ready = waiting
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| i)
            .collect();

        Self {
            order,
            graph,
            position: order.iter().enumerate().map(|(i, id)| (id, i)).collect(),
            reports: order
                .iter()
                .cloned()
                .zip(changes)
                .map(|(id, change)| ResourceReport::planned(id, change))
                .collect(),
            waiting,
            ready,
        }
    }

    fn applied(&mut self, i: usize, outcome: EnsureOutcome, attempts: u32) {
        let report = &mut self.reports[i];
        report.state = ResourceState::Applied;
        report.outcome = Some(outcome);
        report.attempts = attempts;

        for dependent in self.graph.dependents(&self.order[i]) {
            let j = self.position[dependent];
            self.waiting[j] -= 1;
            if self.waiting[j] == 0 {
                self.ready.insert(j);
            }
        }
    }

    /// Marks `i` failed. Its dependents never become ready and are reported
    /// as blocked by it.
    fn failed(&mut self, i: usize, error: ApplyError, attempts: u32) {
        let id = &self.order[i];
        tracing::error!(resource = %id, error = %error, "resource failed");

        let report = &mut self.reports[i];
        report.state = ResourceState::Failed;
        report.error = Some(error.to_string());
        report.attempts = attempts;

        for dependent in self.graph.transitive_dependents(id) {
            let report = &mut self.reports[self.position[dependent]];
            if report.state == ResourceState::Planned && report.blocked_by.is_none() {
                report.blocked_by = Some(id.clone());
            }
        }
    }

    fn all_applied(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.state == ResourceState::Applied)
    }
}

impl Driver {
    pub fn new(control_plane: Arc<dyn ControlPlane>, options: DriverOptions) -> Self {
        Self {
            control_plane,
            options,
        }
    }

    /// Applies `stack` on top of `prior`.
    ///
    /// Resources start once all their dependencies are applied, independent
    /// ones concurrently. A failure blocks its dependents only. Raising
    /// `cancel` stops new work and aborts calls in flight.
    #[tracing::instrument(skip_all, fields(stack = %stack.name()))]
    pub async fn apply(
        &self,
        stack: &Stack,
        prior: &AppliedState,
        mut cancel: watch::Receiver<bool>,
    ) -> ApplyReport {
        let deployment_id = Uuid::new_v4();
        let plan = plan_changes(stack, prior);
        let order = stack.order();
        let specs = stack.resources();
        let mut progress = Progress::new(
            &order,
            stack.graph(),
            plan.changes.iter().map(|c| c.change.clone()).collect(),
        );

        let mut identities = Identities::default();
        let mut applied: HashMap<usize, AppliedResource> = HashMap::new();
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
        let mut running: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut cancelled = *cancel.borrow();
        let mut listening = true;
        let max_concurrency = self.options.max_concurrency.max(1);

        tracing::info!(%deployment_id, resources = order.len(), "apply started");

        loop {
            while !cancelled && running.len() < max_concurrency {
                let Some(i) = progress.ready.pop_first() else {
                    break;
                };
                let id = &order[i];
                let change = progress.reports[i].change.clone();

                match (&change, prior.get(id)) {
                    (Change::Unchanged, Some(record)) => {
                        tracing::debug!(resource = %id, "unchanged, skipping");
                        identities.publish(id.clone(), record.identity.clone());
                        applied.insert(i, record.clone());
                        progress.applied(i, EnsureOutcome::Unchanged, 0);
                    }
                    (Change::Replace { fields }, _) => {
                        let error = ApplyError::ReplacementRequired {
                            resource: id.clone(),
                            fields: fields.clone(),
                        };
                        progress.failed(i, error, 0);
                    }
                    _ => match resolve_references(&specs[i], &identities) {
                        Ok(resolved) => {
                            let control_plane = Arc::clone(&self.control_plane);
                            let retry = self.options.retry;
                            let task_resource = id.clone();
                            let handle = tasks.spawn(async move {
                                let label = task_resource.to_string();
                                let (result, attempts) = with_retry(&retry, &label, || {
                                    control_plane.ensure(&resolved)
                                })
                                .await;
                                (task_resource, result, attempts)
                            });
                            tracing::debug!(resource = %id, "ensure started");
                            running.insert(handle.id(), i);
                        }
                        Err(error) => progress.failed(i, error, 0),
                    },
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    match joined {
                        Ok((task_id, (id, result, attempts))) => {
                            let Some(i) = running.remove(&task_id) else {
                                continue;
                            };
                            match result {
                                Ok(ensured) if ensured.outcome == EnsureOutcome::ReplacementRequired => {
                                    let error = ApplyError::ReplacementRequired {
                                        resource: id,
                                        fields: vec!["reported by control plane".to_string()],
                                    };
                                    progress.failed(i, error, attempts);
                                }
                                Ok(ensured) => {
                                    tracing::info!(
                                        resource = %id,
                                        outcome = %ensured.outcome,
                                        attempts,
                                        "resource applied"
                                    );
                                    identities.publish(id.clone(), ensured.identity.clone());
                                    applied.insert(i, AppliedResource {
                                        id,
                                        spec: specs[i].clone(),
                                        identity: ensured.identity,
                                        applied_at: Utc::now(),
                                    });
                                    progress.applied(i, ensured.outcome, attempts);
                                }
                                Err(source) => {
                                    let error = ApplyError::Provider {
                                        resource: id,
                                        attempts,
                                        source,
                                    };
                                    progress.failed(i, error, attempts);
                                }
                            }
                        }
                        Err(join_error) => {
                            let Some(i) = running.remove(&join_error.id()) else {
                                continue;
                            };
                            if join_error.is_cancelled() {
                                tracing::warn!(resource = %order[i], "call interrupted by cancellation");
                                progress.reports[i].state = ResourceState::Indeterminate;
                            } else {
                                let error = ApplyError::Aborted {
                                    resource: order[i].clone(),
                                    reason: join_error.to_string(),
                                };
                                progress.failed(i, error, 0);
                            }
                        }
                    }
                }
                changed = cancel.changed(), if listening && !cancelled => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() {
                                tracing::warn!(in_flight = running.len(), "apply cancelled");
                                cancelled = true;
                                tasks.abort_all();
                            }
                        }
                        Err(_) => listening = false,
                    }
                }
            }
        }

        let all_applied = progress.all_applied();
        let removals = if all_applied && !cancelled {
            self.remove_all(prior, &plan.removals, &cancel).await
        } else {
            skipped(&plan.removals)
        };

        let mut resources: Vec<AppliedResource> = Vec::with_capacity(order.len());
        for (i, id) in order.iter().enumerate() {
            if let Some(record) = applied.remove(&i) {
                resources.push(record);
            } else if let Some(record) = prior.get(id) {
                resources.push(record.clone());
            }
        }
        resources.extend(kept_after_removal(prior, &removals));

        let outputs = all_applied.then(|| stack.outputs(&identities));
        let state = AppliedState {
            stack: stack.name().to_string(),
            deployment_id: Some(deployment_id),
            updated_at: Some(Utc::now()),
            resources,
            outputs: outputs.clone().unwrap_or_else(|| prior.outputs.clone()),
        };

        let report = ApplyReport {
            deployment_id,
            stack: stack.name().to_string(),
            resources: progress.reports,
            removals,
            outputs,
            state,
            cancelled,
        };
        tracing::info!(
            %deployment_id,
            success = report.is_success(),
            mutations = report.mutations(),
            "apply finished"
        );
        report
    }

    /// Tears down every applied resource in reverse dependency order.
    #[tracing::instrument(skip_all, fields(stack = %prior.stack))]
    pub async fn destroy(
        &self,
        prior: &AppliedState,
        cancel: watch::Receiver<bool>,
    ) -> DestroyReport {
        let removals = self.remove_all(prior, &plan_destroy(prior), &cancel).await;
        let cancelled = *cancel.borrow();

        let resources: Vec<AppliedResource> = kept_after_removal(prior, &removals).collect();
        let outputs = if resources.is_empty() {
            Default::default()
        } else {
            prior.outputs.clone()
        };

        DestroyReport {
            state: AppliedState {
                stack: prior.stack.clone(),
                deployment_id: prior.deployment_id,
                updated_at: Some(Utc::now()),
                resources,
                outputs,
            },
            removals,
            cancelled,
        }
    }

    /// Removes sequentially. The first failure or a cancellation skips the
    /// rest, since later entries may still be referenced by earlier ones.
    async fn remove_all(
        &self,
        prior: &AppliedState,
        removals: &[Removal],
        cancel: &watch::Receiver<bool>,
    ) -> Vec<RemovalReport> {
        let mut reports = Vec::with_capacity(removals.len());
        let mut halted = false;

        for removal in removals {
            let id = removal.id.clone();
            let record = prior.get(&id);

            if halted || *cancel.borrow() {
                reports.push(RemovalReport {
                    id,
                    status: RemovalStatus::Skipped,
                    attempts: 0,
                });
                continue;
            }

            let (status, attempts) = match record {
                _ if removal.retain => {
                    tracing::info!(resource = %id, "retained, forgetting");
                    (RemovalStatus::Forgotten, 0)
                }
                None => (RemovalStatus::Removed, 0),
                Some(record) => {
                    let label = id.to_string();
                    let (result, attempts) = with_retry(&self.options.retry, &label, || {
                        self.control_plane.remove(record)
                    })
                    .await;
                    match result {
                        Ok(()) => {
                            tracing::info!(resource = %id, attempts, "resource removed");
                            (RemovalStatus::Removed, attempts)
                        }
                        Err(error) => {
                            tracing::error!(resource = %id, error = %error, "removal failed");
                            halted = true;
                            (RemovalStatus::Failed(error.to_string()), attempts)
                        }
                    }
                }
            };

            reports.push(RemovalReport {
                id,
                status,
                attempts,
            });
        }

        reports
    }
}

fn skipped(removals: &[Removal]) -> Vec<RemovalReport> {
    removals
        .iter()
        .map(|removal| RemovalReport {
            id: removal.id.clone(),
            status: RemovalStatus::Skipped,
            attempts: 0,
        })
        .collect()
}

/// Prior records of resources a removal pass did not get rid of, in their
/// original order.
fn kept_after_removal<'a>(
    prior: &'a AppliedState,
    removals: &'a [RemovalReport],
) -> impl Iterator<Item = AppliedResource> + 'a {
    prior
        .resources
        .iter()
        .filter(move |record| {
            removals.iter().any(|r| {
                r.id == record.id
                    && matches!(r.status, RemovalStatus::Failed(_) | RemovalStatus::Skipped)
            })
        })
        .cloned()
}
