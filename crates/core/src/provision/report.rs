use uuid::Uuid;

use super::planning::Change;
use super::state::{AppliedState, ResourceState, StackOutputs};
use super::traits::EnsureOutcome;
use crate::descriptor::ResourceId;

/// Terminal status of one declared resource after an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReport {
    pub id: ResourceId,
    pub change: Change,
    pub state: ResourceState,
    pub outcome: Option<EnsureOutcome>,
    pub attempts: u32,
    pub error: Option<String>,
    /// Failed dependency that kept this resource from starting.
    pub blocked_by: Option<ResourceId>,
}

impl ResourceReport {
    pub(crate) fn planned(id: ResourceId, change: Change) -> Self {
        Self {
            id,
            change,
            state: ResourceState::Planned,
            outcome: None,
            attempts: 0,
            error: None,
            blocked_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalStatus {
    Removed,
    /// Retained table, dropped from state only.
    Forgotten,
    Failed(String),
    /// Not attempted because an earlier step failed or the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub id: ResourceId,
    pub status: RemovalStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub deployment_id: Uuid,
    pub stack: String,
    /// Declared resources in dependency order.
    pub resources: Vec<ResourceReport>,
    pub removals: Vec<RemovalReport>,
    /// Present only when every declared resource is applied.
    pub outputs: Option<StackOutputs>,
    /// State to persist: applied resources only.
    pub state: AppliedState,
    pub cancelled: bool,
}

impl ApplyReport {
    pub fn resource(&self, id: &ResourceId) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self
                .resources
                .iter()
                .all(|r| r.state == ResourceState::Applied)
            && self
                .removals
                .iter()
                .all(|r| matches!(r.status, RemovalStatus::Removed | RemovalStatus::Forgotten))
    }

    pub fn failed(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources
            .iter()
            .filter(|r| r.state == ResourceState::Failed)
    }

    /// Resources that were never started, with the failure that blocked them.
    pub fn blocked(&self) -> impl Iterator<Item = &ResourceReport> {
        self.resources
            .iter()
            .filter(|r| r.state == ResourceState::Planned)
    }

    /// Ensure calls that created or updated a resource.
    pub fn mutations(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    Some(EnsureOutcome::Created) | Some(EnsureOutcome::Updated)
                )
            })
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestroyReport {
    pub removals: Vec<RemovalReport>,
    /// Resources still known to exist.
    pub state: AppliedState,
    pub cancelled: bool,
}

impl DestroyReport {
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self
                .removals
                .iter()
                .all(|r| matches!(r.status, RemovalStatus::Removed | RemovalStatus::Forgotten))
    }
}

/// Pure function: format an apply report for display, one line per resource.
pub fn format_apply_report(report: &ApplyReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.resources.len() + report.removals.len());

    for resource in &report.resources {
        let line = match resource.state {
            ResourceState::Applied => {
                let outcome = resource
                    .outcome
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "unchanged".to_string());
                if resource.attempts > 1 {
                    format!(
                        "✓ {} {} after {} attempts",
                        resource.id, outcome, resource.attempts
                    )
                } else {
                    format!("✓ {} {}", resource.id, outcome)
                }
            }
            ResourceState::Failed => format!(
                "✗ {} failed: {}",
                resource.id,
                resource.error.as_deref().unwrap_or("unknown error")
            ),
            ResourceState::Planned => match &resource.blocked_by {
                Some(dependency) => format!("… {} blocked by {}", resource.id, dependency),
                None => format!("… {} not started", resource.id),
            },
            ResourceState::Indeterminate => format!(
                "? {} indeterminate, the call was interrupted",
                resource.id
            ),
            ResourceState::Absent => format!("  {} absent", resource.id),
        };
        lines.push(line);
    }

    lines.extend(format_removal_reports(&report.removals));
    lines
}

/// Pure function: format removal results for display.
pub fn format_removal_reports(removals: &[RemovalReport]) -> Vec<String> {
    removals
        .iter()
        .map(|removal| match &removal.status {
            RemovalStatus::Removed => format!("- {} removed", removal.id),
            RemovalStatus::Forgotten => format!("- {} forgotten (retained)", removal.id),
            RemovalStatus::Failed(error) => {
                format!("✗ {} removal failed: {}", removal.id, error)
            }
            RemovalStatus::Skipped => format!("… {} removal skipped", removal.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: ResourceState) -> ResourceReport {
        ResourceReport {
            state,
            ..ResourceReport::planned(ResourceId::function("hello"), Change::Create)
        }
    }

    #[test]
    fn test_format_lines_per_state() {
        let applied = ResourceReport {
            outcome: Some(EnsureOutcome::Created),
            attempts: 3,
            ..report(ResourceState::Applied)
        };
        let failed = ResourceReport {
            error: Some("access denied".to_string()),
            ..report(ResourceState::Failed)
        };
        let blocked = ResourceReport {
            blocked_by: Some(ResourceId::role("exec")),
            ..report(ResourceState::Planned)
        };

        let apply = ApplyReport {
            deployment_id: Uuid::nil(),
            stack: "demo".to_string(),
            resources: vec![applied, failed, blocked, report(ResourceState::Indeterminate)],
            removals: vec![RemovalReport {
                id: ResourceId::table("old"),
                status: RemovalStatus::Forgotten,
                attempts: 0,
            }],
            outputs: None,
            state: AppliedState::empty("demo"),
            cancelled: false,
        };

        assert_eq!(
            format_apply_report(&apply),
            vec![
                "✓ function:hello created after 3 attempts",
                "✗ function:hello failed: access denied",
                "… function:hello blocked by role:exec",
                "? function:hello indeterminate, the call was interrupted",
                "- table:old forgotten (retained)",
            ]
        );
        assert!(!apply.is_success());
        assert_eq!(apply.failed().count(), 1);
        assert_eq!(apply.blocked().count(), 1);
        assert_eq!(apply.mutations(), 1);
    }
}
