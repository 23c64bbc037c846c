//! Applied state: what the last apply left behind.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::{Identity, ResourceSpec};
use crate::descriptor::ResourceId;

/// Named stack outputs, e.g. `ApiUrl`.
pub type StackOutputs = BTreeMap<String, String>;

/// Lifecycle of a resource within one apply.
///
/// `Absent -> Planned -> Applied | Failed`. A resource whose call was in
/// flight when the apply was cancelled ends `Indeterminate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Planned,
    Applied,
    Failed,
    Indeterminate,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Absent => "absent",
            ResourceState::Planned => "planned",
            ResourceState::Applied => "applied",
            ResourceState::Failed => "failed",
            ResourceState::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource known to exist, with the shape it was applied with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub id: ResourceId,
    pub spec: ResourceSpec,
    pub identity: Identity,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedState {
    pub stack: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Resources in the order they were applied.
    #[serde(default)]
    pub resources: Vec<AppliedResource>,
    #[serde(default)]
    pub outputs: StackOutputs,
}

impl AppliedState {
    /// State of a stack that was never applied.
    pub fn empty(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            deployment_id: None,
            updated_at: None,
            resources: Vec::new(),
            outputs: StackOutputs::new(),
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<&AppliedResource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn identity(&self, id: &ResourceId) -> Option<&Identity> {
        self.get(id).map(|r| &r.identity)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
