use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::Result;
use super::resource::{Identity, ResolvedResource, ResolvedRole, ResolvedRoute};
use super::state::AppliedResource;
use crate::descriptor::{ApiDescriptor, FunctionDescriptor, TableDescriptor};

/// Result of an idempotent ensure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
    /// The provider refuses to change the resource in place.
    ReplacementRequired,
}

impl fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnsureOutcome::Created => "created",
            EnsureOutcome::Updated => "updated",
            EnsureOutcome::Unchanged => "unchanged",
            EnsureOutcome::ReplacementRequired => "replacement_required",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub identity: Identity,
    pub outcome: EnsureOutcome,
}

impl Ensured {
    pub fn new(identity: Identity, outcome: EnsureOutcome) -> Self {
        Self { identity, outcome }
    }
}

/// Control plane collaborator: create-or-update per resource kind.
///
/// Every call must be idempotent. Ensuring a resource that already matches
/// returns [`EnsureOutcome::Unchanged`].
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Ensures a table exists with the given key schema and retention.
    async fn ensure_table(&self, table: &TableDescriptor) -> Result<Ensured>;

    /// Ensures a role exists with exactly the given statements.
    async fn ensure_role(&self, role: &ResolvedRole) -> Result<Ensured>;

    /// Ensures a function exists with the given code, role and environment.
    async fn ensure_function(
        &self,
        function: &FunctionDescriptor,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<Ensured>;

    /// Ensures the API and its stage exist.
    async fn ensure_api(&self, api: &ApiDescriptor) -> Result<Ensured>;

    /// Ensures a route resource and its method integrations exist.
    async fn ensure_route(&self, route: &ResolvedRoute) -> Result<Ensured>;

    /// Deletes an applied resource. Deleting a missing resource succeeds.
    async fn remove(&self, resource: &AppliedResource) -> Result<()>;

    /// Dispatches to the per-kind call.
    async fn ensure(&self, resource: &ResolvedResource) -> Result<Ensured> {
        match resource {
            ResolvedResource::Table(table) => self.ensure_table(table).await,
            ResolvedResource::Role(role) => self.ensure_role(role).await,
            ResolvedResource::Function(f) => {
                self.ensure_function(&f.function, &f.role_arn, &f.environment)
                    .await
            }
            ResolvedResource::Api(api) => self.ensure_api(api).await,
            ResolvedResource::Route(route) => self.ensure_route(route).await,
        }
    }
}
