//! AWS target: tables are provisioned in DynamoDB, every other kind is
//! emulated by the local control plane.

mod client;
mod error;
mod tables;

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use stackplan_core::descriptor::{ApiDescriptor, FunctionDescriptor, ResourceKind, TableDescriptor};
use stackplan_core::provision::{
    AppliedResource, ControlPlane, EnsureOutcome, Ensured, Identity, LocalControlPlane,
    ResolvedRole, ResolvedRoute, Result,
};

pub use client::{create_client, AwsConfig};

pub struct AwsControlPlane {
    client: Client,
    region: String,
    account_id: String,
    local: LocalControlPlane,
}

impl AwsControlPlane {
    pub fn new(client: Client, config: &crate::config::Config, local: LocalControlPlane) -> Self {
        Self {
            client,
            region: config.region.clone(),
            account_id: config.account_id.clone(),
            local,
        }
    }

    fn identity(&self, table: &TableDescriptor, arn: Option<String>) -> Identity {
        let arn = arn.unwrap_or_else(|| {
            format!(
                "arn:aws:dynamodb:{}:{}:table/{}",
                self.region, self.account_id, table.name
            )
        });
        Identity::new(&table.name).with_arn(arn)
    }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    #[tracing::instrument(skip_all, fields(table = %table.name))]
    async fn ensure_table(&self, table: &TableDescriptor) -> Result<Ensured> {
        let Some(current) = tables::describe_table(&self.client, &table.name).await? else {
            tracing::info!("creating table");
            tables::create_table(&self.client, table).await?;
            let created = tables::wait_for_table_active(&self.client, &table.name).await?;
            tables::sync_recovery(&self.client, table).await?;
            tables::sync_ttl(&self.client, table).await?;
            return Ok(Ensured::new(
                self.identity(table, created.arn),
                EnsureOutcome::Created,
            ));
        };

        if current.requires_replacement(table) {
            return Ok(Ensured::new(
                self.identity(table, current.arn),
                EnsureOutcome::ReplacementRequired,
            ));
        }
        let current = if current.active {
            current
        } else {
            tables::wait_for_table_active(&self.client, &table.name).await?
        };

        let mut changed = false;
        if !current.on_demand {
            tables::switch_to_on_demand(&self.client, &table.name).await?;
            tables::wait_for_table_active(&self.client, &table.name).await?;
            changed = true;
        }
        changed |= tables::sync_recovery(&self.client, table).await?;
        changed |= tables::sync_ttl(&self.client, table).await?;

        let outcome = if changed {
            EnsureOutcome::Updated
        } else {
            EnsureOutcome::Unchanged
        };
        tracing::debug!(%outcome, "table ensured");
        Ok(Ensured::new(self.identity(table, current.arn), outcome))
    }

    async fn ensure_role(&self, role: &ResolvedRole) -> Result<Ensured> {
        self.local.ensure_role(role).await
    }

    async fn ensure_function(
        &self,
        function: &FunctionDescriptor,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<Ensured> {
        self.local
            .ensure_function(function, role_arn, environment)
            .await
    }

    async fn ensure_api(&self, api: &ApiDescriptor) -> Result<Ensured> {
        self.local.ensure_api(api).await
    }

    async fn ensure_route(&self, route: &ResolvedRoute) -> Result<Ensured> {
        self.local.ensure_route(route).await
    }

    async fn remove(&self, resource: &AppliedResource) -> Result<()> {
        match resource.id.kind {
            ResourceKind::Table => {
                tracing::info!(table = %resource.identity.physical_id, "deleting table");
                tables::delete_table(&self.client, &resource.identity.physical_id).await
            }
            _ => self.local.remove(resource).await,
        }
    }
}
