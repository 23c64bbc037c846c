//! In-memory control plane.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{ProviderError, Result};
use super::resource::{Identity, ResolvedFunction, ResolvedResource, ResolvedRole, ResolvedRoute};
use super::state::{AppliedResource, AppliedState};
use super::traits::{ControlPlane, EnsureOutcome, Ensured};
use crate::descriptor::{ApiDescriptor, FunctionDescriptor, ResourceId, TableDescriptor};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Failure behaviour injected for one resource.
#[derive(Debug, Clone, Default)]
struct Fault {
    transient_failures: u32,
    fatal: Option<String>,
    delay: Option<Duration>,
}

/// A control plane call, as recorded by [`LocalControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(ResourceId),
    Remove(ResourceId),
}

/// Control plane emulated in memory, with deterministic identities.
///
/// Used by the `local` target and by tests, which can inject transient
/// failures, fatal failures and delays per resource.
#[derive(Debug, Clone)]
pub struct LocalControlPlane {
    stack: String,
    region: String,
    account_id: String,
    resources: Arc<RwLock<HashMap<ResourceId, (ResolvedResource, Identity)>>>,
    known: Arc<RwLock<HashMap<ResourceId, Identity>>>,
    faults: Arc<RwLock<HashMap<ResourceId, Fault>>>,
    calls: Arc<RwLock<Vec<Call>>>,
    delayed: Arc<AtomicUsize>,
    peak_delayed: Arc<AtomicUsize>,
}

impl LocalControlPlane {
    pub fn new(
        stack: impl Into<String>,
        region: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
            account_id: account_id.into(),
            resources: Arc::new(RwLock::new(HashMap::new())),
            known: Arc::new(RwLock::new(HashMap::new())),
            faults: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            delayed: Arc::new(AtomicUsize::new(0)),
            peak_delayed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Local control plane in the default region and account.
    pub fn for_stack(stack: impl Into<String>) -> Self {
        Self::new(stack, DEFAULT_REGION, DEFAULT_ACCOUNT_ID)
    }

    /// Registers the identities of a previous apply, so ensuring them again
    /// reports an update rather than a creation.
    pub async fn seed(&self, state: &AppliedState) {
        let mut known = self.known.write().await;
        for resource in &state.resources {
            known.insert(resource.id.clone(), resource.identity.clone());
        }
    }

    /// The next `times` calls for `id` fail with a transient error.
    pub async fn fail_transiently(&self, id: &ResourceId, times: u32) {
        let mut faults = self.faults.write().await;
        faults.entry(id.clone()).or_default().transient_failures = times;
    }

    /// Every call for `id` fails with a fatal error.
    pub async fn fail_fatally(&self, id: &ResourceId, message: impl Into<String>) {
        let mut faults = self.faults.write().await;
        faults.entry(id.clone()).or_default().fatal = Some(message.into());
    }

    /// Every call for `id` waits `delay` before answering.
    pub async fn delay(&self, id: &ResourceId, delay: Duration) {
        let mut faults = self.faults.write().await;
        faults.entry(id.clone()).or_default().delay = Some(delay);
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.read().await.clone()
    }

    /// Number of ensure calls received so far.
    pub async fn ensure_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| matches!(c, Call::Ensure(_)))
            .count()
    }

    /// Highest number of delayed calls that were waiting at the same time.
    pub fn peak_delayed_calls(&self) -> usize {
        self.peak_delayed.load(Ordering::SeqCst)
    }

    pub async fn get(&self, id: &ResourceId) -> Option<ResolvedResource> {
        self.resources
            .read()
            .await
            .get(id)
            .map(|(resource, _)| resource.clone())
    }

    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }

    async fn intercept(&self, call: Call) -> Result<()> {
        let id = match &call {
            Call::Ensure(id) | Call::Remove(id) => id.clone(),
        };
        self.calls.write().await.push(call);

        let delay = {
            let mut faults = self.faults.write().await;
            let Some(fault) = faults.get_mut(&id) else {
                return Ok(());
            };
            if let Some(message) = &fault.fatal {
                return Err(ProviderError::Fatal(message.clone()));
            }
            if fault.transient_failures > 0 {
                fault.transient_failures -= 1;
                return Err(ProviderError::Transient(format!("{id} is throttled")));
            }
            fault.delay
        };

        if let Some(delay) = delay {
            let waiting = self.delayed.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_delayed.fetch_max(waiting, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.delayed.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn identity(&self, resource: &ResolvedResource) -> Identity {
        match resource {
            ResolvedResource::Table(table) => Identity::new(&table.name).with_arn(format!(
                "arn:aws:dynamodb:{}:{}:table/{}",
                self.region, self.account_id, table.name
            )),
            ResolvedResource::Role(role) => {
                let name = format!("{}-{}", self.stack, role.role.name);
                let arn = format!("arn:aws:iam::{}:role/{}", self.account_id, name);
                Identity::new(name).with_arn(arn)
            }
            ResolvedResource::Function(function) => {
                let name = format!("{}-{}", self.stack, function.function.name);
                let arn = format!(
                    "arn:aws:lambda:{}:{}:function:{}",
                    self.region, self.account_id, name
                );
                Identity::new(name).with_arn(arn)
            }
            ResolvedResource::Api(api) => {
                let id = short_id(&format!("{}/{}", self.stack, api.name));
                let url = format!(
                    "https://{}.execute-api.{}.amazonaws.com/{}/",
                    id, self.region, api.stage
                );
                Identity::new(id).with_url(url)
            }
            ResolvedResource::Route(route) => {
                Identity::new(short_id(&format!("{}{}", route.api_id, route.route.path)))
            }
        }
    }

    async fn put(&self, resource: ResolvedResource) -> Result<Ensured> {
        let id = resource.id();
        self.intercept(Call::Ensure(id.clone())).await?;

        let mut resources = self.resources.write().await;
        if let Some((existing, identity)) = resources.get(&id) {
            if existing == &resource {
                return Ok(Ensured::new(identity.clone(), EnsureOutcome::Unchanged));
            }
            if let (ResolvedResource::Table(old), ResolvedResource::Table(new)) =
                (existing, &resource)
            {
                if old.partition_key != new.partition_key || old.sort_key != new.sort_key {
                    return Ok(Ensured::new(
                        identity.clone(),
                        EnsureOutcome::ReplacementRequired,
                    ));
                }
            }
        }

        let existed =
            resources.contains_key(&id) || self.known.read().await.contains_key(&id);
        let identity = self.identity(&resource);
        resources.insert(id.clone(), (resource, identity.clone()));

        let outcome = if existed {
            EnsureOutcome::Updated
        } else {
            EnsureOutcome::Created
        };
        tracing::debug!(resource = %id, %outcome, "local control plane ensured resource");
        Ok(Ensured::new(identity, outcome))
    }
}

/// First ten hex characters of a name-based UUID.
fn short_id(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes())
        .simple()
        .to_string()
        .chars()
        .take(10)
        .collect()
}

#[async_trait]
impl ControlPlane for LocalControlPlane {
    async fn ensure_table(&self, table: &TableDescriptor) -> Result<Ensured> {
        self.put(ResolvedResource::Table(table.clone())).await
    }

    async fn ensure_role(&self, role: &ResolvedRole) -> Result<Ensured> {
        self.put(ResolvedResource::Role(role.clone())).await
    }

    async fn ensure_function(
        &self,
        function: &FunctionDescriptor,
        role_arn: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<Ensured> {
        self.put(ResolvedResource::Function(ResolvedFunction {
            function: function.clone(),
            role_arn: role_arn.to_string(),
            environment: environment.clone(),
        }))
        .await
    }

    async fn ensure_api(&self, api: &ApiDescriptor) -> Result<Ensured> {
        self.put(ResolvedResource::Api(api.clone())).await
    }

    async fn ensure_route(&self, route: &ResolvedRoute) -> Result<Ensured> {
        self.put(ResolvedResource::Route(route.clone())).await
    }

    async fn remove(&self, resource: &AppliedResource) -> Result<()> {
        self.intercept(Call::Remove(resource.id.clone())).await?;
        self.resources.write().await.remove(&resource.id);
        self.known.write().await.remove(&resource.id);
        tracing::debug!(resource = %resource.id, "local control plane removed resource");
        Ok(())
    }
}
