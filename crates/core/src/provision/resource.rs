//! Provisionable resources, their physical identities and reference resolution.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::error::ApplyError;
use crate::descriptor::{
    ApiDescriptor, FunctionDescriptor, ResourceId, RoleDescriptor, TableDescriptor,
};
use crate::permissions::{policy_statements, PolicyStatement};
use crate::routes::{HttpMethod, Integration, PreflightResponse, RouteDescriptor};

/// Declared shape of one resource, as stored in the applied state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Table(TableDescriptor),
    Role(RoleDescriptor),
    Function(FunctionDescriptor),
    Api(ApiDescriptor),
    Route(RouteDescriptor),
}

impl ResourceSpec {
    pub fn id(&self) -> ResourceId {
        match self {
            ResourceSpec::Table(t) => t.id(),
            ResourceSpec::Role(r) => r.id(),
            ResourceSpec::Function(f) => f.id(),
            ResourceSpec::Api(a) => a.id(),
            ResourceSpec::Route(r) => r.id(),
        }
    }

    /// Resources whose identity this one consumes.
    pub fn dependencies(&self) -> Vec<ResourceId> {
        match self {
            ResourceSpec::Table(_) | ResourceSpec::Api(_) => Vec::new(),
            ResourceSpec::Role(role) => role.granted_tables().map(ResourceId::table).collect(),
            ResourceSpec::Function(function) => {
                let mut deps = vec![ResourceId::role(&function.role)];
                deps.extend(function.referenced_tables().map(ResourceId::table));
                deps
            }
            ResourceSpec::Route(route) => {
                let mut deps = vec![match &route.parent {
                    Some(parent) => ResourceId::route(parent),
                    None => ResourceId::api(&route.api),
                }];
                deps.extend(route.functions().map(ResourceId::function));
                deps
            }
        }
    }
}

/// Physical identity published by the control plane once a resource exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider side name or id.
    pub physical_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Identity {
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            arn: None,
            url: None,
        }
    }

    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = Some(arn.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// The ARN when known, the physical id otherwise.
    pub fn reference(&self) -> &str {
        self.arn.as_deref().unwrap_or(&self.physical_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRole {
    pub role: RoleDescriptor,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFunction {
    pub function: FunctionDescriptor,
    pub role_arn: String,
    /// Table name variables plus user variables.
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIntegration {
    Function { name: String, arn: String },
    Preflight(PreflightResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    pub method: HttpMethod,
    pub integration: ResolvedIntegration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute {
    pub route: RouteDescriptor,
    pub api_id: String,
    /// Physical id of the parent route, `None` under the API root.
    pub parent_id: Option<String>,
    pub methods: Vec<ResolvedMethod>,
}

/// A resource with every cross-resource reference replaced by the
/// dependency's physical identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResource {
    Table(TableDescriptor),
    Role(ResolvedRole),
    Function(ResolvedFunction),
    Api(ApiDescriptor),
    Route(ResolvedRoute),
}

impl ResolvedResource {
    pub fn id(&self) -> ResourceId {
        match self {
            ResolvedResource::Table(t) => t.id(),
            ResolvedResource::Role(r) => r.role.id(),
            ResolvedResource::Function(f) => f.function.id(),
            ResolvedResource::Api(a) => a.id(),
            ResolvedResource::Route(r) => r.route.id(),
        }
    }
}

/// Identities published during an apply. Each resource publishes once.
#[derive(Debug, Clone, Default)]
pub struct Identities {
    published: HashMap<ResourceId, Identity>,
}

impl Identities {
    /// Records `identity` for `id`. Returns `false` and keeps the first value
    /// if `id` was already published.
    pub fn publish(&mut self, id: ResourceId, identity: Identity) -> bool {
        if self.published.contains_key(&id) {
            return false;
        }
        self.published.insert(id, identity);
        true
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Identity> {
        self.published.get(id)
    }

    pub fn len(&self) -> usize {
        self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }

    fn require(&self, resource: &ResourceId, dependency: ResourceId) -> Result<&Identity, ApplyError> {
        self.published
            .get(&dependency)
            .ok_or_else(|| ApplyError::UnresolvedReference {
                resource: resource.clone(),
                dependency,
            })
    }
}

/// Replaces the references of `spec` with published identities.
///
/// Table ARNs go into policy statements, table names into function
/// environments, the role ARN into functions, function ARNs and the API id
/// into routes.
pub fn resolve_references(
    spec: &ResourceSpec,
    identities: &Identities,
) -> Result<ResolvedResource, ApplyError> {
    let id = spec.id();

    match spec {
        ResourceSpec::Table(table) => Ok(ResolvedResource::Table(table.clone())),
        ResourceSpec::Api(api) => Ok(ResolvedResource::Api(api.clone())),
        ResourceSpec::Role(role) => {
            let statements = policy_statements(role, |table| {
                identities
                    .get(&ResourceId::table(table))
                    .map(|identity| identity.reference().to_string())
            })
            .map_err(|table| ApplyError::UnresolvedReference {
                resource: id.clone(),
                dependency: ResourceId::table(table),
            })?;

            Ok(ResolvedResource::Role(ResolvedRole {
                role: role.clone(),
                statements,
            }))
        }
        ResourceSpec::Function(function) => {
            let role_arn = identities
                .require(&id, ResourceId::role(&function.role))?
                .reference()
                .to_string();

            let mut environment = function.variables.clone();
            for binding in &function.tables {
                let table = identities.require(&id, ResourceId::table(&binding.table))?;
                environment.insert(binding.env.clone(), table.physical_id.clone());
            }

            Ok(ResolvedResource::Function(ResolvedFunction {
                function: function.clone(),
                role_arn,
                environment,
            }))
        }
        ResourceSpec::Route(route) => {
            let api_id = identities
                .require(&id, ResourceId::api(&route.api))?
                .physical_id
                .clone();
            let parent_id = match &route.parent {
                Some(parent) => Some(
                    identities
                        .require(&id, ResourceId::route(parent))?
                        .physical_id
                        .clone(),
                ),
                None => None,
            };

            let mut methods = Vec::with_capacity(route.methods.len());
            for binding in &route.methods {
                let integration = match &binding.integration {
                    Integration::Function(name) => ResolvedIntegration::Function {
                        name: name.clone(),
                        arn: identities
                            .require(&id, ResourceId::function(name))?
                            .reference()
                            .to_string(),
                    },
                    Integration::Preflight(response) => {
                        ResolvedIntegration::Preflight(response.clone())
                    }
                };
                methods.push(ResolvedMethod {
                    method: binding.method,
                    integration,
                });
            }

            Ok(ResolvedResource::Route(ResolvedRoute {
                route: route.clone(),
                api_id,
                parent_id,
                methods,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        AccessLevel, AttributeType, BillingMode, KeyAttribute, RemovalPolicy, TableBinding,
        TableGrant, FUNCTION_PRINCIPAL,
    };
    use crate::routes::MethodBinding;

    fn table() -> TableDescriptor {
        TableDescriptor {
            name: "users".to_string(),
            partition_key: KeyAttribute::new("id", AttributeType::String),
            sort_key: None,
            billing_mode: BillingMode::PayPerRequest,
            point_in_time_recovery: true,
            ttl_attribute: None,
            removal_policy: RemovalPolicy::Retain,
        }
    }

    fn role() -> RoleDescriptor {
        RoleDescriptor {
            name: "exec".to_string(),
            principal: FUNCTION_PRINCIPAL.to_string(),
            log_delivery: true,
            grants: vec![TableGrant {
                table: "users".to_string(),
                actions: AccessLevel::Read.actions(),
            }],
        }
    }

    fn function() -> FunctionDescriptor {
        FunctionDescriptor {
            name: "list".to_string(),
            code: "src/list".to_string(),
            handler: "index.handler".to_string(),
            runtime: "python3.11".to_string(),
            timeout_seconds: 30,
            role: "exec".to_string(),
            tables: vec![TableBinding {
                table: "users".to_string(),
                env: "USERS_TABLE_NAME".to_string(),
                actions: AccessLevel::Read.actions(),
            }],
            variables: BTreeMap::from([("STAGE".to_string(), "prod".to_string())]),
        }
    }

    fn route(parent: Option<&str>) -> RouteDescriptor {
        RouteDescriptor {
            api: "api".to_string(),
            path: "/users/list".to_string(),
            parent: parent.map(str::to_string),
            methods: vec![
                MethodBinding {
                    method: HttpMethod::Get,
                    integration: Integration::Function("list".to_string()),
                },
                MethodBinding {
                    method: HttpMethod::Options,
                    integration: Integration::Preflight(PreflightResponse::for_methods(&[
                        HttpMethod::Get,
                    ])),
                },
            ],
        }
    }

    #[test]
    fn test_dependencies_per_kind() {
        assert!(ResourceSpec::Table(table()).dependencies().is_empty());
        assert_eq!(
            ResourceSpec::Role(role()).dependencies(),
            vec![ResourceId::table("users")]
        );
        assert_eq!(
            ResourceSpec::Function(function()).dependencies(),
            vec![ResourceId::role("exec"), ResourceId::table("users")]
        );
        assert_eq!(
            ResourceSpec::Route(route(Some("/users"))).dependencies(),
            vec![ResourceId::route("/users"), ResourceId::function("list")]
        );
        assert_eq!(
            ResourceSpec::Route(route(None)).dependencies(),
            vec![ResourceId::api("api"), ResourceId::function("list")]
        );
    }

    #[test]
    fn test_publish_is_write_once() {
        let mut identities = Identities::default();
        assert!(identities.publish(ResourceId::table("users"), Identity::new("users")));
        assert!(!identities.publish(ResourceId::table("users"), Identity::new("other")));
        assert_eq!(
            identities.get(&ResourceId::table("users")).unwrap().physical_id,
            "users"
        );
    }

    #[test]
    fn test_role_statements_use_table_arn() {
        let mut identities = Identities::default();
        identities.publish(
            ResourceId::table("users"),
            Identity::new("users").with_arn("arn:aws:dynamodb:us-east-1:1:table/users"),
        );

        let resolved = resolve_references(&ResourceSpec::Role(role()), &identities).unwrap();

        let ResolvedResource::Role(resolved) = resolved else {
            panic!("expected role");
        };
        assert_eq!(resolved.statements.len(), 2);
        assert_eq!(
            resolved.statements[1].resources,
            vec!["arn:aws:dynamodb:us-east-1:1:table/users".to_string()]
        );
    }

    #[test]
    fn test_function_environment_gets_table_names() {
        let mut identities = Identities::default();
        identities.publish(
            ResourceId::table("users"),
            Identity::new("users").with_arn("arn:table/users"),
        );
        identities.publish(
            ResourceId::role("exec"),
            Identity::new("stack-exec").with_arn("arn:role/stack-exec"),
        );

        let resolved =
            resolve_references(&ResourceSpec::Function(function()), &identities).unwrap();

        let ResolvedResource::Function(resolved) = resolved else {
            panic!("expected function");
        };
        assert_eq!(resolved.role_arn, "arn:role/stack-exec");
        assert_eq!(resolved.environment["USERS_TABLE_NAME"], "users");
        assert_eq!(resolved.environment["STAGE"], "prod");
    }

    #[test]
    fn test_missing_identity_is_reported() {
        let err = resolve_references(&ResourceSpec::Function(function()), &Identities::default())
            .unwrap_err();

        assert_eq!(
            err,
            ApplyError::UnresolvedReference {
                resource: ResourceId::function("list"),
                dependency: ResourceId::role("exec"),
            }
        );
    }

    #[test]
    fn test_route_resolves_api_parent_and_functions() {
        let mut identities = Identities::default();
        identities.publish(ResourceId::api("api"), Identity::new("a1b2c3"));
        identities.publish(ResourceId::route("/users"), Identity::new("r-users"));
        identities.publish(
            ResourceId::function("list"),
            Identity::new("stack-list").with_arn("arn:function:stack-list"),
        );

        let resolved =
            resolve_references(&ResourceSpec::Route(route(Some("/users"))), &identities).unwrap();

        let ResolvedResource::Route(resolved) = resolved else {
            panic!("expected route");
        };
        assert_eq!(resolved.api_id, "a1b2c3");
        assert_eq!(resolved.parent_id.as_deref(), Some("r-users"));
        assert_eq!(
            resolved.methods[0].integration,
            ResolvedIntegration::Function {
                name: "list".to_string(),
                arn: "arn:function:stack-list".to_string(),
            }
        );
        assert!(matches!(
            resolved.methods[1].integration,
            ResolvedIntegration::Preflight(_)
        ));
    }
}
