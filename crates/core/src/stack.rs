//! The stack aggregate: a validated descriptor set with bound permissions,
//! the route tree and the resolved dependency order.

use thiserror::Error;

use crate::descriptor::{
    build_descriptor_set, ApiDescriptor, ConfigError, DescriptorSet, FunctionDescriptor,
    ResourceId, RoleDescriptor, StackConfig, TableDescriptor,
};
use crate::graph::{DependencyGraph, GraphError, Node};
use crate::permissions::bind_permissions;
use crate::provision::{Identities, ResourceSpec, StackOutputs};
use crate::routes::{build_route_tree, RouteTree};

/// Errors that abort compilation before any side effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for stack compilation.
pub type Result<T> = std::result::Result<T, StackError>;

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    descriptors: DescriptorSet,
    routes: RouteTree,
    /// Every resource, in dependency order.
    resources: Vec<ResourceSpec>,
    graph: DependencyGraph,
}

impl Stack {
    /// Validates `config` and compiles it.
    pub fn from_config(config: &StackConfig) -> Result<Self> {
        Self::compile(build_descriptor_set(config)?)
    }

    /// Binds permissions, builds the route tree and orders every resource.
    ///
    /// Pure: the same descriptor set always compiles to the same stack.
    pub fn compile(mut descriptors: DescriptorSet) -> Result<Self> {
        descriptors.roles = bind_permissions(&descriptors.roles, &descriptors.functions);
        let routes = build_route_tree(&descriptors.routes)?;

        let mut declared: Vec<ResourceSpec> = Vec::new();
        declared.extend(descriptors.tables.iter().cloned().map(ResourceSpec::Table));
        declared.extend(descriptors.roles.iter().cloned().map(ResourceSpec::Role));
        declared.extend(descriptors.functions.iter().cloned().map(ResourceSpec::Function));
        if let Some(api) = &descriptors.api {
            declared.push(ResourceSpec::Api(api.clone()));
            declared.extend(
                routes
                    .descriptors(&api.name)
                    .into_iter()
                    .map(ResourceSpec::Route),
            );
        }

        let nodes: Vec<Node> = declared
            .iter()
            .map(|spec| Node::new(spec.id(), spec.dependencies()))
            .collect();
        let graph = DependencyGraph::new(&nodes)?;
        let order = graph.resolve_order().map_err(GraphError::from)?;

        let mut resources = Vec::with_capacity(declared.len());
        for id in &order {
            if let Some(at) = declared.iter().position(|spec| &spec.id() == id) {
                resources.push(declared.swap_remove(at));
            }
        }

        tracing::debug!(
            stack = %descriptors.name,
            resources = resources.len(),
            "stack compiled"
        );

        Ok(Self {
            name: descriptors.name.clone(),
            descriptors,
            routes,
            resources,
            graph,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.descriptors.tables
    }

    /// Roles with their bound grants.
    pub fn roles(&self) -> &[RoleDescriptor] {
        &self.descriptors.roles
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.descriptors.functions
    }

    pub fn api(&self) -> Option<&ApiDescriptor> {
        self.descriptors.api.as_ref()
    }

    pub fn route_tree(&self) -> &RouteTree {
        &self.routes
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Resources in dependency order.
    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn order(&self) -> Vec<ResourceId> {
        self.resources.iter().map(ResourceSpec::id).collect()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&ResourceSpec> {
        self.resources.iter().find(|spec| &spec.id() == id)
    }

    /// Outputs published after a full apply: the API entry URL, every table
    /// name and every function ARN.
    pub fn outputs(&self, identities: &Identities) -> StackOutputs {
        let mut outputs = StackOutputs::new();

        if let Some(api) = self.api() {
            if let Some(url) = identities
                .get(&api.id())
                .and_then(|identity| identity.url.clone())
            {
                outputs.insert("ApiUrl".to_string(), url);
            }
        }

        for table in self.tables() {
            if let Some(identity) = identities.get(&table.id()) {
                outputs.insert(table_output_name(&table.name), identity.physical_id.clone());
            }
        }

        for function in self.functions() {
            if let Some(identity) = identities.get(&function.id()) {
                outputs.insert(
                    format!("{}FunctionArn", pascal_case(&function.name)),
                    identity.reference().to_string(),
                );
            }
        }

        outputs
    }
}

/// `users` -> `UsersTableName`, `matching-table` -> `MatchingTableName`.
pub fn table_output_name(table: &str) -> String {
    let stem = pascal_case(table);
    if stem.ends_with("Table") {
        format!("{stem}Name")
    } else {
        format!("{stem}TableName")
    }
}

fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ResourceKind, TableAction};
    use crate::provision::Identity;
    use crate::routes::HttpMethod;

    const HELLO_STACK: &str = r#"{
        "name": "hello",
        "tables": [
            { "name": "hello-table", "partition_key": { "name": "id", "type": "string" } }
        ],
        "roles": [ { "name": "exec" } ],
        "defaults": { "role": "exec" },
        "functions": [
            {
                "name": "hello",
                "code": "lambda/hello",
                "handler": "index.handler",
                "tables": [ { "table": "hello-table", "access": "read_write" } ]
            }
        ],
        "api": {
            "name": "hello-api",
            "routes": [ { "path": "/hello", "method": "GET", "target": { "function": "hello" } } ]
        }
    }"#;

    fn hello_stack() -> Stack {
        Stack::from_config(&StackConfig::from_json(HELLO_STACK).unwrap()).unwrap()
    }

    #[test]
    fn test_single_table_stack_grants_and_preflight() {
        let stack = hello_stack();

        let role = &stack.roles()[0];
        assert_eq!(role.grants.len(), 1);
        assert_eq!(role.grants[0].table, "hello-table");
        assert_eq!(
            role.grants[0].actions.iter().copied().collect::<Vec<_>>(),
            TableAction::ALL.to_vec()
        );

        let hello = stack.route_tree().get("/hello").unwrap();
        assert!(hello.method(HttpMethod::Get).is_some());
        assert_eq!(
            hello.preflight().unwrap().allowed_methods(),
            vec![HttpMethod::Options, HttpMethod::Get]
        );
    }

    #[test]
    fn test_resources_follow_dependency_order() {
        let stack = hello_stack();

        let kinds: Vec<ResourceKind> = stack.order().iter().map(|id| id.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Table,
                ResourceKind::Role,
                ResourceKind::Function,
                ResourceKind::Api,
                ResourceKind::Route,
            ]
        );

        let order = stack.order();
        for spec in stack.resources() {
            let at = order.iter().position(|id| id == &spec.id()).unwrap();
            for dep in spec.dependencies() {
                assert!(order.iter().position(|id| id == &dep).unwrap() < at);
            }
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = hello_stack();
        let b = hello_stack();
        assert_eq!(
            serde_json::to_string(a.resources()).unwrap(),
            serde_json::to_string(b.resources()).unwrap()
        );
    }

    #[test]
    fn test_duplicate_options_fails_before_provisioning() {
        let config = HELLO_STACK.replace(
            r#"[ { "path": "/hello", "method": "GET", "target": { "function": "hello" } } ]"#,
            r#"[
                { "path": "/hello", "method": "OPTIONS", "target": "preflight" },
                { "path": "/hello", "method": "OPTIONS", "target": "preflight" }
            ]"#,
        );

        let err = Stack::from_config(&StackConfig::from_json(&config).unwrap()).unwrap_err();

        assert_eq!(
            err,
            StackError::Config(ConfigError::DuplicateMethod {
                path: "/hello".to_string(),
                method: HttpMethod::Options,
            })
        );
    }

    #[test]
    fn test_outputs_use_published_identities() {
        let stack = hello_stack();
        let mut identities = Identities::default();
        identities.publish(
            ResourceId::api("hello-api"),
            Identity::new("abc").with_url("https://abc.execute-api.us-east-1.amazonaws.com/prod/"),
        );
        identities.publish(ResourceId::table("hello-table"), Identity::new("hello-table"));
        identities.publish(
            ResourceId::function("hello"),
            Identity::new("hello-hello").with_arn("arn:aws:lambda:us-east-1:1:function:hello-hello"),
        );

        let outputs = stack.outputs(&identities);

        assert_eq!(
            outputs["ApiUrl"],
            "https://abc.execute-api.us-east-1.amazonaws.com/prod/"
        );
        assert_eq!(outputs["HelloTableName"], "hello-table");
        assert_eq!(
            outputs["HelloFunctionArn"],
            "arn:aws:lambda:us-east-1:1:function:hello-hello"
        );
    }

    #[test]
    fn test_table_output_name() {
        assert_eq!(table_output_name("users"), "UsersTableName");
        assert_eq!(table_output_name("matching-table"), "MatchingTableName");
        assert_eq!(table_output_name("chat_room"), "ChatRoomTableName");
    }

    fn shipped(source: &str) -> Stack {
        Stack::from_config(&StackConfig::from_json(source).unwrap()).unwrap()
    }

    #[test]
    fn test_shipped_stacks_compile() {
        let hello = shipped(include_str!("../../../stacks/hello.json"));
        assert_eq!(hello.functions().len(), 1);
        assert!(hello.route_tree().get("/hello").unwrap().preflight().is_some());

        let matching = shipped(include_str!("../../../stacks/matching.json"));
        let role = &matching.roles()[0];
        let tables: Vec<&str> = role.granted_tables().collect();
        assert_eq!(tables, vec!["matching-table", "question-table", "recommend-table"]);
        assert_eq!(
            role.grants[0].actions.iter().copied().collect::<Vec<_>>(),
            TableAction::ALL.to_vec()
        );
        assert!(role.grants[1].actions.iter().all(|a| a.is_read()));
        assert!(matching.route_tree().get("/matching").unwrap().methods.is_empty());
        assert_eq!(
            matching
                .route_tree()
                .get("/matching/post")
                .unwrap()
                .preflight()
                .unwrap()
                .allowed_methods(),
            vec![HttpMethod::Options, HttpMethod::Post]
        );

        let consolidated = shipped(include_str!("../../../stacks/consolidated.json"));
        assert_eq!(
            consolidated
                .route_tree()
                .get("/matching")
                .unwrap()
                .preflight()
                .unwrap()
                .allowed_methods(),
            vec![HttpMethod::Options, HttpMethod::Get, HttpMethod::Post]
        );
    }
}
