use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::actions::TableAction;
use crate::routes::RouteDeclaration;

/// Service principal allowed to assume function execution roles.
pub const FUNCTION_PRINCIPAL: &str = "lambda.amazonaws.com";

/// The resource kinds a stack can declare.
///
/// The derived ordering is the kind precedence used to break ties when
/// resources are independent: tables, roles, functions, the API, then routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Role,
    Function,
    Api,
    Route,
}

impl ResourceKind {
    /// Returns the kind name used in resource identifiers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Table => "table",
            ResourceKind::Role => "role",
            ResourceKind::Function => "function",
            ResourceKind::Api => "api",
            ResourceKind::Route => "route",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical identity of a declared resource: its kind plus its name.
///
/// Routes are named by their full path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Table, name)
    }

    pub fn role(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Role, name)
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Function, name)
    }

    pub fn api(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Api, name)
    }

    pub fn route(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::Route, path)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// DynamoDB scalar attribute types usable in a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

impl AttributeType {
    /// Short DynamoDB notation (`S`, `N`, `B`).
    pub fn short_name(&self) -> &'static str {
        match self {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

/// A key attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Billing mode for the table. Tables are always on-demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    #[default]
    PayPerRequest,
}

/// What happens to a table when it leaves the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// The table is deleted together with the stack.
    Destroy,
    /// The table is left in place and only forgotten.
    #[default]
    Retain,
}

/// Desired state of a key-value table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub billing_mode: BillingMode,
    pub point_in_time_recovery: bool,
    pub ttl_attribute: Option<String>,
    pub removal_policy: RemovalPolicy,
}

impl TableDescriptor {
    pub fn id(&self) -> ResourceId {
        ResourceId::table(&self.name)
    }
}

/// Access to one table granted to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableGrant {
    pub table: String,
    pub actions: BTreeSet<TableAction>,
}

/// Desired state of an execution role.
///
/// `grants` is owned by the permission binder and is always recomputed from
/// the functions attached to the role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescriptor {
    pub name: String,
    pub principal: String,
    pub log_delivery: bool,
    pub grants: Vec<TableGrant>,
}

impl RoleDescriptor {
    pub fn id(&self) -> ResourceId {
        ResourceId::role(&self.name)
    }

    /// Tables this role is granted access to.
    pub fn granted_tables(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().map(|g| g.table.as_str())
    }
}

/// A table referenced by a function through an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBinding {
    pub table: String,
    /// Environment variable receiving the table's resolved name.
    pub env: String,
    pub actions: BTreeSet<TableAction>,
}

/// Desired state of a compute function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    /// Location of the code asset (directory or archive).
    pub code: String,
    /// Entry point inside the code asset, e.g. `list.lambda_handler`.
    pub handler: String,
    pub runtime: String,
    pub timeout_seconds: u32,
    pub role: String,
    pub tables: Vec<TableBinding>,
    pub variables: BTreeMap<String, String>,
}

impl FunctionDescriptor {
    pub fn id(&self) -> ResourceId {
        ResourceId::function(&self.name)
    }

    /// Names of every table this function references.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|b| b.table.as_str())
    }
}

/// Desired state of the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub name: String,
    pub stage: String,
}

impl ApiDescriptor {
    pub fn id(&self) -> ResourceId {
        ResourceId::api(&self.name)
    }
}

/// Validated, defaulted descriptors for one stack, before permission binding
/// and route tree construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSet {
    pub name: String,
    pub tables: Vec<TableDescriptor>,
    pub roles: Vec<RoleDescriptor>,
    pub functions: Vec<FunctionDescriptor>,
    pub api: Option<ApiDescriptor>,
    pub routes: Vec<RouteDeclaration>,
}

impl DescriptorSet {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display() {
        assert_eq!(ResourceId::table("users").to_string(), "table:users");
        assert_eq!(
            ResourceId::route("/matching/list").to_string(),
            "route:/matching/list"
        );
    }

    #[test]
    fn test_kind_precedence_order() {
        let mut kinds = vec![
            ResourceKind::Route,
            ResourceKind::Function,
            ResourceKind::Api,
            ResourceKind::Table,
            ResourceKind::Role,
        ];
        kinds.sort();
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
    }

    #[test]
    fn test_key_attribute_serializes_type_field() {
        let key = KeyAttribute::new("id", AttributeType::String);
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "id", "type": "string" }));
    }
}
