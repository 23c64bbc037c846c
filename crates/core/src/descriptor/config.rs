//! Stack configuration input (pure data, deserialized from the stack file).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::actions::AccessLevel;
use super::error::ConfigError;
use super::types::{KeyAttribute, RemovalPolicy};
use crate::routes::HttpMethod;

/// Runtime used when neither the function nor the defaults name one.
pub const DEFAULT_RUNTIME: &str = "python3.11";

/// Function timeout used when neither the function nor the defaults set one.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;

/// Top-level stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    pub name: String,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

impl StackConfig {
    /// Parses a stack configuration from JSON.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Global defaults applied to every function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Role assumed by functions that do not name one.
    #[serde(default)]
    pub role: Option<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            timeout_seconds: default_timeout(),
            role: None,
        }
    }
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.to_string()
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,
    pub partition_key: KeyAttribute,
    #[serde(default)]
    pub sort_key: Option<KeyAttribute>,
    #[serde(default)]
    pub point_in_time_recovery: bool,
    #[serde(default)]
    pub ttl_attribute: Option<String>,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub name: String,
    /// Attach the baseline log delivery statement.
    #[serde(default = "default_true")]
    pub log_delivery: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
    pub name: String,
    pub code: String,
    pub handler: String,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u32>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableReferenceConfig>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// A function's reference to a table. Exactly one of `access` or `actions`
/// must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableReferenceConfig {
    pub table: String,
    #[serde(default)]
    pub access: Option<AccessLevel>,
    #[serde(default)]
    pub actions: Vec<String>,
    /// Environment variable name; defaults to `<TABLE>_TABLE_NAME`.
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    pub name: String,
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_stage() -> String {
    "prod".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub path: String,
    pub method: HttpMethod,
    pub target: TargetConfig,
}

/// What a route method is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetConfig {
    /// A real integration invoking the named function.
    Function(String),
    /// The fixed cross-origin preflight response.
    Preflight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = StackConfig::from_json(r#"{ "name": "hello" }"#).unwrap();

        assert_eq!(config.defaults.runtime, "python3.11");
        assert_eq!(config.defaults.timeout_seconds, 30);
        assert!(config.tables.is_empty());
        assert!(config.api.is_none());
    }

    #[test]
    fn test_route_targets_parse() {
        let config = StackConfig::from_json(
            r#"{
                "name": "s",
                "api": {
                    "name": "api",
                    "routes": [
                        { "path": "/hello", "method": "GET", "target": { "function": "hello" } },
                        { "path": "/hello", "method": "OPTIONS", "target": "preflight" }
                    ]
                }
            }"#,
        )
        .unwrap();

        let api = config.api.unwrap();
        assert_eq!(api.stage, "prod");
        assert_eq!(
            api.routes[0].target,
            TargetConfig::Function("hello".to_string())
        );
        assert_eq!(api.routes[1].target, TargetConfig::Preflight);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = StackConfig::from_json(r#"{ "name": "s", "tabels": [] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_role_log_delivery_defaults_to_true() {
        let config =
            StackConfig::from_json(r#"{ "name": "s", "roles": [{ "name": "exec" }] }"#).unwrap();
        assert!(config.roles[0].log_delivery);
    }
}
