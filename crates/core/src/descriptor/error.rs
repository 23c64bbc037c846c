use thiserror::Error;

use super::types::{ResourceId, ResourceKind};
use crate::routes::HttpMethod;

/// Invalid stack configuration, detected before any provisioning call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse stack configuration: {0}")]
    Parse(String),
    #[error("Invalid stack name '{name}': {reason}")]
    InvalidStackName { name: String, reason: String },
    #[error("Invalid {field} on {resource}: {reason}")]
    InvalidField {
        resource: ResourceId,
        field: &'static str,
        reason: String,
    },
    #[error("Duplicate {kind} name: {name}")]
    Duplicate { kind: ResourceKind, name: String },
    #[error("{resource} references unknown {kind} '{name}' in {field}")]
    UnknownReference {
        resource: ResourceId,
        field: &'static str,
        kind: ResourceKind,
        name: String,
    },
    #[error("Invalid route path '{path}': {reason}")]
    InvalidRoutePath { path: String, reason: String },
    #[error("Method {method} is declared more than once on route {path}")]
    DuplicateMethod { path: String, method: HttpMethod },
    #[error("Route {path} binds OPTIONS to function '{function}', which conflicts with its preflight response")]
    PreflightConflict { path: String, function: String },
}

impl ConfigError {
    pub(crate) fn invalid(
        resource: ResourceId,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidField {
            resource,
            field,
            reason: reason.into(),
        }
    }
}
