use thiserror::Error;

use crate::descriptor::ResourceId;

/// Failure reported by a control plane call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Throttling, temporary unavailability. The call may be retried.
    #[error("Transient provider error: {0}")]
    Transient(String),
    /// Validation or authorization failures. Retrying will not help.
    #[error("Provider error: {0}")]
    Fatal(String),
}

/// Why a resource could not be brought to the declared shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("{resource} requires replacement, immutable fields changed: {}", .fields.join(", "))]
    ReplacementRequired {
        resource: ResourceId,
        fields: Vec<String>,
    },
    #[error("{resource} references {dependency} which has no published identity")]
    UnresolvedReference {
        resource: ResourceId,
        dependency: ResourceId,
    },
    #[error("{resource} failed after {attempts} attempt(s): {source}")]
    Provider {
        resource: ResourceId,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    #[error("{resource} task aborted: {reason}")]
    Aborted { resource: ResourceId, reason: String },
}

/// Result type for control plane operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(
            ProviderError::Transient("throttled".to_string()).to_string(),
            "Transient provider error: throttled"
        );
        assert_eq!(
            ProviderError::Fatal("access denied".to_string()).to_string(),
            "Provider error: access denied"
        );
    }

    #[test]
    fn test_replacement_required_display_lists_fields() {
        let error = ApplyError::ReplacementRequired {
            resource: ResourceId::table("users"),
            fields: vec!["partition_key".to_string(), "sort_key".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "table:users requires replacement, immutable fields changed: partition_key, sort_key"
        );
    }

    #[test]
    fn test_provider_failure_display_includes_attempts() {
        let error = ApplyError::Provider {
            resource: ResourceId::function("hello"),
            attempts: 3,
            source: ProviderError::Transient("throttled".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "function:hello failed after 3 attempt(s): Transient provider error: throttled"
        );
    }

    #[test]
    fn test_unresolved_reference_display() {
        let error = ApplyError::UnresolvedReference {
            resource: ResourceId::function("hello"),
            dependency: ResourceId::role("exec"),
        };
        assert_eq!(
            error.to_string(),
            "function:hello references role:exec which has no published identity"
        );
    }
}
