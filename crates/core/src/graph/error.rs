use thiserror::Error;

use crate::descriptor::ResourceId;

/// The dependency graph is not acyclic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Dependency cycle detected: {}", format_cycle(.cycle))]
pub struct CycleError {
    /// Resources along the cycle; the first element depends on the second
    /// and so on, the last depends on the first.
    pub cycle: Vec<ResourceId>,
}

fn format_cycle(cycle: &[ResourceId]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

/// Errors produced while ordering resources.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(transparent)]
    Cycle(#[from] CycleError),
    #[error("{resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },
    #[error("Resource {0} is declared more than once")]
    DuplicateNode(ResourceId),
}
