mod error;
mod resolver;

pub use error::{CycleError, GraphError};
pub use resolver::{resolve_order, DependencyGraph, Node};
