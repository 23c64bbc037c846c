pub mod descriptor;
pub mod graph;
pub mod permissions;
pub mod provision;
pub mod routes;
pub mod stack;

pub use stack::{Stack, StackError};
