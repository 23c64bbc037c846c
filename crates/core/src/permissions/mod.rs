//! Permission binder: least-privilege grants per role, derived from the
//! functions attached to it.

mod binder;
mod policy;

pub use binder::{bind_permissions, implied_grants};
pub use policy::{policy_statements, Effect, PolicyStatement, LOG_DELIVERY_ACTIONS};
