//! Resource descriptor set: the declarative model of every table, role,
//! function and route a stack wants to exist.

mod actions;
mod builder;
mod config;
mod error;
mod types;

pub use actions::{AccessLevel, TableAction, UnknownAction};
pub use builder::{build_descriptor_set, default_env_name, MAX_TIMEOUT_SECONDS};
pub use config::{
    ApiConfig, Defaults, FunctionConfig, RoleConfig, RouteConfig, StackConfig, TableConfig,
    TableReferenceConfig, TargetConfig, DEFAULT_RUNTIME, DEFAULT_TIMEOUT_SECONDS,
};
pub use error::ConfigError;
pub use types::{
    ApiDescriptor, AttributeType, BillingMode, DescriptorSet, FunctionDescriptor, KeyAttribute,
    RemovalPolicy, ResourceId, ResourceKind, RoleDescriptor, TableBinding, TableDescriptor,
    TableGrant, FUNCTION_PRINCIPAL,
};
