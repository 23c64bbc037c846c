//! Pure, deterministic construction of a [`DescriptorSet`] from configuration.

use std::collections::{BTreeSet, HashSet};

use super::actions::TableAction;
use super::config::{FunctionConfig, StackConfig, TableConfig, TableReferenceConfig, TargetConfig};
use super::error::ConfigError;
use super::types::{
    ApiDescriptor, BillingMode, DescriptorSet, FunctionDescriptor, KeyAttribute, ResourceId,
    ResourceKind, RoleDescriptor, TableBinding, TableDescriptor, FUNCTION_PRINCIPAL,
};
use crate::routes::{RouteDeclaration, RouteTarget};

/// Upper bound for function timeouts, in seconds.
pub const MAX_TIMEOUT_SECONDS: u32 = 900;

const MAX_NAME_LEN: usize = 64;
const MAX_TABLE_NAME_LEN: usize = 255;

/// Validates the configuration and builds the descriptor set.
///
/// Never performs I/O. The same input always yields an identical set.
pub fn build_descriptor_set(config: &StackConfig) -> Result<DescriptorSet, ConfigError> {
    validate_stack_name(&config.name)?;

    let tables = config
        .tables
        .iter()
        .map(build_table)
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique(ResourceKind::Table, tables.iter().map(|t| t.name.as_str()))?;

    let mut roles = Vec::with_capacity(config.roles.len());
    for role in &config.roles {
        let id = ResourceId::role(&role.name);
        validate_name(&id, "name", &role.name, MAX_NAME_LEN)?;
        roles.push(RoleDescriptor {
            name: role.name.clone(),
            principal: FUNCTION_PRINCIPAL.to_string(),
            log_delivery: role.log_delivery,
            grants: Vec::new(),
        });
    }
    ensure_unique(ResourceKind::Role, roles.iter().map(|r| r.name.as_str()))?;

    let table_names: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let role_names: HashSet<&str> = roles.iter().map(|r| r.name.as_str()).collect();

    let functions = config
        .functions
        .iter()
        .map(|f| build_function(f, config, &table_names, &role_names))
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique(
        ResourceKind::Function,
        functions.iter().map(|f| f.name.as_str()),
    )?;

    let function_names: HashSet<&str> = functions.iter().map(|f| f.name.as_str()).collect();

    let (api, routes) = match &config.api {
        Some(api) => {
            let id = ResourceId::api(&api.name);
            validate_name(&id, "name", &api.name, MAX_NAME_LEN)?;
            validate_name(&id, "stage", &api.stage, MAX_NAME_LEN)?;

            let mut routes = Vec::with_capacity(api.routes.len());
            for route in &api.routes {
                let target = match &route.target {
                    TargetConfig::Function(name) => {
                        if !function_names.contains(name.as_str()) {
                            return Err(ConfigError::UnknownReference {
                                resource: ResourceId::route(&route.path),
                                field: "target",
                                kind: ResourceKind::Function,
                                name: name.clone(),
                            });
                        }
                        RouteTarget::Function(name.clone())
                    }
                    TargetConfig::Preflight => RouteTarget::Preflight,
                };
                routes.push(RouteDeclaration {
                    path: route.path.clone(),
                    method: route.method,
                    target,
                });
            }

            let descriptor = ApiDescriptor {
                name: api.name.clone(),
                stage: api.stage.clone(),
            };
            (Some(descriptor), routes)
        }
        None => (None, Vec::new()),
    };

    Ok(DescriptorSet {
        name: config.name.clone(),
        tables,
        roles,
        functions,
        api,
        routes,
    })
}

fn build_table(config: &TableConfig) -> Result<TableDescriptor, ConfigError> {
    let id = ResourceId::table(&config.name);
    validate_name(&id, "name", &config.name, MAX_TABLE_NAME_LEN)?;
    if config.name.len() < 3 {
        return Err(ConfigError::invalid(
            id,
            "name",
            "table names need at least 3 characters",
        ));
    }

    validate_key(&id, "partition_key.name", &config.partition_key)?;
    if let Some(sort_key) = &config.sort_key {
        validate_key(&id, "sort_key.name", sort_key)?;
        if sort_key.name == config.partition_key.name {
            return Err(ConfigError::invalid(
                id,
                "sort_key.name",
                "sort key must differ from the partition key",
            ));
        }
    }

    if let Some(ttl) = &config.ttl_attribute {
        if ttl.trim().is_empty() {
            return Err(ConfigError::invalid(
                id,
                "ttl_attribute",
                "attribute name cannot be empty",
            ));
        }
    }

    Ok(TableDescriptor {
        name: config.name.clone(),
        partition_key: config.partition_key.clone(),
        sort_key: config.sort_key.clone(),
        billing_mode: BillingMode::PayPerRequest,
        point_in_time_recovery: config.point_in_time_recovery,
        ttl_attribute: config.ttl_attribute.clone(),
        removal_policy: config.removal_policy,
    })
}

fn validate_key(id: &ResourceId, field: &'static str, key: &KeyAttribute) -> Result<(), ConfigError> {
    if key.name.trim().is_empty() {
        return Err(ConfigError::invalid(
            id.clone(),
            field,
            "attribute name cannot be empty",
        ));
    }
    if key.name.len() > MAX_TABLE_NAME_LEN {
        return Err(ConfigError::invalid(
            id.clone(),
            field,
            "attribute name too long (max 255 characters)",
        ));
    }
    Ok(())
}

fn build_function(
    config: &FunctionConfig,
    stack: &StackConfig,
    tables: &HashSet<&str>,
    roles: &HashSet<&str>,
) -> Result<FunctionDescriptor, ConfigError> {
    let id = ResourceId::function(&config.name);
    validate_name(&id, "name", &config.name, MAX_NAME_LEN)?;

    if config.code.trim().is_empty() {
        return Err(ConfigError::invalid(id, "code", "code location cannot be empty"));
    }
    if config.handler.trim().is_empty() {
        return Err(ConfigError::invalid(id, "handler", "entry point cannot be empty"));
    }

    let runtime = config
        .runtime
        .clone()
        .unwrap_or_else(|| stack.defaults.runtime.clone());
    if runtime.trim().is_empty() {
        return Err(ConfigError::invalid(id, "runtime", "runtime cannot be empty"));
    }

    let timeout_seconds = config
        .timeout_seconds
        .unwrap_or(stack.defaults.timeout_seconds);
    if timeout_seconds == 0 || timeout_seconds > MAX_TIMEOUT_SECONDS {
        return Err(ConfigError::invalid(
            id,
            "timeout_seconds",
            format!("must be between 1 and {MAX_TIMEOUT_SECONDS} seconds, got {timeout_seconds}"),
        ));
    }

    let role = config
        .role
        .clone()
        .or_else(|| stack.defaults.role.clone())
        .ok_or_else(|| {
            ConfigError::invalid(id.clone(), "role", "no role declared and no default role set")
        })?;
    if !roles.contains(role.as_str()) {
        return Err(ConfigError::UnknownReference {
            resource: id,
            field: "role",
            kind: ResourceKind::Role,
            name: role,
        });
    }

    let mut env_names: HashSet<String> = HashSet::new();
    let mut seen_tables: HashSet<&str> = HashSet::new();
    let mut bindings = Vec::with_capacity(config.tables.len());

    for reference in &config.tables {
        if !tables.contains(reference.table.as_str()) {
            return Err(ConfigError::UnknownReference {
                resource: id,
                field: "tables",
                kind: ResourceKind::Table,
                name: reference.table.clone(),
            });
        }
        if !seen_tables.insert(reference.table.as_str()) {
            return Err(ConfigError::invalid(
                id,
                "tables",
                format!("table '{}' is referenced more than once", reference.table),
            ));
        }

        let actions = reference_actions(&id, reference)?;
        let env = reference
            .env
            .clone()
            .unwrap_or_else(|| default_env_name(&reference.table));
        validate_env_name(&id, &env)?;
        if !env_names.insert(env.clone()) {
            return Err(ConfigError::invalid(
                id,
                "tables.env",
                format!("environment variable {env} is bound more than once"),
            ));
        }

        bindings.push(TableBinding {
            table: reference.table.clone(),
            env,
            actions,
        });
    }

    for name in config.variables.keys() {
        validate_env_name(&id, name)?;
        if env_names.contains(name) {
            return Err(ConfigError::invalid(
                id,
                "variables",
                format!("environment variable {name} collides with a table binding"),
            ));
        }
    }

    Ok(FunctionDescriptor {
        name: config.name.clone(),
        code: config.code.clone(),
        handler: config.handler.clone(),
        runtime,
        timeout_seconds,
        role,
        tables: bindings,
        variables: config.variables.clone(),
    })
}

fn reference_actions(
    id: &ResourceId,
    reference: &TableReferenceConfig,
) -> Result<BTreeSet<TableAction>, ConfigError> {
    match (&reference.access, reference.actions.is_empty()) {
        (Some(_), false) => Err(ConfigError::invalid(
            id.clone(),
            "tables.actions",
            format!(
                "table '{}' sets both access and actions",
                reference.table
            ),
        )),
        (None, true) => Err(ConfigError::invalid(
            id.clone(),
            "tables.access",
            format!(
                "table '{}' needs an access level or an action list",
                reference.table
            ),
        )),
        (Some(access), true) => Ok(access.actions()),
        (None, false) => reference
            .actions
            .iter()
            .map(|name| {
                name.parse::<TableAction>().map_err(|_| {
                    ConfigError::invalid(
                        id.clone(),
                        "tables.actions",
                        format!("unknown action '{name}'"),
                    )
                })
            })
            .collect(),
    }
}

/// Default environment variable for a table binding.
///
/// `matching-table` becomes `MATCHING_TABLE_NAME`, `users` becomes
/// `USERS_TABLE_NAME`.
pub fn default_env_name(table: &str) -> String {
    let upper: String = table
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    let stem = upper.strip_suffix("_TABLE").unwrap_or(&upper);
    format!("{stem}_TABLE_NAME")
}

fn validate_name(
    id: &ResourceId,
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(id.clone(), field, "cannot be empty"));
    }
    if value.len() > max_len {
        return Err(ConfigError::invalid(
            id.clone(),
            field,
            format!("too long (max {max_len} characters)"),
        ));
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(ConfigError::invalid(
            id.clone(),
            field,
            format!("invalid character '{c}'"),
        ));
    }
    Ok(())
}

fn validate_stack_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.is_empty() {
        Some("cannot be empty".to_string())
    } else if name.len() > MAX_NAME_LEN {
        Some(format!("too long (max {MAX_NAME_LEN} characters)"))
    } else if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        Some("must start with a letter".to_string())
    } else {
        name.chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
            .map(|c| format!("invalid character '{c}'"))
    };
    match reason {
        Some(reason) => Err(ConfigError::InvalidStackName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_env_name(id: &ResourceId, name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            id.clone(),
            "env",
            format!("'{name}' is not a valid environment variable name"),
        ))
    }
}

fn ensure_unique<'a>(
    kind: ResourceKind,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::Duplicate {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
