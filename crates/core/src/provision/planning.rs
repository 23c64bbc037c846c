//! Pure functions for calculating change plans (Functional Core).

use super::resource::ResourceSpec;
use super::state::AppliedState;
use crate::descriptor::{RemovalPolicy, ResourceId, ResourceKind};
use crate::stack::Stack;

/// What applying a declared resource will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Not in the applied state.
    Create,
    /// Mutable fields differ, updated in place.
    Update { fields: Vec<String> },
    /// Identical to the applied spec, no call is issued.
    Unchanged,
    /// Immutable fields differ. Never applied implicitly.
    Replace { fields: Vec<String> },
}

impl Change {
    pub fn symbol(&self) -> char {
        match self {
            Change::Create => '+',
            Change::Update { .. } => '~',
            Change::Unchanged => '=',
            Change::Replace { .. } => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub id: ResourceId,
    pub change: Change,
}

/// A resource in the applied state that is no longer declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub id: ResourceId,
    /// Tables with a retain policy are forgotten, never deleted.
    pub retain: bool,
}

impl Removal {
    fn of(spec: &ResourceSpec) -> Self {
        let retain = matches!(
            spec,
            ResourceSpec::Table(table) if table.removal_policy == RemovalPolicy::Retain
        );
        Self {
            id: spec.id(),
            retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub stack: String,
    /// Declared resources in dependency order.
    pub changes: Vec<PlannedChange>,
    /// Orphans in reverse dependency order.
    pub removals: Vec<Removal>,
}

impl Plan {
    pub fn change(&self, id: &ResourceId) -> Option<&Change> {
        self.changes.iter().find(|c| &c.id == id).map(|c| &c.change)
    }

    /// True when applying would issue at least one call.
    pub fn has_changes(&self) -> bool {
        !self.removals.is_empty()
            || self
                .changes
                .iter()
                .any(|c| !matches!(c.change, Change::Unchanged))
    }

    pub fn replacements(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes
            .iter()
            .filter(|c| matches!(c.change, Change::Replace { .. }))
    }
}

/// Pure function: compare an applied spec against the declared one.
pub fn diff_spec(applied: &ResourceSpec, declared: &ResourceSpec) -> Change {
    let mut mutable: Vec<&str> = Vec::new();
    let mut immutable: Vec<&str> = Vec::new();

    macro_rules! compare {
        ($list:ident, $a:expr, $b:expr, $($field:ident),+) => {
            $(if $a.$field != $b.$field {
                $list.push(stringify!($field));
            })+
        };
    }

    match (applied, declared) {
        (ResourceSpec::Table(a), ResourceSpec::Table(b)) => {
            compare!(immutable, a, b, name, partition_key, sort_key);
            compare!(
                mutable,
                a,
                b,
                billing_mode,
                point_in_time_recovery,
                ttl_attribute,
                removal_policy
            );
        }
        (ResourceSpec::Role(a), ResourceSpec::Role(b)) => {
            compare!(mutable, a, b, principal, log_delivery, grants);
        }
        (ResourceSpec::Function(a), ResourceSpec::Function(b)) => {
            compare!(
                mutable,
                a,
                b,
                code,
                handler,
                runtime,
                timeout_seconds,
                role,
                tables,
                variables
            );
        }
        (ResourceSpec::Api(a), ResourceSpec::Api(b)) => {
            compare!(mutable, a, b, stage);
        }
        (ResourceSpec::Route(a), ResourceSpec::Route(b)) => {
            compare!(immutable, a, b, api, parent);
            compare!(mutable, a, b, methods);
        }
        _ => immutable.push("kind"),
    }

    let owned = |fields: Vec<&str>| -> Vec<String> {
        fields.into_iter().map(str::to_string).collect()
    };
    if !immutable.is_empty() {
        Change::Replace {
            fields: owned(immutable),
        }
    } else if !mutable.is_empty() {
        Change::Update {
            fields: owned(mutable),
        }
    } else {
        Change::Unchanged
    }
}

/// Pure function: classify every declared resource against the applied state
/// and list the orphans.
pub fn plan_changes(stack: &Stack, state: &AppliedState) -> Plan {
    let changes = stack
        .resources()
        .iter()
        .map(|spec| {
            let id = spec.id();
            let change = match state.get(&id) {
                Some(applied) => diff_spec(&applied.spec, spec),
                None => Change::Create,
            };
            PlannedChange { id, change }
        })
        .collect();

    let removals = state
        .resources
        .iter()
        .rev()
        .filter(|applied| stack.resource(&applied.id).is_none())
        .map(|applied| Removal::of(&applied.spec))
        .collect();

    Plan {
        stack: stack.name().to_string(),
        changes,
        removals,
    }
}

/// Pure function: every applied resource, in reverse dependency order.
pub fn plan_destroy(state: &AppliedState) -> Vec<Removal> {
    state
        .resources
        .iter()
        .rev()
        .map(|applied| Removal::of(&applied.spec))
        .collect()
}

/// Pure function: format a plan for display.
pub fn format_plan(plan: &Plan) -> Vec<String> {
    let mut lines = Vec::with_capacity(plan.changes.len() + plan.removals.len());

    for planned in &plan.changes {
        let symbol = planned.change.symbol();
        let line = match &planned.change {
            Change::Create => format!("{symbol} Create {}", planned.id),
            Change::Update { fields } => {
                format!("{symbol} Update {} ({})", planned.id, fields.join(", "))
            }
            Change::Unchanged => format!("{symbol} {} is up to date", planned.id),
            Change::Replace { fields } => format!(
                "{symbol} Replace {} (immutable: {}), requires explicit replacement",
                planned.id,
                fields.join(", ")
            ),
        };
        lines.push(line);
    }

    lines.extend(format_removals(&plan.removals));
    lines
}

/// Pure function: format removals for display.
pub fn format_removals(removals: &[Removal]) -> Vec<String> {
    removals
        .iter()
        .map(|removal| {
            if removal.retain {
                format!("- Forget {} (retained, data is kept)", removal.id)
            } else if removal.id.kind == ResourceKind::Table {
                format!("- Delete {} (ALL DATA WILL BE LOST)", removal.id)
            } else {
                format!("- Delete {}", removal.id)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AttributeType, StackConfig};
    use crate::provision::{AppliedResource, Identity};
    use chrono::Utc;

    fn stack(json: serde_json::Value) -> Stack {
        Stack::from_config(&StackConfig::from_json(&json.to_string()).unwrap()).unwrap()
    }

    fn config(key_type: &str) -> serde_json::Value {
        serde_json::json!({
            "name": "demo",
            "defaults": { "role": "exec" },
            "tables": [
                {
                    "name": "users",
                    "partition_key": { "name": "id", "type": key_type },
                    "removal_policy": "destroy"
                }
            ],
            "roles": [ { "name": "exec" } ],
            "functions": [
                {
                    "name": "hello",
                    "code": "lambda",
                    "handler": "hello.handler",
                    "tables": [ { "table": "users", "access": "read" } ]
                }
            ],
            "api": {
                "name": "demo-api",
                "routes": [
                    { "path": "/hello", "method": "GET", "target": { "function": "hello" } }
                ]
            }
        })
    }

    fn applied(stack: &Stack) -> AppliedState {
        let mut state = AppliedState::empty(stack.name());
        for spec in stack.resources() {
            state.resources.push(AppliedResource {
                id: spec.id(),
                spec: spec.clone(),
                identity: Identity::new(spec.id().name),
                applied_at: Utc::now(),
            });
        }
        state
    }

    #[test]
    fn test_everything_is_created_from_empty_state() {
        let stack = stack(config("string"));
        let plan = plan_changes(&stack, &AppliedState::empty("demo"));

        assert_eq!(plan.changes.len(), stack.resources().len());
        assert!(plan.changes.iter().all(|c| c.change == Change::Create));
        assert!(plan.removals.is_empty());
        assert!(plan.has_changes());
    }

    #[test]
    fn test_same_configuration_is_unchanged() {
        let stack = stack(config("string"));
        let plan = plan_changes(&stack, &applied(&stack));

        assert!(plan.changes.iter().all(|c| c.change == Change::Unchanged));
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_partition_key_type_change_requires_replacement() {
        let before = stack(config("string"));
        let after = stack(config("number"));

        let plan = plan_changes(&after, &applied(&before));

        assert_eq!(
            plan.change(&ResourceId::table("users")),
            Some(&Change::Replace {
                fields: vec!["partition_key".to_string()]
            })
        );
        assert_eq!(
            after.tables()[0].partition_key.attribute_type,
            AttributeType::Number
        );
        assert_eq!(plan.replacements().count(), 1);
    }

    #[test]
    fn test_retention_change_is_an_update() {
        let before = stack(config("string"));
        let mut value = config("string");
        value["tables"][0]["point_in_time_recovery"] = serde_json::json!(true);
        let after = stack(value);

        let plan = plan_changes(&after, &applied(&before));

        assert_eq!(
            plan.change(&ResourceId::table("users")),
            Some(&Change::Update {
                fields: vec!["point_in_time_recovery".to_string()]
            })
        );
    }

    #[test]
    fn test_access_change_updates_role_and_function() {
        let before = stack(config("string"));
        let mut value = config("string");
        value["functions"][0]["tables"][0]["access"] = serde_json::json!("read_write");
        let after = stack(value);

        let plan = plan_changes(&after, &applied(&before));

        assert_eq!(
            plan.change(&ResourceId::role("exec")),
            Some(&Change::Update {
                fields: vec!["grants".to_string()]
            })
        );
        assert_eq!(
            plan.change(&ResourceId::function("hello")),
            Some(&Change::Update {
                fields: vec!["tables".to_string()]
            })
        );
    }

    #[test]
    fn test_orphans_are_listed_in_reverse_order() {
        let before = stack(config("string"));
        let mut value = config("string");
        value["api"] = serde_json::Value::Null;
        let after = stack(value);

        let plan = plan_changes(&after, &applied(&before));

        let removed: Vec<ResourceId> = plan.removals.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            removed,
            vec![ResourceId::route("/hello"), ResourceId::api("demo-api")]
        );
    }

    #[test]
    fn test_destroy_honours_retain_policy() {
        let mut value = config("string");
        value["tables"][0]["removal_policy"] = serde_json::json!("retain");
        let stack = stack(value);

        let removals = plan_destroy(&applied(&stack));

        assert_eq!(removals.last().unwrap().id, ResourceId::table("users"));
        assert!(removals.last().unwrap().retain);
        assert!(removals[..removals.len() - 1].iter().all(|r| !r.retain));
        assert_eq!(
            format_removals(&removals).last().unwrap(),
            "- Forget table:users (retained, data is kept)"
        );
    }

    #[test]
    fn test_format_plan_prefixes() {
        let plan = Plan {
            stack: "demo".to_string(),
            changes: vec![
                PlannedChange {
                    id: ResourceId::table("users"),
                    change: Change::Create,
                },
                PlannedChange {
                    id: ResourceId::role("exec"),
                    change: Change::Update {
                        fields: vec!["grants".to_string()],
                    },
                },
                PlannedChange {
                    id: ResourceId::function("hello"),
                    change: Change::Unchanged,
                },
                PlannedChange {
                    id: ResourceId::table("events"),
                    change: Change::Replace {
                        fields: vec!["sort_key".to_string()],
                    },
                },
            ],
            removals: vec![Removal {
                id: ResourceId::table("old"),
                retain: false,
            }],
        };

        assert_eq!(
            format_plan(&plan),
            vec![
                "+ Create table:users",
                "~ Update role:exec (grants)",
                "= function:hello is up to date",
                "! Replace table:events (immutable: sort_key), requires explicit replacement",
                "- Delete table:old (ALL DATA WILL BE LOST)",
            ]
        );
    }
}
