use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::{FunctionDescriptor, RoleDescriptor, TableAction, TableGrant};

/// Grants implied for `role` by the functions that assume it: one grant per
/// referenced table, carrying the union of the actions those functions
/// declared for it. Grants are ordered by table name.
pub fn implied_grants(role: &str, functions: &[FunctionDescriptor]) -> Vec<TableGrant> {
    let mut by_table: BTreeMap<&str, BTreeSet<TableAction>> = BTreeMap::new();

    for function in functions.iter().filter(|f| f.role == role) {
        for binding in &function.tables {
            by_table
                .entry(binding.table.as_str())
                .or_default()
                .extend(binding.actions.iter().copied());
        }
    }

    by_table
        .into_iter()
        .filter(|(_, actions)| !actions.is_empty())
        .map(|(table, actions)| TableGrant {
            table: table.to_string(),
            actions,
        })
        .collect()
}

/// Recomputes the grants of every role from scratch.
///
/// Existing grants are discarded, so removing a table reference from a
/// function removes the grant on the next run.
pub fn bind_permissions(
    roles: &[RoleDescriptor],
    functions: &[FunctionDescriptor],
) -> Vec<RoleDescriptor> {
    roles
        .iter()
        .map(|role| {
            let grants = implied_grants(&role.name, functions);
            if grants.is_empty() {
                tracing::debug!(role = %role.name, "role has no table grants");
            }
            RoleDescriptor {
                grants,
                ..role.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AccessLevel, TableBinding, FUNCTION_PRINCIPAL};
    use std::collections::BTreeMap;

    fn role(name: &str) -> RoleDescriptor {
        RoleDescriptor {
            name: name.to_string(),
            principal: FUNCTION_PRINCIPAL.to_string(),
            log_delivery: true,
            grants: Vec::new(),
        }
    }

    fn function(name: &str, role: &str, tables: &[(&str, AccessLevel)]) -> FunctionDescriptor {
        FunctionDescriptor {
            name: name.to_string(),
            code: "lambda".to_string(),
            handler: format!("{name}.lambda_handler"),
            runtime: "python3.11".to_string(),
            timeout_seconds: 30,
            role: role.to_string(),
            tables: tables
                .iter()
                .map(|(table, access)| TableBinding {
                    table: table.to_string(),
                    env: format!("{}_TABLE_NAME", table.to_uppercase()),
                    actions: access.actions(),
                })
                .collect(),
            variables: BTreeMap::new(),
        }
    }

    #[test]
    fn test_two_functions_sharing_role_get_one_grant_per_table() {
        let functions = vec![
            function("reader", "exec", &[("questions", AccessLevel::Read)]),
            function("writer", "exec", &[("answers", AccessLevel::ReadWrite)]),
        ];

        let roles = bind_permissions(&[role("exec")], &functions);
        let grants = &roles[0].grants;

        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].table, "answers");
        assert_eq!(grants[0].actions, AccessLevel::ReadWrite.actions());
        assert_eq!(grants[1].table, "questions");
        assert_eq!(grants[1].actions, AccessLevel::Read.actions());
    }

    #[test]
    fn test_actions_on_shared_table_are_unioned() {
        let functions = vec![
            function("reader", "exec", &[("items", AccessLevel::Read)]),
            function("writer", "exec", &[("items", AccessLevel::Write)]),
        ];

        let grants = implied_grants("exec", &functions);

        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].actions, AccessLevel::ReadWrite.actions());
    }

    #[test]
    fn test_grants_are_scoped_to_owning_role() {
        let functions = vec![
            function("a", "role-a", &[("one", AccessLevel::Read)]),
            function("b", "role-b", &[("two", AccessLevel::Write)]),
        ];

        let roles = bind_permissions(&[role("role-a"), role("role-b")], &functions);

        assert_eq!(roles[0].granted_tables().collect::<Vec<_>>(), vec!["one"]);
        assert_eq!(roles[1].granted_tables().collect::<Vec<_>>(), vec!["two"]);
    }

    #[test]
    fn test_stale_grants_are_dropped() {
        let mut stale = role("exec");
        stale.grants = vec![TableGrant {
            table: "old".to_string(),
            actions: AccessLevel::ReadWrite.actions(),
        }];
        let functions = vec![function("f", "exec", &[("new", AccessLevel::Read)])];

        let roles = bind_permissions(&[stale], &functions);

        assert_eq!(roles[0].granted_tables().collect::<Vec<_>>(), vec!["new"]);
    }

    #[test]
    fn test_binding_is_idempotent() {
        let functions = vec![function("f", "exec", &[("items", AccessLevel::Read)])];

        let once = bind_permissions(&[role("exec")], &functions);
        let twice = bind_permissions(&once, &functions);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_role_without_functions_has_no_grants() {
        let roles = bind_permissions(&[role("idle")], &[]);
        assert!(roles[0].grants.is_empty());
    }
}
