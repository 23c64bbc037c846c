//! Rendering of bound grants into policy statements.

use serde::{Deserialize, Serialize};

use crate::descriptor::RoleDescriptor;

/// Actions of the baseline log delivery statement.
pub const LOG_DELIVERY_ACTIONS: [&str; 3] = [
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<String>,
}

/// Renders the role's statements. Each table grant is scoped to that table's
/// ARN only, looked up through `table_arn`.
///
/// Returns the name of the first table whose ARN is not known yet.
pub fn policy_statements<F>(role: &RoleDescriptor, table_arn: F) -> Result<Vec<PolicyStatement>, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut statements = Vec::with_capacity(role.grants.len() + 1);

    if role.log_delivery {
        statements.push(PolicyStatement {
            effect: Effect::Allow,
            actions: LOG_DELIVERY_ACTIONS.iter().map(|a| a.to_string()).collect(),
            resources: vec!["*".to_string()],
        });
    }

    for grant in &role.grants {
        let arn = table_arn(&grant.table).ok_or_else(|| grant.table.clone())?;
        statements.push(PolicyStatement {
            effect: Effect::Allow,
            actions: grant.actions.iter().map(|a| a.to_string()).collect(),
            resources: vec![arn],
        });
    }

    Ok(statements)
}
