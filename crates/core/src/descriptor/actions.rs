use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Item-level DynamoDB actions a function may be granted on a table.
///
/// The declaration order is the order actions appear in policy statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableAction {
    #[serde(rename = "dynamodb:PutItem")]
    PutItem,
    #[serde(rename = "dynamodb:GetItem")]
    GetItem,
    #[serde(rename = "dynamodb:UpdateItem")]
    UpdateItem,
    #[serde(rename = "dynamodb:DeleteItem")]
    DeleteItem,
    #[serde(rename = "dynamodb:BatchGetItem")]
    BatchGetItem,
    #[serde(rename = "dynamodb:BatchWriteItem")]
    BatchWriteItem,
    #[serde(rename = "dynamodb:ConditionCheckItem")]
    ConditionCheckItem,
    #[serde(rename = "dynamodb:Query")]
    Query,
    #[serde(rename = "dynamodb:Scan")]
    Scan,
}

impl TableAction {
    pub const ALL: [TableAction; 9] = [
        TableAction::PutItem,
        TableAction::GetItem,
        TableAction::UpdateItem,
        TableAction::DeleteItem,
        TableAction::BatchGetItem,
        TableAction::BatchWriteItem,
        TableAction::ConditionCheckItem,
        TableAction::Query,
        TableAction::Scan,
    ];

    /// The IAM action string, e.g. `dynamodb:GetItem`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableAction::PutItem => "dynamodb:PutItem",
            TableAction::GetItem => "dynamodb:GetItem",
            TableAction::UpdateItem => "dynamodb:UpdateItem",
            TableAction::DeleteItem => "dynamodb:DeleteItem",
            TableAction::BatchGetItem => "dynamodb:BatchGetItem",
            TableAction::BatchWriteItem => "dynamodb:BatchWriteItem",
            TableAction::ConditionCheckItem => "dynamodb:ConditionCheckItem",
            TableAction::Query => "dynamodb:Query",
            TableAction::Scan => "dynamodb:Scan",
        }
    }

    /// Returns true if the action only reads data.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            TableAction::GetItem
                | TableAction::BatchGetItem
                | TableAction::ConditionCheckItem
                | TableAction::Query
                | TableAction::Scan
        )
    }
}

impl fmt::Display for TableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an action name is not a known table action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl FromStr for TableAction {
    type Err = UnknownAction;

    /// Accepts both `dynamodb:GetItem` and the bare `GetItem`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.strip_prefix("dynamodb:").unwrap_or(s);
        TableAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().trim_start_matches("dynamodb:") == bare)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Access presets a function can request on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    ReadWrite,
}

impl AccessLevel {
    /// Expands the preset into its action set.
    pub fn actions(&self) -> BTreeSet<TableAction> {
        TableAction::ALL
            .iter()
            .copied()
            .filter(|a| match self {
                AccessLevel::Read => a.is_read(),
                AccessLevel::Write => !a.is_read(),
                AccessLevel::ReadWrite => true,
            })
            .collect()
    }
}
