//! DynamoDB table operations (Imperative Shell) and table drift detection
//! (Functional Core).

use std::time::Duration;

use aws_sdk_dynamodb::operation::delete_table::DeleteTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode as SdkBillingMode, KeySchemaElement, KeyType,
    PointInTimeRecoverySpecification, PointInTimeRecoveryStatus, ScalarAttributeType,
    TableDescription, TableStatus, TimeToLiveSpecification, TimeToLiveStatus,
};
use aws_sdk_dynamodb::Client;
use stackplan_core::descriptor::{AttributeType, KeyAttribute, TableDescriptor};
use stackplan_core::provision::{ProviderError, Result};

use super::error::{map_build_error, map_sdk_error};

const ACTIVE_POLL_ATTEMPTS: u32 = 60;
const ACTIVE_POLL_DELAY: Duration = Duration::from_secs(2);

/// What DynamoDB reports about an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTable {
    pub arn: Option<String>,
    pub active: bool,
    pub partition_key: Option<KeyAttribute>,
    pub sort_key: Option<KeyAttribute>,
    pub on_demand: bool,
}

impl CurrentTable {
    pub fn from_description(table: &TableDescription) -> Self {
        let key = |key_type: KeyType| {
            table
                .key_schema()
                .iter()
                .find(|k| k.key_type() == &key_type)
                .map(|k| {
                    let name = k.attribute_name();
                    let attribute_type = table
                        .attribute_definitions()
                        .iter()
                        .find(|d| d.attribute_name() == name)
                        .map(|d| from_scalar_type(d.attribute_type()))
                        .unwrap_or(AttributeType::String);
                    KeyAttribute::new(name, attribute_type)
                })
        };

        Self {
            arn: table.table_arn().map(str::to_string),
            active: matches!(table.table_status(), Some(TableStatus::Active)),
            partition_key: key(KeyType::Hash),
            sort_key: key(KeyType::Range),
            on_demand: matches!(
                table
                    .billing_mode_summary()
                    .and_then(|summary| summary.billing_mode()),
                Some(SdkBillingMode::PayPerRequest)
            ),
        }
    }

    /// True when the key schema differs from the declared one, which DynamoDB
    /// cannot change in place.
    pub fn requires_replacement(&self, declared: &TableDescriptor) -> bool {
        self.partition_key.as_ref() != Some(&declared.partition_key)
            || self.sort_key != declared.sort_key
    }
}

fn to_scalar_type(attribute_type: AttributeType) -> ScalarAttributeType {
    match attribute_type {
        AttributeType::String => ScalarAttributeType::S,
        AttributeType::Number => ScalarAttributeType::N,
        AttributeType::Binary => ScalarAttributeType::B,
    }
}

fn from_scalar_type(scalar: &ScalarAttributeType) -> AttributeType {
    match scalar {
        ScalarAttributeType::N => AttributeType::Number,
        ScalarAttributeType::B => AttributeType::Binary,
        _ => AttributeType::String,
    }
}

/// Fetches current table state, returns None if the table doesn't exist.
pub async fn describe_table(client: &Client, table_name: &str) -> Result<Option<CurrentTable>> {
    match client.describe_table().table_name(table_name).send().await {
        Ok(response) => Ok(response.table().map(CurrentTable::from_description)),
        Err(err)
            if matches!(
                err.as_service_error(),
                Some(DescribeTableError::ResourceNotFoundException(_))
            ) =>
        {
            Ok(None)
        }
        Err(err) => Err(map_sdk_error(err, "DescribeTable")),
    }
}

pub async fn create_table(client: &Client, table: &TableDescriptor) -> Result<()> {
    let mut keys = vec![(&table.partition_key, KeyType::Hash)];
    if let Some(sort_key) = &table.sort_key {
        keys.push((sort_key, KeyType::Range));
    }

    let mut key_schema = Vec::with_capacity(keys.len());
    let mut attribute_definitions = Vec::with_capacity(keys.len());
    for (key, key_type) in keys {
        key_schema.push(
            KeySchemaElement::builder()
                .attribute_name(&key.name)
                .key_type(key_type)
                .build()
                .map_err(map_build_error)?,
        );
        attribute_definitions.push(
            AttributeDefinition::builder()
                .attribute_name(&key.name)
                .attribute_type(to_scalar_type(key.attribute_type))
                .build()
                .map_err(map_build_error)?,
        );
    }

    client
        .create_table()
        .table_name(&table.name)
        .set_key_schema(Some(key_schema))
        .set_attribute_definitions(Some(attribute_definitions))
        .billing_mode(SdkBillingMode::PayPerRequest)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "CreateTable"))?;
    Ok(())
}

pub async fn switch_to_on_demand(client: &Client, table_name: &str) -> Result<()> {
    client
        .update_table()
        .table_name(table_name)
        .billing_mode(SdkBillingMode::PayPerRequest)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "UpdateTable"))?;
    Ok(())
}

/// Enables or disables point-in-time recovery. Returns true when it changed.
pub async fn sync_recovery(client: &Client, table: &TableDescriptor) -> Result<bool> {
    let response = client
        .describe_continuous_backups()
        .table_name(&table.name)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "DescribeContinuousBackups"))?;

    let enabled = matches!(
        response
            .continuous_backups_description()
            .and_then(|d| d.point_in_time_recovery_description())
            .and_then(|d| d.point_in_time_recovery_status()),
        Some(PointInTimeRecoveryStatus::Enabled)
    );
    if enabled == table.point_in_time_recovery {
        return Ok(false);
    }

    client
        .update_continuous_backups()
        .table_name(&table.name)
        .point_in_time_recovery_specification(
            PointInTimeRecoverySpecification::builder()
                .point_in_time_recovery_enabled(table.point_in_time_recovery)
                .build()
                .map_err(map_build_error)?,
        )
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "UpdateContinuousBackups"))?;
    Ok(true)
}

/// Points the time-to-live setting at the declared attribute. Returns true
/// when it changed.
pub async fn sync_ttl(client: &Client, table: &TableDescriptor) -> Result<bool> {
    let response = client
        .describe_time_to_live()
        .table_name(&table.name)
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "DescribeTimeToLive"))?;

    let current = response.time_to_live_description().and_then(|d| {
        match d.time_to_live_status() {
            Some(TimeToLiveStatus::Enabled) | Some(TimeToLiveStatus::Enabling) => {
                d.attribute_name().map(str::to_string)
            }
            _ => None,
        }
    });
    if current == table.ttl_attribute {
        return Ok(false);
    }

    // Only one attribute can be enabled, so a rename disables the old one first.
    if let Some(attribute) = &current {
        update_ttl(client, &table.name, attribute, false).await?;
    }
    if let Some(attribute) = &table.ttl_attribute {
        update_ttl(client, &table.name, attribute, true).await?;
    }
    Ok(true)
}

async fn update_ttl(
    client: &Client,
    table_name: &str,
    attribute: &str,
    enabled: bool,
) -> Result<()> {
    client
        .update_time_to_live()
        .table_name(table_name)
        .time_to_live_specification(
            TimeToLiveSpecification::builder()
                .attribute_name(attribute)
                .enabled(enabled)
                .build()
                .map_err(map_build_error)?,
        )
        .send()
        .await
        .map_err(|e| map_sdk_error(e, "UpdateTimeToLive"))?;
    Ok(())
}

/// Deletes a table. Deleting a missing table succeeds.
pub async fn delete_table(client: &Client, table_name: &str) -> Result<()> {
    match client.delete_table().table_name(table_name).send().await {
        Ok(_) => Ok(()),
        Err(err)
            if matches!(
                err.as_service_error(),
                Some(DeleteTableError::ResourceNotFoundException(_))
            ) =>
        {
            Ok(())
        }
        Err(err) => Err(map_sdk_error(err, "DeleteTable")),
    }
}

pub async fn wait_for_table_active(client: &Client, table_name: &str) -> Result<CurrentTable> {
    for _ in 0..ACTIVE_POLL_ATTEMPTS {
        if let Some(table) = describe_table(client, table_name).await? {
            if table.active {
                return Ok(table);
            }
        }
        tokio::time::sleep(ACTIVE_POLL_DELAY).await;
    }

    Err(ProviderError::Transient(format!(
        "timed out waiting for table {} to become active",
        table_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::BillingModeSummary;
    use stackplan_core::descriptor::{BillingMode, RemovalPolicy};

    fn description(sort_key_type: ScalarAttributeType) -> TableDescription {
        TableDescription::builder()
            .table_name("users")
            .table_arn("arn:aws:dynamodb:us-east-1:123456789012:table/users")
            .table_status(TableStatus::Active)
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("pk")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("sk")
                    .key_type(KeyType::Range)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("pk")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("sk")
                    .attribute_type(sort_key_type)
                    .build()
                    .unwrap(),
            )
            .billing_mode_summary(
                BillingModeSummary::builder()
                    .billing_mode(SdkBillingMode::PayPerRequest)
                    .build(),
            )
            .build()
    }

    fn declared() -> TableDescriptor {
        TableDescriptor {
            name: "users".to_string(),
            partition_key: KeyAttribute::new("pk", AttributeType::String),
            sort_key: Some(KeyAttribute::new("sk", AttributeType::Number)),
            billing_mode: BillingMode::PayPerRequest,
            point_in_time_recovery: false,
            ttl_attribute: None,
            removal_policy: RemovalPolicy::Retain,
        }
    }

    #[test]
    fn test_current_table_from_description() {
        let current = CurrentTable::from_description(&description(ScalarAttributeType::N));

        assert!(current.active);
        assert!(current.on_demand);
        assert_eq!(
            current.partition_key,
            Some(KeyAttribute::new("pk", AttributeType::String))
        );
        assert_eq!(
            current.sort_key,
            Some(KeyAttribute::new("sk", AttributeType::Number))
        );
        assert!(!current.requires_replacement(&declared()));
    }

    #[test]
    fn test_key_type_change_requires_replacement() {
        let current = CurrentTable::from_description(&description(ScalarAttributeType::S));

        assert!(current.requires_replacement(&declared()));
    }

    #[test]
    fn test_dropped_sort_key_requires_replacement() {
        let current = CurrentTable::from_description(&description(ScalarAttributeType::N));
        let declared = TableDescriptor {
            sort_key: None,
            ..declared()
        };

        assert!(current.requires_replacement(&declared));
    }
}
