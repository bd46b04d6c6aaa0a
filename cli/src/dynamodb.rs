//! Thin DynamoDB wrappers around item and table operations
//!
//! Condition and update expressions are always passed as a structured
//! [`Expression`] carrying its own value and name substitutions, with a
//! plain-string constructor for the simple call sites.

use crate::error::Error;
use crate::provider::classify;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, ConditionCheck, Delete, KeySchemaElement,
    KeyType, KeysAndAttributes, Put, PutRequest, ReturnValue, ScalarAttributeType,
    TableDescription, TransactWriteItem, Update, WriteRequest,
};
use std::collections::HashMap;

pub type Item = HashMap<String, AttributeValue>;

/// Transactions are capped by the provider at this many items
pub const MAX_TRANSACT_ITEMS: usize = 25;

/// A single batch-get request carries at most this many keys
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Batch writes are chunked to this size
const BATCH_WRITE_CHUNK: usize = 25;

/// A filter, condition or update expression with its substitutions
#[derive(Clone, Debug, Default)]
pub struct Expression {
    pub expression: String,
    pub values: HashMap<String, AttributeValue>,
    pub names: HashMap<String, String>,
}

impl Expression {
    pub fn new(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
            ..Default::default()
        }
    }

    /// Bind a `:placeholder` value
    pub fn value(mut self, placeholder: &str, value: AttributeValue) -> Self {
        self.values.insert(placeholder.to_string(), value);
        self
    }

    /// Bind a `#placeholder` attribute name, for reserved words
    pub fn name(mut self, placeholder: &str, attribute: &str) -> Self {
        self.names
            .insert(placeholder.to_string(), attribute.to_string());
        self
    }

    fn values_opt(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }

    fn names_opt(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }
}

impl From<&str> for Expression {
    fn from(expression: &str) -> Self {
        Self::new(expression)
    }
}

/// One operation inside a write transaction
///
/// Each case carries only the fields its operation needs, invalid
/// combinations are not expressible.
#[derive(Clone, Debug)]
pub enum TransactItem {
    Put {
        table: String,
        item: Item,
        condition: Option<Expression>,
    },
    Update {
        table: String,
        key: Item,
        update: Expression,
        condition: Option<Expression>,
    },
    Delete {
        table: String,
        key: Item,
        condition: Option<Expression>,
    },
    ConditionCheck {
        table: String,
        key: Item,
        condition: Expression,
    },
}

impl TransactItem {
    fn into_sdk(self) -> Result<TransactWriteItem, Error> {
        let invalid = |err: aws_sdk_dynamodb::error::BuildError| Error::InvalidInput(err.to_string());

        Ok(match self {
            TransactItem::Put {
                table,
                item,
                condition,
            } => TransactWriteItem::builder()
                .put(
                    Put::builder()
                        .table_name(table)
                        .set_item(Some(item))
                        .set_condition_expression(
                            condition.as_ref().map(|c| c.expression.clone()),
                        )
                        .set_expression_attribute_values(
                            condition.as_ref().and_then(Expression::values_opt),
                        )
                        .set_expression_attribute_names(
                            condition.as_ref().and_then(Expression::names_opt),
                        )
                        .build()
                        .map_err(invalid)?,
                )
                .build(),
            TransactItem::Update {
                table,
                key,
                update,
                condition,
            } => {
                // Value and name substitutions are shared between the
                // update and condition expressions
                let mut values = update.values.clone();
                let mut names = update.names.clone();

                if let Some(condition) = &condition {
                    values.extend(condition.values.clone());
                    names.extend(condition.names.clone());
                }

                TransactWriteItem::builder()
                    .update(
                        Update::builder()
                            .table_name(table)
                            .set_key(Some(key))
                            .update_expression(&update.expression)
                            .set_condition_expression(
                                condition.as_ref().map(|c| c.expression.clone()),
                            )
                            .set_expression_attribute_values(
                                (!values.is_empty()).then_some(values),
                            )
                            .set_expression_attribute_names((!names.is_empty()).then_some(names))
                            .build()
                            .map_err(invalid)?,
                    )
                    .build()
            }
            TransactItem::Delete {
                table,
                key,
                condition,
            } => TransactWriteItem::builder()
                .delete(
                    Delete::builder()
                        .table_name(table)
                        .set_key(Some(key))
                        .set_condition_expression(
                            condition.as_ref().map(|c| c.expression.clone()),
                        )
                        .set_expression_attribute_values(
                            condition.as_ref().and_then(Expression::values_opt),
                        )
                        .set_expression_attribute_names(
                            condition.as_ref().and_then(Expression::names_opt),
                        )
                        .build()
                        .map_err(invalid)?,
                )
                .build(),
            TransactItem::ConditionCheck {
                table,
                key,
                condition,
            } => TransactWriteItem::builder()
                .condition_check(
                    ConditionCheck::builder()
                        .table_name(table)
                        .set_key(Some(key))
                        .condition_expression(&condition.expression)
                        .set_expression_attribute_values(condition.values_opt())
                        .set_expression_attribute_names(condition.names_opt())
                        .build()
                        .map_err(invalid)?,
                )
                .build(),
        })
    }
}

pub async fn put_item(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    item: Item,
) -> Result<(), Error> {
    client
        .put_item()
        .table_name(table)
        .set_item(Some(item))
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    Ok(())
}

pub async fn get_item(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    key: Item,
) -> Result<Option<Item>, Error> {
    let output = client
        .get_item()
        .table_name(table)
        .set_key(Some(key))
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    Ok(output.item)
}

/// Update an item, returning its new attributes
pub async fn update_item(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    key: Item,
    update: Expression,
    condition: Option<Expression>,
) -> Result<Option<Item>, Error> {
    let mut values = update.values.clone();
    let mut names = update.names.clone();

    if let Some(condition) = &condition {
        values.extend(condition.values.clone());
        names.extend(condition.names.clone());
    }

    let output = client
        .update_item()
        .table_name(table)
        .set_key(Some(key))
        .update_expression(&update.expression)
        .set_condition_expression(condition.as_ref().map(|c| c.expression.clone()))
        .set_expression_attribute_values((!values.is_empty()).then_some(values))
        .set_expression_attribute_names((!names.is_empty()).then_some(names))
        .return_values(ReturnValue::AllNew)
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    Ok(output.attributes)
}

pub async fn delete_item(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    key: Item,
) -> Result<(), Error> {
    client
        .delete_item()
        .table_name(table)
        .set_key(Some(key))
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    Ok(())
}

/// Query a table or index, following pagination to the end
pub async fn query(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    key_condition: Expression,
    index: Option<&str>,
    ascending: bool,
) -> Result<Vec<Item>, Error> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .query()
            .table_name(table)
            .key_condition_expression(&key_condition.expression)
            .set_expression_attribute_values(key_condition.values_opt())
            .set_expression_attribute_names(key_condition.names_opt())
            .set_index_name(index.map(str::to_string))
            .scan_index_forward(ascending)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|err| classify(err, &format!("table {table}")))?;

        items.extend(output.items().iter().cloned());

        match output.last_evaluated_key() {
            Some(key) => start_key = Some(key.clone()),
            None => break,
        }
    }

    Ok(items)
}

/// Scan a table, stopping once `limit` items have been collected
pub async fn scan(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    filter: Option<Expression>,
    limit: Option<usize>,
) -> Result<Vec<Item>, Error> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .scan()
            .table_name(table)
            .set_filter_expression(filter.as_ref().map(|f| f.expression.clone()))
            .set_expression_attribute_values(filter.as_ref().and_then(Expression::values_opt))
            .set_expression_attribute_names(filter.as_ref().and_then(Expression::names_opt))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|err| classify(err, &format!("table {table}")))?;

        items.extend(output.items().iter().cloned());

        if limit.is_some_and(|limit| items.len() >= limit) {
            items.truncate(limit.unwrap_or_default());
            break;
        }

        match output.last_evaluated_key() {
            Some(key) => start_key = Some(key.clone()),
            None => break,
        }
    }

    Ok(items)
}

/// Write many items, chunked to the provider's batch size
pub async fn batch_write(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    items: Vec<Item>,
) -> Result<(), Error> {
    let count = items.len();

    for chunk in items.chunks(BATCH_WRITE_CHUNK) {
        let requests = chunk
            .iter()
            .map(|item| {
                Ok(WriteRequest::builder()
                    .put_request(
                        PutRequest::builder()
                            .set_item(Some(item.clone()))
                            .build()
                            .map_err(|err| Error::InvalidInput(err.to_string()))?,
                    )
                    .build())
            })
            .collect::<Result<Vec<_>, Error>>()?;

        client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|err| classify(err, &format!("table {table}")))?;
    }

    println!(
        "  {} Wrote {count} item(s) to {table}",
        console::style("✓").green(),
    );

    Ok(())
}

/// Fetch many items by key, chunked to the provider's per-request ceiling
pub async fn batch_get(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    keys: Vec<Item>,
) -> Result<Vec<Item>, Error> {
    let mut items = Vec::new();

    for request in batch_get_requests(&keys)? {
        let output = client
            .batch_get_item()
            .request_items(table, request)
            .send()
            .await
            .map_err(|err| classify(err, &format!("table {table}")))?;

        if let Some(responses) = output.responses() {
            items.extend(responses.get(table).into_iter().flatten().cloned());
        }
    }

    println!(
        "  {} Fetched {} item(s) from {table}",
        console::style("✓").green(),
        items.len(),
    );

    Ok(items)
}

fn batch_get_requests(keys: &[Item]) -> Result<Vec<KeysAndAttributes>, Error> {
    keys.chunks(MAX_BATCH_GET_KEYS)
        .map(|chunk| {
            KeysAndAttributes::builder()
                .set_keys(Some(chunk.to_vec()))
                .build()
                .map_err(|err| Error::InvalidInput(err.to_string()))
        })
        .collect()
}

/// Names of all tables in the account, following pagination to the end
pub async fn list_tables(client: &aws_sdk_dynamodb::Client) -> Result<Vec<String>, Error> {
    let mut stream = client.list_tables().into_paginator().items().send();
    let mut names = Vec::new();

    while let Some(name) = stream.next().await {
        names.push(name.map_err(|err| classify(err, "tables"))?);
    }

    Ok(names)
}

/// Key structure and billing settings of one table
#[derive(Clone, Debug)]
pub struct TableSchema {
    pub name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing_mode: BillingMode,
    pub item_count: i64,
}

impl TableSchema {
    fn from_description(description: &TableDescription) -> Self {
        Self {
            name: description.table_name().unwrap_or_default().to_string(),
            key_schema: description.key_schema().to_vec(),
            attribute_definitions: description.attribute_definitions().to_vec(),
            // Absent summary means the table was never switched off the
            // provisioned default
            billing_mode: description
                .billing_mode_summary()
                .and_then(|summary| summary.billing_mode())
                .cloned()
                .unwrap_or(BillingMode::Provisioned),
            item_count: description.item_count().unwrap_or_default(),
        }
    }
}

pub async fn get_table_schema(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
) -> Result<TableSchema, Error> {
    let output = client
        .describe_table()
        .table_name(table)
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    let description = output.table().ok_or_else(|| Error::Provider {
        code: "MalformedResponse".into(),
        message: format!("describe_table returned no description for {table}"),
    })?;

    Ok(TableSchema::from_description(description))
}

/// Recreate a table on another client and migrate its items
///
/// Typically used to move a table from a local DynamoDB instance into
/// AWS. The destination table is created on demand with the source's
/// key structure, then every item is scanned out and batch written.
/// Returns the number of migrated items.
pub async fn copy_table(
    source: &aws_sdk_dynamodb::Client,
    destination: &aws_sdk_dynamodb::Client,
    source_table: &str,
    destination_table: Option<&str>,
) -> Result<usize, Error> {
    let destination_table = destination_table.unwrap_or(source_table);
    let schema = get_table_schema(source, source_table).await?;

    println!(
        "{} table {source_table} as {destination_table}",
        console::style("Migrating").green().bold(),
    );

    destination
        .create_table()
        .table_name(destination_table)
        .billing_mode(BillingMode::PayPerRequest)
        .set_key_schema(Some(schema.key_schema))
        .set_attribute_definitions(Some(schema.attribute_definitions))
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {destination_table}")))?;

    let items = scan(source, source_table, None, None).await?;

    if items.is_empty() {
        println!(
            "  {} No items to migrate from {source_table}",
            console::style("⚠").yellow(),
        );
        return Ok(0);
    }

    let count = items.len();
    batch_write(destination, destination_table, items).await?;

    println!(
        "  {} Migrated {count} item(s) to {destination_table}",
        console::style("✓").green(),
    );

    Ok(count)
}

pub(crate) fn ensure_transaction_size(items: &[TransactItem]) -> Result<(), Error> {
    if items.len() > MAX_TRANSACT_ITEMS {
        return Err(Error::InvalidInput(format!(
            "A transaction can contain at most {MAX_TRANSACT_ITEMS} items, got {}",
            items.len(),
        )));
    }

    Ok(())
}

/// Execute up to 25 operations atomically
pub async fn transact_write(
    client: &aws_sdk_dynamodb::Client,
    items: Vec<TransactItem>,
) -> Result<(), Error> {
    ensure_transaction_size(&items)?;
    let count = items.len();

    let items = items
        .into_iter()
        .map(TransactItem::into_sdk)
        .collect::<Result<Vec<_>, Error>>()?;

    client
        .transact_write_items()
        .set_transact_items(Some(items))
        .send()
        .await
        .map_err(|err| classify(err, "transaction"))?;

    println!(
        "  {} Transaction completed with {count} item(s)",
        console::style("✓").green(),
    );

    Ok(())
}

/// Create an on-demand table with string keys
pub async fn create_table(
    client: &aws_sdk_dynamodb::Client,
    table: &str,
    partition_key: &str,
    sort_key: Option<&str>,
) -> Result<(), Error> {
    let invalid = |err: aws_sdk_dynamodb::error::BuildError| Error::InvalidInput(err.to_string());

    let mut request = client
        .create_table()
        .table_name(table)
        .billing_mode(BillingMode::PayPerRequest)
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(partition_key)
                .key_type(KeyType::Hash)
                .build()
                .map_err(invalid)?,
        )
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(partition_key)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(invalid)?,
        );

    if let Some(sort_key) = sort_key {
        request = request
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(sort_key)
                    .key_type(KeyType::Range)
                    .build()
                    .map_err(invalid)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(sort_key)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(invalid)?,
            );
    }

    request
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    println!(
        "{} table {table}",
        console::style("Created").green().bold(),
    );

    Ok(())
}

pub async fn delete_table(client: &aws_sdk_dynamodb::Client, table: &str) -> Result<(), Error> {
    client
        .delete_table()
        .table_name(table)
        .send()
        .await
        .map_err(|err| classify(err, &format!("table {table}")))?;

    Ok(())
}
