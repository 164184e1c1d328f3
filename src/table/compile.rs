//! Request compiler
//!
//! Pure functions from entity metadata and domain attributes to the request
//! inputs the store expects. Nothing here performs I/O.

use aws_sdk_dynamodb::operation::delete_item::DeleteItemInput;
use aws_sdk_dynamodb::operation::get_item::GetItemInput;
use aws_sdk_dynamodb::operation::put_item::PutItemInput;
use aws_sdk_dynamodb::operation::query::QueryInput;
use aws_sdk_dynamodb::operation::update_item::UpdateItemInput;
use aws_sdk_dynamodb::types::{
    AttributeValue, ConditionCheck, Delete, Get, Put, ReturnValue, Select,
    TransactGetItem, TransactWriteItem, Update,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::expression::{
    Condition, Expression, KeyCondition, build_condition_expression,
    build_filter_expression, build_key_condition_expression, build_update_expression,
    ensure_key_attributes_isolated,
};
use crate::key::{build_unique_key, index_keys, interpolate, placeholder_names, primary_key};
use crate::metadata::{AttributeKind, ENTITY_NAME_ATTRIBUTE, EntityMetadata, IndexKind};
use crate::table::types::{Config, FindOptions};
use crate::transform::serialize;
use crate::{Error, Item};

fn non_empty(expression: String) -> Option<String> {
    (!expression.is_empty()).then_some(expression)
}

/// `conditions` keyed by stored attribute name
fn stored_conditions(
    metadata: &EntityMetadata,
    conditions: &BTreeMap<String, Condition>,
) -> BTreeMap<String, Condition> {
    conditions
        .iter()
        .map(|(name, condition)| {
            let name = metadata
                .attribute(name)
                .map_or(name, |attribute| &attribute.wire_name);
            (name.clone(), condition.clone())
        })
        .collect()
}

/// `conditions` plus an existence check on the table partition key
fn with_key_check(
    metadata: &EntityMetadata,
    conditions: &BTreeMap<String, Condition>,
    check: Condition,
) -> BTreeMap<String, Condition> {
    let mut conditions = stored_conditions(metadata, conditions);
    let _ = conditions
        .entry(metadata.table.partition_key.clone())
        .or_insert(check);
    conditions
}

/// Complete stored item of an entity
///
/// Keys are resolved from the domain attributes before the transform layer
/// renames or converts them. The item is tagged with the entity name.
pub fn entity_item(metadata: &EntityMetadata, attributes: Item) -> Result<Item, Error> {
    let key = primary_key(metadata, &attributes)?;
    let indexes = index_keys(metadata, &attributes, None::<Vec<&String>>)?;

    let mut item = serialize(attributes, metadata)?;
    item.extend(key);
    item.extend(indexes);
    let _ = item.insert(
        ENTITY_NAME_ATTRIBUTE.to_string(),
        AttributeValue::S(metadata.name.clone()),
    );
    Ok(item)
}

/// Put of a new entity, failing if its key is taken
pub fn create_input(metadata: &EntityMetadata, attributes: Item) -> Result<PutItemInput, Error> {
    let conditions = with_key_check(metadata, &BTreeMap::new(), Condition::NotExists);
    put_input(metadata, attributes, &conditions)
}

/// Put of an entity under `conditions`
pub fn put_input(
    metadata: &EntityMetadata,
    attributes: Item,
    conditions: &BTreeMap<String, Condition>,
) -> Result<PutItemInput, Error> {
    let item = entity_item(metadata, attributes)?;
    let condition = build_condition_expression(&stored_conditions(metadata, conditions));

    Ok(PutItemInput::builder()
        .table_name(&metadata.table.name)
        .set_item(Some(item))
        .set_condition_expression(non_empty(condition.expression))
        .set_expression_attribute_names(condition.names)
        .set_expression_attribute_values(condition.values)
        .build()?)
}

/// Get by primary key
pub fn get_input(
    metadata: &EntityMetadata,
    key_values: &Item,
    consistent_read: bool,
) -> Result<GetItemInput, Error> {
    Ok(GetItemInput::builder()
        .table_name(&metadata.table.name)
        .set_key(Some(primary_key(metadata, key_values)?))
        .consistent_read(consistent_read)
        .build()?)
}

/// Delete by primary key under `conditions`
pub fn delete_input(
    metadata: &EntityMetadata,
    key_values: &Item,
    conditions: &BTreeMap<String, Condition>,
) -> Result<DeleteItemInput, Error> {
    let condition = build_condition_expression(&stored_conditions(metadata, conditions));

    Ok(DeleteItemInput::builder()
        .table_name(&metadata.table.name)
        .set_key(Some(primary_key(metadata, key_values)?))
        .set_condition_expression(non_empty(condition.expression))
        .set_expression_attribute_names(condition.names)
        .set_expression_attribute_values(condition.values)
        .build()?)
}

/// In-place update of an existing entity
///
/// `delta` holds domain attributes. Attributes feeding an index key may only
/// be updated on their own; the index key attributes whose patterns reference
/// them are recomputed from `key_values` and `delta` and set as well. Primary
/// key attributes can not be updated in place.
pub fn update_input(
    metadata: &EntityMetadata,
    key_values: &Item,
    delta: Item,
    conditions: &BTreeMap<String, Condition>,
    config: &Config,
) -> Result<UpdateItemInput, Error> {
    if delta.is_empty() {
        return Err(Error::InvalidUpdateInput(
            "update delta must contain at least one attribute".to_string(),
        ));
    }

    let key_attributes = metadata.key_attributes();
    ensure_key_attributes_isolated(delta.keys().map(String::as_str), &key_attributes)?;

    let primary_attributes = metadata.primary_key_attributes();
    if let Some(name) = delta.keys().find(|name| primary_attributes.contains(*name)) {
        return Err(Error::InvalidUpdateInput(format!(
            "primary key attribute '{name}' can not be updated in place"
        )));
    }

    let changed: BTreeSet<String> = delta
        .keys()
        .filter(|name| key_attributes.contains(*name))
        .cloned()
        .collect();
    let recomputed = if changed.is_empty() {
        Item::new()
    } else {
        let mut values = key_values.clone();
        values.extend(delta.clone());
        recompute_index_keys(metadata, &values, &changed)?
    };

    let mut updates = stored_updates(metadata, delta, &config.nested_key_separator)?;
    updates.extend(recomputed.into_iter().map(|(name, value)| (name, Some(value))));

    let update = build_update_expression(&updates, &config.update_options())?;
    let condition =
        build_condition_expression(&with_key_check(metadata, conditions, Condition::Exists));
    let Expression {
        expression,
        names,
        values,
    } = update.with_aliases_of(&condition)?;

    Ok(UpdateItemInput::builder()
        .table_name(&metadata.table.name)
        .set_key(Some(primary_key(metadata, key_values)?))
        .update_expression(expression)
        .set_condition_expression(non_empty(condition.expression))
        .set_expression_attribute_names(names)
        .set_expression_attribute_values(values)
        .return_values(ReturnValue::AllNew)
        .build()?)
}

/// Update paths of `delta` under their stored names
///
/// Plain attributes go through the transform layer. A nested path only has
/// its first segment renamed; paths into a custom attribute are rejected.
fn stored_updates(
    metadata: &EntityMetadata,
    delta: Item,
    separator: &str,
) -> Result<BTreeMap<String, Option<AttributeValue>>, Error> {
    let (nested, plain): (Item, Item) = delta
        .into_iter()
        .partition(|(name, _)| !separator.is_empty() && name.contains(separator));

    let mut updates: BTreeMap<String, Option<AttributeValue>> = serialize(plain, metadata)?
        .into_iter()
        .map(|(name, value)| (name, Some(value)))
        .collect();

    for (path, value) in nested {
        let Some((head, rest)) = path.split_once(separator) else {
            continue;
        };
        let head = match metadata.attribute(head) {
            Some(attribute) if matches!(attribute.kind, AttributeKind::Custom(_)) => {
                return Err(Error::InvalidUpdateInput(format!(
                    "nested path '{path}' points into custom attribute '{head}'"
                )));
            }
            Some(attribute) => attribute.wire_name.as_str(),
            None => head,
        };
        let _ = updates.insert(format!("{head}{separator}{rest}"), Some(value));
    }
    Ok(updates)
}

/// Index key attributes whose patterns reference a `changed` attribute
fn recompute_index_keys(
    metadata: &EntityMetadata,
    values: &Item,
    changed: &BTreeSet<String>,
) -> Result<Item, Error> {
    let mut keys = Item::new();
    for (name, template) in metadata.affected_indexes(changed) {
        let index = metadata
            .table
            .indexes
            .get(name)
            .ok_or_else(|| Error::UnknownIndex {
                entity: metadata.name.clone(),
                index: name.clone(),
            })?;

        let partition = (index.kind == IndexKind::Global)
            .then_some((&index.partition_key, &template.partition_key));
        let sort = index.sort_key.as_ref().zip(template.sort_key.as_ref());

        for (attribute, pattern) in [partition, sort].into_iter().flatten() {
            if placeholder_names(pattern).iter().any(|n| changed.contains(n)) {
                let value = interpolate(pattern, values)?;
                let _ = keys.insert(attribute.clone(), AttributeValue::S(value));
            }
        }
    }
    Ok(keys)
}

/// Query on the primary key or one index of an entity
///
/// `values` resolve the partition pattern of the queried key. Only items of
/// this entity are matched.
pub fn query_input(
    metadata: &EntityMetadata,
    values: &Item,
    options: &FindOptions,
    select: Option<Select>,
) -> Result<QueryInput, Error> {
    let table = &metadata.table;
    let (partition_attribute, sort_attribute, template) = match &options.index {
        Some(name) => {
            let unknown = || Error::UnknownIndex {
                entity: metadata.name.clone(),
                index: name.clone(),
            };
            let template = metadata.indexes.get(name).ok_or_else(unknown)?;
            let index = table.indexes.get(name).ok_or_else(unknown)?;
            (&index.partition_key, index.sort_key.as_ref(), template)
        }
        None => (&table.partition_key, table.sort_key.as_ref(), &metadata.primary_key),
    };

    let partition = interpolate(&template.partition_key, values)?;
    let mut key_conditions = BTreeMap::from([(
        partition_attribute.clone(),
        KeyCondition::Eq(AttributeValue::S(partition)),
    )]);
    if let Some(condition) = &options.sort_key {
        let attribute = sort_attribute.ok_or_else(|| {
            Error::InvalidQuery(format!(
                "entity '{}' has no sort key to compare on this key",
                metadata.name
            ))
        })?;
        let _ = key_conditions.insert(attribute.clone(), condition.clone());
    }

    let mut filter = stored_conditions(metadata, &options.filter);
    let _ = filter.insert(
        ENTITY_NAME_ATTRIBUTE.to_string(),
        Condition::Eq(AttributeValue::S(metadata.name.clone())),
    );

    let key_condition = build_key_condition_expression(&key_conditions);
    let filter = build_filter_expression(&filter);
    let Expression {
        expression,
        names,
        values,
    } = key_condition.with_aliases_of(&filter)?;

    let select = select.unwrap_or(if options.index.is_some() {
        Select::AllProjectedAttributes
    } else {
        Select::AllAttributes
    });

    Ok(QueryInput::builder()
        .table_name(&table.name)
        .set_index_name(options.index.clone())
        .select(select)
        .key_condition_expression(expression)
        .set_filter_expression(non_empty(filter.expression))
        .set_expression_attribute_names(names)
        .set_expression_attribute_values(values)
        .set_limit(options.limit)
        .scan_index_forward(options.scan_index_forward)
        .consistent_read(options.consistent_read)
        .set_exclusive_start_key(options.exclusive_start_key.clone())
        .build()?)
}

fn unique_value<'a>(attributes: &'a Item, name: &str) -> Option<&'a AttributeValue> {
    attributes
        .get(name)
        .filter(|value| !matches!(value, AttributeValue::Null(_)))
}

fn unique_key(
    metadata: &EntityMetadata,
    name: &str,
    prefix: Option<&str>,
    value: &AttributeValue,
    config: &Config,
) -> Result<Item, Error> {
    build_unique_key(
        &metadata.table,
        &metadata.name,
        name,
        value,
        Some(prefix.unwrap_or(&config.unique_prefix)),
    )
}

fn sentinel_put(metadata: &EntityMetadata, key: Item) -> Result<TransactWriteItem, Error> {
    let condition = build_condition_expression(&BTreeMap::from([(
        metadata.table.partition_key.clone(),
        Condition::NotExists,
    )]));
    let put = Put::builder()
        .table_name(&metadata.table.name)
        .set_item(Some(key))
        .set_condition_expression(non_empty(condition.expression))
        .set_expression_attribute_names(condition.names)
        .set_expression_attribute_values(condition.values)
        .build()?;
    Ok(TransactWriteItem::builder().put(put).build())
}

fn sentinel_delete(metadata: &EntityMetadata, key: Item) -> Result<TransactWriteItem, Error> {
    let delete = Delete::builder()
        .table_name(&metadata.table.name)
        .set_key(Some(key))
        .build()?;
    Ok(TransactWriteItem::builder().delete(delete).build())
}

/// Sentinel puts reserving every unique attribute value of `attributes`
///
/// Each put fails its condition if the value is already taken. Absent or
/// `NULL` values reserve nothing.
pub fn unique_puts(
    metadata: &EntityMetadata,
    attributes: &Item,
    config: &Config,
) -> Result<Vec<TransactWriteItem>, Error> {
    metadata
        .unique_attributes
        .iter()
        .filter_map(|unique| {
            unique_value(attributes, &unique.name).map(|value| (unique, value))
        })
        .map(|(unique, value)| {
            let key = unique_key(metadata, &unique.name, unique.prefix.as_deref(), value, config)?;
            sentinel_put(metadata, key)
        })
        .collect()
}

/// Sentinel deletes releasing every unique attribute value of `attributes`
pub fn unique_deletes(
    metadata: &EntityMetadata,
    attributes: &Item,
    config: &Config,
) -> Result<Vec<TransactWriteItem>, Error> {
    metadata
        .unique_attributes
        .iter()
        .filter_map(|unique| {
            unique_value(attributes, &unique.name).map(|value| (unique, value))
        })
        .map(|(unique, value)| {
            let key = unique_key(metadata, &unique.name, unique.prefix.as_deref(), value, config)?;
            sentinel_delete(metadata, key)
        })
        .collect()
}

/// Sentinel swaps for the unique attributes `delta` changes
///
/// `current` holds the stored domain attributes. Unchanged values are left
/// alone.
pub fn unique_swaps(
    metadata: &EntityMetadata,
    current: &Item,
    delta: &Item,
    config: &Config,
) -> Result<Vec<TransactWriteItem>, Error> {
    let mut items = Vec::new();
    for unique in &metadata.unique_attributes {
        if !delta.contains_key(&unique.name) {
            continue;
        }
        let old = unique_value(current, &unique.name);
        let new = unique_value(delta, &unique.name);
        if old == new {
            continue;
        }
        let prefix = unique.prefix.as_deref();
        if let Some(old) = old {
            let key = unique_key(metadata, &unique.name, prefix, old, config)?;
            items.push(sentinel_delete(metadata, key)?);
        }
        if let Some(new) = new {
            let key = unique_key(metadata, &unique.name, prefix, new, config)?;
            items.push(sentinel_put(metadata, key)?);
        }
    }
    Ok(items)
}

/// Condition check on an entity inside a write transaction
pub fn condition_check(
    metadata: &EntityMetadata,
    key_values: &Item,
    conditions: &BTreeMap<String, Condition>,
) -> Result<TransactWriteItem, Error> {
    let condition = build_condition_expression(&with_key_check(
        metadata,
        conditions,
        Condition::Exists,
    ));
    let check = ConditionCheck::builder()
        .table_name(&metadata.table.name)
        .set_key(Some(primary_key(metadata, key_values)?))
        .condition_expression(condition.expression)
        .set_expression_attribute_names(condition.names)
        .set_expression_attribute_values(condition.values)
        .build()?;
    Ok(TransactWriteItem::builder().condition_check(check).build())
}

/// Transaction item of a compiled put
pub fn transact_put(input: PutItemInput) -> Result<TransactWriteItem, Error> {
    let put = Put::builder()
        .set_table_name(input.table_name)
        .set_item(input.item)
        .set_condition_expression(input.condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .build()?;
    Ok(TransactWriteItem::builder().put(put).build())
}

/// Transaction item of a compiled update
pub fn transact_update(input: UpdateItemInput) -> Result<TransactWriteItem, Error> {
    let update = Update::builder()
        .set_table_name(input.table_name)
        .set_key(input.key)
        .set_update_expression(input.update_expression)
        .set_condition_expression(input.condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .build()?;
    Ok(TransactWriteItem::builder().update(update).build())
}

/// Transaction item of a compiled delete
pub fn transact_delete(input: DeleteItemInput) -> Result<TransactWriteItem, Error> {
    let delete = Delete::builder()
        .set_table_name(input.table_name)
        .set_key(input.key)
        .set_condition_expression(input.condition_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .set_expression_attribute_values(input.expression_attribute_values)
        .build()?;
    Ok(TransactWriteItem::builder().delete(delete).build())
}

/// Transaction item of a compiled get
pub fn transact_get(input: GetItemInput) -> Result<TransactGetItem, Error> {
    let get = Get::builder()
        .set_table_name(input.table_name)
        .set_key(input.key)
        .set_projection_expression(input.projection_expression)
        .set_expression_attribute_names(input.expression_attribute_names)
        .build()?;
    Ok(TransactGetItem::builder().get(get).build())
}
