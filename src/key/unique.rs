use aws_sdk_dynamodb::types::AttributeValue;

use crate::metadata::Table;
use crate::{Error, Item};

/// Prefix of unique attribute sentinel keys when none is configured
pub const DEFAULT_UNIQUE_PREFIX: &str = "ATTR_";

/// Sentinel key reserving `value` of a unique `attribute` of `entity`
///
/// The key value is `<PREFIX><ENTITY>.<ATTRIBUTE>#<VALUE>` with entity and
/// attribute names upper-cased. It is set on the table partition key and, when
/// the table has one, on the sort key as well.
pub fn build_unique_key(
    table: &Table,
    entity: &str,
    attribute: &str,
    value: &AttributeValue,
    prefix: Option<&str>,
) -> Result<Item, Error> {
    let rendered = match value {
        AttributeValue::S(value) | AttributeValue::N(value) => value.clone(),
        AttributeValue::Bool(value) => value.to_string(),
        AttributeValue::Null(_) => {
            return Err(Error::MissingInterpolationValue {
                template: unique_template(entity, attribute, prefix),
                name: attribute.to_string(),
            });
        }
        _ => {
            return Err(Error::InvalidInterpolationValue {
                template: unique_template(entity, attribute, prefix),
                name: attribute.to_string(),
            });
        }
    };

    let key_value = format!(
        "{}{}.{}#{}",
        prefix.unwrap_or(DEFAULT_UNIQUE_PREFIX),
        entity.to_uppercase(),
        attribute.to_uppercase(),
        rendered
    );

    let mut key = Item::new();
    if let Some(sort_key) = &table.sort_key {
        let _ = key.insert(sort_key.clone(), AttributeValue::S(key_value.clone()));
    }
    let _ = key.insert(table.partition_key.clone(), AttributeValue::S(key_value));
    Ok(key)
}

fn unique_template(entity: &str, attribute: &str, prefix: Option<&str>) -> String {
    format!(
        "{}{}.{}#{{{{{}}}}}",
        prefix.unwrap_or(DEFAULT_UNIQUE_PREFIX),
        entity.to_uppercase(),
        attribute.to_uppercase(),
        attribute
    )
}
