use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, BTreeSet};

use super::{Aliases, Expression, UPDATE_ROLE};
use crate::Error;

/// Separator of nested attribute paths in an update delta
pub const DEFAULT_NESTED_KEY_SEPARATOR: &str = ".";

/// Options of [`build_update_expression`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Splits a delta key into nested path segments
    pub nested_key_separator: String,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            nested_key_separator: DEFAULT_NESTED_KEY_SEPARATOR.to_string(),
        }
    }
}

/// `SET` fragment assigning every entry of `delta`
///
/// Keys are split into nested paths on the configured separator and every
/// segment gets its own name alias; the value alias joins the segments with
/// `_`. A `None` value is written as `NULL`.
pub fn build_update_expression(
    delta: &BTreeMap<String, Option<AttributeValue>>,
    options: &UpdateOptions,
) -> Result<Expression, Error> {
    if delta.is_empty() {
        return Err(Error::InvalidUpdateInput(
            "update delta must contain at least one attribute".to_string(),
        ));
    }
    if options.nested_key_separator.is_empty() {
        return Err(Error::InvalidUpdateInput(
            "nested key separator must not be empty".to_string(),
        ));
    }

    let mut aliases = Aliases::new(UPDATE_ROLE);
    let mut clauses = Vec::with_capacity(delta.len());

    for (path, value) in delta {
        let segments: Vec<&str> = path.split(options.nested_key_separator.as_str()).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::InvalidUpdateInput(format!(
                "attribute path '{path}' has an empty segment"
            )));
        }

        let names: Vec<String> = segments.iter().map(|segment| aliases.name(segment)).collect();
        let value = value.clone().unwrap_or(AttributeValue::Null(true));
        let value = aliases.value(&segments, value);
        clauses.push(format!("{} = {}", names.join("."), value));
    }

    Ok(aliases.finish(format!("SET {}", clauses.join(", "))))
}

/// Reject a delta that mixes key attributes with other attributes
///
/// `key_attributes` holds every attribute referenced by a primary or index
/// key template.
pub fn ensure_key_attributes_isolated<'a, I>(
    delta_names: I,
    key_attributes: &BTreeSet<String>,
) -> Result<(), Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let (keys, others): (Vec<&str>, Vec<&str>) = delta_names
        .into_iter()
        .partition(|name| key_attributes.contains(*name));

    if keys.is_empty() || others.is_empty() {
        return Ok(());
    }

    let mut key_attributes: Vec<String> = keys.into_iter().map(str::to_string).collect();
    let mut other_attributes: Vec<String> = others.into_iter().map(str::to_string).collect();
    key_attributes.sort();
    other_attributes.sort();
    Err(Error::InvalidPrimaryKeyAttributesUpdate {
        key_attributes,
        other_attributes,
    })
}
