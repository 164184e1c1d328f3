//! Attribute transform layer
//!
//! Converts between the domain attributes of an entity (keyed by field name)
//! and the attributes of a stored item (keyed by wire name). Custom kinds run
//! their transformer, versioned attributes outside their window are dropped.

use aws_sdk_dynamodb::types::AttributeValue;
use tracing::warn;

use crate::metadata::{AttributeKind, AttributeMetadata, ENTITY_NAME_ATTRIBUTE, EntityMetadata};
use crate::{Error, Item};

/// What to do with stored attributes the entity does not declare
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownAttributes {
    /// Pass them through under their stored name
    #[default]
    Keep,
    /// Leave them out
    Drop,
}

/// Schema version carried by `attributes` under `name`
///
/// `None` when the entity is not versioned or the value is absent.
fn schema_version(
    metadata: &EntityMetadata,
    attributes: &Item,
    name: Option<&str>,
) -> Result<Option<u32>, Error> {
    let Some(name) = name else {
        return Ok(None);
    };
    let invalid = |value: String| Error::InvalidSchemaVersion {
        entity: metadata.name.clone(),
        value,
    };

    match attributes.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::N(value)) | Some(AttributeValue::S(value)) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| invalid(value.clone())),
        Some(other) => Err(invalid(format!("{other:?}"))),
    }
}

fn check_kind(metadata: &EntityMetadata, attribute: &AttributeMetadata, value: &AttributeValue) {
    if !attribute.kind.accepts(value) {
        warn!(
            entity = %metadata.name,
            attribute = %attribute.name,
            kind = ?attribute.kind,
            "attribute value does not match its declared kind"
        );
    }
}

fn transform_error(attribute: &AttributeMetadata, message: String) -> Error {
    Error::Transform {
        attribute: attribute.name.clone(),
        message,
    }
}

/// Domain attributes to stored attributes
pub fn serialize(attributes: Item, metadata: &EntityMetadata) -> Result<Item, Error> {
    let version = schema_version(
        metadata,
        &attributes,
        metadata.schema_version_attribute.as_deref(),
    )?;

    let mut item = Item::with_capacity(attributes.len());
    for (name, value) in attributes {
        let Some(attribute) = metadata.attribute(&name) else {
            let _ = item.insert(name, value);
            continue;
        };
        if !attribute.is_visible_at(version) {
            continue;
        }

        let value = match (attribute.kind, value) {
            (_, AttributeValue::Null(null)) => AttributeValue::Null(null),
            (AttributeKind::Custom(transformer), value) => {
                (transformer.to_wire)(value).map_err(|e| transform_error(attribute, e))?
            }
            (_, value) => {
                check_kind(metadata, attribute, &value);
                value
            }
        };
        let _ = item.insert(attribute.wire_name.clone(), value);
    }
    Ok(item)
}

/// Stored attributes to domain attributes
///
/// Table key attributes and the entity marker are never domain attributes
/// and are always removed.
pub fn deserialize(
    mut item: Item,
    metadata: &EntityMetadata,
    unknown: UnknownAttributes,
) -> Result<Item, Error> {
    for key in metadata.table.key_attributes() {
        let _ = item.remove(key);
    }
    let _ = item.remove(ENTITY_NAME_ATTRIBUTE);

    let version_wire_name = metadata
        .schema_version_attribute
        .as_deref()
        .map(|name| metadata.attribute(name).map_or(name, |a| a.wire_name.as_str()));
    let version = schema_version(metadata, &item, version_wire_name)?;

    let mut attributes = Item::with_capacity(item.len());
    for (wire_name, value) in item {
        let Some(attribute) = metadata.attribute_by_wire_name(&wire_name) else {
            if unknown == UnknownAttributes::Keep {
                let _ = attributes.insert(wire_name, value);
            }
            continue;
        };
        if !attribute.is_visible_at(version) {
            continue;
        }

        let value = match (attribute.kind, value) {
            (_, AttributeValue::Null(null)) => AttributeValue::Null(null),
            (AttributeKind::Custom(transformer), value) => {
                (transformer.from_wire)(value).map_err(|e| transform_error(attribute, e))?
            }
            (_, value) => {
                check_kind(metadata, attribute, &value);
                value
            }
        };
        let _ = attributes.insert(attribute.name.clone(), value);
    }
    Ok(attributes)
}
