use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::{ENTITY_NAME_ATTRIBUTE, EntityMetadata, IndexKind, KeyTemplate};
use crate::Error;

/// Validated entity metadata by entity name
///
/// Entities are registered once at startup. Registration checks everything
/// the compiler relies on, so lookups never fail for a registered entity.
#[derive(Debug, Default)]
pub struct Registry {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add an entity
    pub fn register(&mut self, metadata: EntityMetadata) -> Result<Arc<EntityMetadata>, Error> {
        if self.entities.contains_key(&metadata.name) {
            return Err(Error::DuplicateEntity(metadata.name));
        }
        validate(&metadata)?;

        debug!(
            entity = %metadata.name,
            table = %metadata.table.name,
            indexes = metadata.indexes.len(),
            "registered entity"
        );
        let metadata = Arc::new(metadata);
        let _ = self
            .entities
            .insert(metadata.name.clone(), Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Metadata of a registered entity
    pub fn get(&self, name: &str) -> Result<Arc<EntityMetadata>, Error> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Registered entity names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}

fn invalid(metadata: &EntityMetadata, reason: String) -> Error {
    Error::InvalidMetadata {
        entity: metadata.name.clone(),
        reason,
    }
}

fn check_template(
    metadata: &EntityMetadata,
    label: &str,
    template: &KeyTemplate,
    has_sort_key: bool,
) -> Result<(), Error> {
    for name in template.placeholder_names() {
        if metadata.attribute(&name).is_none() {
            return Err(invalid(
                metadata,
                format!("{label} references undeclared attribute '{name}'"),
            ));
        }
    }
    match (has_sort_key, template.sort_key.is_some()) {
        (true, false) => Err(invalid(metadata, format!("{label} needs a sort key pattern"))),
        (false, true) => Err(invalid(
            metadata,
            format!("{label} has a sort key pattern but the key has no sort key"),
        )),
        _ => Ok(()),
    }
}

fn validate(metadata: &EntityMetadata) -> Result<(), Error> {
    let table = &metadata.table;

    check_template(
        metadata,
        "primary key",
        &metadata.primary_key,
        table.sort_key.is_some(),
    )?;

    for (name, template) in &metadata.indexes {
        let index = table.indexes.get(name).ok_or_else(|| Error::UnknownIndex {
            entity: metadata.name.clone(),
            index: name.clone(),
        })?;
        check_template(
            metadata,
            &format!("index '{name}'"),
            template,
            index.sort_key.is_some(),
        )?;
        if index.kind == IndexKind::Local
            && template.partition_key != metadata.primary_key.partition_key
        {
            return Err(invalid(
                metadata,
                format!("local index '{name}' must reuse the primary partition key pattern"),
            ));
        }
    }

    let reserved = table.key_attributes();
    let mut wire_names = BTreeSet::new();
    for attribute in &metadata.attributes {
        let wire_name = attribute.wire_name.as_str();
        if reserved.contains(wire_name) || wire_name == ENTITY_NAME_ATTRIBUTE {
            return Err(invalid(
                metadata,
                format!("attribute '{}' is stored under reserved name '{wire_name}'", attribute.name),
            ));
        }
        if !wire_names.insert(wire_name) {
            return Err(invalid(
                metadata,
                format!("two attributes are stored under '{wire_name}'"),
            ));
        }
    }

    for unique in &metadata.unique_attributes {
        if metadata.attribute(&unique.name).is_none() {
            return Err(invalid(
                metadata,
                format!("unique attribute '{}' is not declared", unique.name),
            ));
        }
    }

    if let Some(version) = &metadata.schema_version_attribute {
        if metadata.attribute(version).is_none() {
            return Err(invalid(
                metadata,
                format!("schema version attribute '{version}' is not declared"),
            ));
        }
    }

    Ok(())
}
