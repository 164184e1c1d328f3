//! Entity and table metadata
//!
//! Metadata is declared once, handed to a [`Registry`] at startup and read-only
//! afterwards. Everything the request compiler knows about an entity (its
//! key templates, attributes, versions and unique constraints) lives here.

mod registry;

pub use registry::Registry;

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::key::template::placeholder_names;

/// Attribute every entity item carries with the entity name
pub const ENTITY_NAME_ATTRIBUTE: &str = "__en";

/// Kind of a secondary index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    /// Global secondary index, own partition key
    Global,
    /// Local secondary index, shares the table partition key
    Local,
}

/// Key attributes of a secondary index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableIndex {
    /// Index kind
    pub kind: IndexKind,
    /// Partition key attribute
    pub partition_key: String,
    /// Sort key attribute
    pub sort_key: Option<String>,
}

/// Physical table shared by every entity mapped onto it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Partition key attribute
    pub partition_key: String,
    /// Sort key attribute
    pub sort_key: Option<String>,
    /// Secondary indexes by name
    pub indexes: BTreeMap<String, TableIndex>,
}

impl Table {
    /// Table with a partition key only
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: None,
            indexes: BTreeMap::new(),
        }
    }

    /// Add a sort key to the primary key
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Declare a global secondary index
    pub fn with_global_index(
        mut self,
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: Option<&str>,
    ) -> Self {
        let _ = self.indexes.insert(
            name.into(),
            TableIndex {
                kind: IndexKind::Global,
                partition_key: partition_key.into(),
                sort_key: sort_key.map(str::to_string),
            },
        );
        self
    }

    /// Declare a local secondary index
    pub fn with_local_index(mut self, name: impl Into<String>, sort_key: impl Into<String>) -> Self {
        let index = TableIndex {
            kind: IndexKind::Local,
            partition_key: self.partition_key.clone(),
            sort_key: Some(sort_key.into()),
        };
        let _ = self.indexes.insert(name.into(), index);
        self
    }

    /// Primary key attribute names, partition key first
    pub fn primary_key_attributes(&self) -> Vec<&str> {
        std::iter::once(self.partition_key.as_str())
            .chain(self.sort_key.as_deref())
            .collect()
    }

    /// Every attribute used as a key by the table or one of its indexes
    pub fn key_attributes(&self) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = self.primary_key_attributes().into_iter().collect();
        for index in self.indexes.values() {
            let _ = names.insert(index.partition_key.as_str());
            if let Some(sort_key) = index.sort_key.as_deref() {
                let _ = names.insert(sort_key);
            }
        }
        names
    }
}

/// Key patterns of the primary key or of one index
///
/// Each pattern is literal text with `{{attribute}}` placeholders, e.g.
/// `USER#{{id}}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyTemplate {
    /// Partition key pattern
    pub partition_key: String,
    /// Sort key pattern
    pub sort_key: Option<String>,
}

impl KeyTemplate {
    /// Template with a partition key pattern only
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Add a sort key pattern
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Attributes referenced by either pattern
    pub fn placeholder_names(&self) -> BTreeSet<String> {
        let mut names = placeholder_names(&self.partition_key);
        if let Some(sort_key) = &self.sort_key {
            names.extend(placeholder_names(sort_key));
        }
        names
    }
}

/// Error message returned by a custom transformer
pub type TransformResult = Result<AttributeValue, String>;

/// Custom to-wire / from-wire conversion of one attribute
#[derive(Clone, Copy)]
pub struct Transformer {
    /// Domain value to stored value
    pub to_wire: fn(AttributeValue) -> TransformResult,
    /// Stored value to domain value
    pub from_wire: fn(AttributeValue) -> TransformResult,
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transformer")
    }
}

/// Declared kind of an attribute
#[derive(Clone, Copy, Debug)]
pub enum AttributeKind {
    /// `S`
    String,
    /// `N`
    Number,
    /// `BOOL`
    Boolean,
    /// `B`
    Binary,
    /// `L`
    List,
    /// `M`
    Map,
    /// `SS`
    StringSet,
    /// `NS`
    NumberSet,
    /// Any value, converted by a transformer pair
    Custom(Transformer),
}

impl AttributeKind {
    /// Whether a stored value has the shape this kind declares
    ///
    /// `NULL` fits every kind. Custom kinds accept anything.
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        match (self, value) {
            (_, AttributeValue::Null(_)) | (AttributeKind::Custom(_), _) => true,
            (AttributeKind::String, AttributeValue::S(_))
            | (AttributeKind::Number, AttributeValue::N(_))
            | (AttributeKind::Boolean, AttributeValue::Bool(_))
            | (AttributeKind::Binary, AttributeValue::B(_))
            | (AttributeKind::List, AttributeValue::L(_))
            | (AttributeKind::Map, AttributeValue::M(_))
            | (AttributeKind::StringSet, AttributeValue::Ss(_))
            | (AttributeKind::NumberSet, AttributeValue::Ns(_)) => true,
            _ => false,
        }
    }
}

/// One declared entity attribute
#[derive(Clone, Debug)]
pub struct AttributeMetadata {
    /// Field name on the entity
    pub name: String,
    /// Attribute name in the stored item
    pub wire_name: String,
    /// Declared kind
    pub kind: AttributeKind,
    /// First schema version carrying the attribute (inclusive)
    pub since_version: Option<u32>,
    /// First schema version no longer carrying the attribute (exclusive)
    pub until_version: Option<u32>,
}

impl AttributeMetadata {
    /// Attribute stored under its own name
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        let name = name.into();
        Self {
            wire_name: name.clone(),
            name,
            kind,
            since_version: None,
            until_version: None,
        }
    }

    /// Store the attribute under a different name
    pub fn with_wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = wire_name.into();
        self
    }

    /// Attribute exists from `version` on
    pub fn since(mut self, version: u32) -> Self {
        self.since_version = Some(version);
        self
    }

    /// Attribute is dropped from `version` on
    pub fn until(mut self, version: u32) -> Self {
        self.until_version = Some(version);
        self
    }

    /// Whether the `[since, until)` window includes `version`
    ///
    /// Without a version every attribute is visible.
    pub fn is_visible_at(&self, version: Option<u32>) -> bool {
        let Some(version) = version else {
            return true;
        };
        self.since_version.is_none_or(|since| version >= since)
            && self.until_version.is_none_or(|until| version < until)
    }
}

/// Attribute whose value must be unique across one entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniqueAttribute {
    /// Attribute name
    pub name: String,
    /// Prefix of the sentinel key, the configured default when unset
    pub prefix: Option<String>,
}

/// Everything the compiler needs to know about one entity
#[derive(Clone, Debug)]
pub struct EntityMetadata {
    /// Entity name, also written to [`ENTITY_NAME_ATTRIBUTE`]
    pub name: String,
    /// Table the entity lives in
    pub table: Arc<Table>,
    /// Primary key template
    pub primary_key: KeyTemplate,
    /// Index key templates by index name
    pub indexes: BTreeMap<String, KeyTemplate>,
    /// Declared attributes
    pub attributes: Vec<AttributeMetadata>,
    /// Unique attribute constraints
    pub unique_attributes: Vec<UniqueAttribute>,
    /// Attribute holding the schema version of an item
    pub schema_version_attribute: Option<String>,
}

impl EntityMetadata {
    /// Entity with a primary key template and no attributes yet
    pub fn new(name: impl Into<String>, table: Arc<Table>, primary_key: KeyTemplate) -> Self {
        Self {
            name: name.into(),
            table,
            primary_key,
            indexes: BTreeMap::new(),
            attributes: Vec::new(),
            unique_attributes: Vec::new(),
            schema_version_attribute: None,
        }
    }

    /// Declare an attribute
    pub fn with_attribute(mut self, attribute: AttributeMetadata) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Map the entity onto a table index
    pub fn with_index(mut self, index: impl Into<String>, template: KeyTemplate) -> Self {
        let _ = self.indexes.insert(index.into(), template);
        self
    }

    /// Require an attribute value to be unique
    pub fn with_unique_attribute(mut self, name: impl Into<String>, prefix: Option<&str>) -> Self {
        self.unique_attributes.push(UniqueAttribute {
            name: name.into(),
            prefix: prefix.map(str::to_string),
        });
        self
    }

    /// Gate versioned attributes on the value of `name`
    pub fn with_schema_version_attribute(mut self, name: impl Into<String>) -> Self {
        self.schema_version_attribute = Some(name.into());
        self
    }

    /// Declared attribute by entity field name
    pub fn attribute(&self, name: &str) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    /// Declared attribute by stored name
    pub fn attribute_by_wire_name(&self, wire_name: &str) -> Option<&AttributeMetadata> {
        self.attributes
            .iter()
            .find(|attribute| attribute.wire_name == wire_name)
    }

    /// Attributes the primary key is built from
    pub fn primary_key_attributes(&self) -> BTreeSet<String> {
        self.primary_key.placeholder_names()
    }

    /// Attributes any index key is built from
    pub fn index_key_attributes(&self) -> BTreeSet<String> {
        self.indexes
            .values()
            .flat_map(KeyTemplate::placeholder_names)
            .collect()
    }

    /// Attributes that contribute to any key
    pub fn key_attributes(&self) -> BTreeSet<String> {
        let mut names = self.primary_key_attributes();
        names.extend(self.index_key_attributes());
        names
    }

    /// Indexes whose key templates reference at least one of `changed`
    pub fn affected_indexes<'a>(
        &'a self,
        changed: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a KeyTemplate)> + 'a {
        self.indexes.iter().filter(move |(_, template)| {
            template
                .placeholder_names()
                .iter()
                .any(|name| changed.contains(name))
        })
    }

    /// Whether the entity declares unique attributes
    pub fn has_unique_attributes(&self) -> bool {
        !self.unique_attributes.is_empty()
    }
}
