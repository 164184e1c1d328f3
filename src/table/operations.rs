use aws_sdk_dynamodb::types::{AttributeValue, Select};
use serde::{Serialize, de::DeserializeOwned};
use serde_dynamo::{from_item, to_attribute_value, to_item};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Item;
use crate::error::Error;
use crate::expression::{Condition, ensure_key_attributes_isolated};
use crate::key::primary_key;
use crate::metadata::{ENTITY_NAME_ATTRIBUTE, EntityMetadata, Registry};
use crate::table::compile;
use crate::table::reconcile::transact_write;
use crate::table::transaction::{ReadTransaction, WriteTransaction};
use crate::table::types::{Config, FindOptions, OutputItems, UpdateItemOptions};
use crate::transform::{UnknownAttributes, deserialize};
use crate::transport::Transport;

/// Entity type stored by an [`EntityManager`]
///
/// Field names of the serialized entity are the attribute names declared in
/// the entity metadata registered under [`Entity::NAME`].
///
/// # Example
///
/// ```rust
/// use dynamo_entity::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct User {
///     id: String,
///     email: String,
/// }
///
/// impl Entity for User {
///     const NAME: &'static str = "user";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Registered entity name
    const NAME: &'static str;
}

/// Domain attributes of any serializable value
pub(crate) fn attributes_of<S: Serialize + ?Sized>(value: &S) -> Result<Item, Error> {
    Ok(to_item::<_, HashMap<String, AttributeValue>>(value)?)
}

/// Domain attributes of an update delta
///
/// The delta must serialize to a non-empty mapping.
pub(crate) fn delta_of<D: Serialize + ?Sized>(delta: &D) -> Result<Item, Error> {
    match to_attribute_value::<_, AttributeValue>(delta)? {
        AttributeValue::M(attributes) if !attributes.is_empty() => Ok(attributes),
        AttributeValue::M(_) => Err(Error::InvalidUpdateInput(
            "update delta must contain at least one attribute".to_string(),
        )),
        other => Err(Error::InvalidUpdateInput(format!(
            "update delta must be a mapping of attributes, got {other:?}"
        ))),
    }
}

/// Entity of a stored item, `None` when the item belongs to another entity
pub(crate) fn decode<T: Entity>(metadata: &EntityMetadata, item: Item) -> Result<Option<T>, Error> {
    let owner = match item.get(ENTITY_NAME_ATTRIBUTE) {
        Some(AttributeValue::S(owner)) => Some(owner.as_str()),
        _ => None,
    };
    if owner != Some(metadata.name.as_str()) {
        warn!(
            entity = %metadata.name,
            owner = owner.unwrap_or_default(),
            "skipping item of another entity"
        );
        return Ok(None);
    }

    let attributes = deserialize(item, metadata, UnknownAttributes::Keep)?;
    Ok(Some(from_item(attributes)?))
}

/// Entry point for reading and writing entities
///
/// Holds the transport, the registry and the configuration. Cloning is cheap
/// and clones share the transport and the registry.
///
/// # Example
///
/// ```rust,no_run
/// use dynamo_entity::{
///     AttributeKind, AttributeMetadata, DynamoTransport, Entity, EntityManager, EntityMetadata,
///     Error, KeyTemplate, Registry, Table,
/// };
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct User {
///     id: String,
///     email: String,
/// }
///
/// impl Entity for User {
///     const NAME: &'static str = "user";
/// }
///
/// async fn example() -> Result<(), Error> {
///     let table = Arc::new(Table::new("app", "PK").with_sort_key("SK"));
///     let mut registry = Registry::new();
///     registry.register(
///         EntityMetadata::new(
///             "user",
///             table,
///             KeyTemplate::new("USER#{{id}}").with_sort_key("USER#{{id}}"),
///         )
///         .with_attribute(AttributeMetadata::new("id", AttributeKind::String))
///         .with_attribute(AttributeMetadata::new("email", AttributeKind::String))
///         .with_unique_attribute("email", None),
///     )?;
///
///     let manager = EntityManager::new(DynamoTransport::from_env().await, registry);
///     let user = User {
///         id: "1".to_string(),
///         email: "user@example.com".to_string(),
///     };
///     manager.create(&user).await?;
///
///     #[derive(Serialize)]
///     struct UserKey<'a> {
///         id: &'a str,
///     }
///     let found: Option<User> = manager.find_one(&UserKey { id: "1" }).await?;
///     assert!(found.is_some());
///     Ok(())
/// }
/// ```
pub struct EntityManager<Tr> {
    transport: Arc<Tr>,
    registry: Arc<Registry>,
    config: Config,
}

impl<Tr> Clone for EntityManager<Tr> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<Tr> fmt::Debug for EntityManager<Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<Tr: Transport> EntityManager<Tr> {
    /// Manager with the default [`Config`]
    pub fn new(transport: Tr, registry: Registry) -> Self {
        Self {
            transport: Arc::new(transport),
            registry: Arc::new(registry),
            config: Config::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered entities
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Transport requests are sent through
    pub fn transport(&self) -> &Tr {
        &self.transport
    }

    pub(crate) fn metadata<T: Entity>(&self) -> Result<Arc<EntityMetadata>, Error> {
        self.registry.get(T::NAME)
    }

    /// Start a write transaction
    pub fn write_transaction(&self) -> WriteTransaction<'_, Tr> {
        WriteTransaction::new(self)
    }

    /// Start a read transaction
    pub fn read_transaction(&self) -> ReadTransaction<'_, Tr> {
        ReadTransaction::new(self)
    }

    /// Store a new entity
    ///
    /// Fails with a conditional check failure if an item with the same key
    /// exists. Entities with unique attributes are written in one transaction
    /// together with a sentinel item per unique value, so a taken value
    /// cancels the whole write.
    pub async fn create<T: Entity>(&self, entity: &T) -> Result<(), Error> {
        let metadata = self.metadata::<T>()?;
        let attributes = attributes_of(entity)?;

        if !metadata.has_unique_attributes() {
            let input = compile::create_input(&metadata, attributes)?;
            let _ = self.transport.put_item(input).await?;
            return Ok(());
        }

        let sentinels = compile::unique_puts(&metadata, &attributes, &self.config)?;
        let mut items = vec![compile::transact_put(compile::create_input(
            &metadata, attributes,
        )?)?];
        items.extend(sentinels);

        debug!(entity = %metadata.name, items = items.len(), "creating entity with unique attributes");
        let _ = transact_write(self.transport.as_ref(), items, self.config.transaction_limit).await?;
        Ok(())
    }

    /// Entity stored under `key`
    ///
    /// `key` serializes to the attributes the primary key template needs.
    pub async fn find_one<T, K>(&self, key: &K) -> Result<Option<T>, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.metadata::<T>()?;
        let item = self.fetch(&metadata, &attributes_of(key)?, false).await?;
        match item {
            Some(item) => decode(&metadata, item),
            None => Ok(None),
        }
    }

    /// Whether an entity is stored under `key`
    pub async fn exists<T, K>(&self, key: &K) -> Result<bool, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        Ok(self.find_one::<T, K>(key).await?.is_some())
    }

    async fn fetch(
        &self,
        metadata: &EntityMetadata,
        key_values: &Item,
        consistent_read: bool,
    ) -> Result<Option<Item>, Error> {
        let input = compile::get_input(metadata, key_values, consistent_read)?;
        Ok(self.transport.get_item(input).await?.item)
    }

    /// One page of entities under a partition
    ///
    /// `partition` serializes to the attributes the partition pattern of the
    /// primary key, or of `options.index`, needs.
    pub async fn find<T, K>(&self, partition: &K, options: FindOptions) -> Result<OutputItems<T>, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.metadata::<T>()?;
        let input = compile::query_input(&metadata, &attributes_of(partition)?, &options, None)?;
        let output = self.transport.query(input).await?;

        let mut items = Vec::new();
        for item in output.items.unwrap_or_default() {
            if let Some(entity) = decode(&metadata, item)? {
                items.push(entity);
            }
        }

        Ok(OutputItems {
            items,
            count: output.count,
            scanned_count: output.scanned_count,
            last_evaluated_key: output.last_evaluated_key,
        })
    }

    /// Number of entities under a partition, counted by the store on one page
    pub async fn count<T, K>(&self, partition: &K, options: FindOptions) -> Result<usize, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.metadata::<T>()?;
        let input = compile::query_input(
            &metadata,
            &attributes_of(partition)?,
            &options,
            Some(Select::Count),
        )?;
        let output = self.transport.query(input).await?;
        Ok(usize::try_from(output.count).unwrap_or_default())
    }

    /// Apply `delta` to the entity stored under `key`
    ///
    /// - attributes feeding a key template must be updated on their own;
    /// - index key attributes are recomputed in place;
    /// - a changed primary key moves the item (delete + put) in one transaction;
    /// - changed unique attributes swap their sentinels in one transaction with
    ///   the update.
    ///
    /// Returns the updated entity. The in-place path fails with a conditional
    /// check failure when no item exists, the other paths return `None`.
    pub async fn update<T, K, D>(
        &self,
        key: &K,
        delta: &D,
        options: UpdateItemOptions,
    ) -> Result<Option<T>, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
        D: Serialize + ?Sized,
    {
        let metadata = self.metadata::<T>()?;
        let key_values = attributes_of(key)?;
        let mut delta = delta_of(delta)?;
        ensure_key_attributes_isolated(
            delta.keys().map(String::as_str),
            &metadata.key_attributes(),
        )?;

        let primary = metadata.primary_key_attributes();
        if delta.keys().any(|name| primary.contains(name)) {
            let mut target = key_values.clone();
            target.extend(delta.clone());
            if primary_key(&metadata, &target)? != primary_key(&metadata, &key_values)? {
                return self
                    .move_entity(&metadata, &key_values, delta, &options.conditions)
                    .await;
            }

            // Same key, nothing to move
            delta.retain(|name, _| !primary.contains(name));
            if delta.is_empty() {
                return match self.fetch(&metadata, &key_values, true).await? {
                    Some(item) => decode(&metadata, item),
                    None => Ok(None),
                };
            }
        }

        let touches_unique = metadata
            .unique_attributes
            .iter()
            .any(|unique| delta.contains_key(&unique.name));
        if touches_unique {
            return self
                .update_with_unique(&metadata, &key_values, delta, &options.conditions)
                .await;
        }

        let input = compile::update_input(
            &metadata,
            &key_values,
            delta,
            &options.conditions,
            &self.config,
        )?;
        let output = self.transport.update_item(input).await?;
        match output.attributes {
            Some(item) => decode(&metadata, item),
            None => Ok(None),
        }
    }

    /// Re-create the entity at the key `delta` resolves to
    async fn move_entity<T: Entity>(
        &self,
        metadata: &EntityMetadata,
        key_values: &Item,
        delta: Item,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<Option<T>, Error> {
        let Some(stored) = self.fetch(metadata, key_values, true).await? else {
            return Ok(None);
        };
        let current = deserialize(stored, metadata, UnknownAttributes::Keep)?;
        let swaps = compile::unique_swaps(metadata, &current, &delta, &self.config)?;

        let mut moved = current;
        moved.extend(delta);

        let mut delete_conditions = conditions.clone();
        let _ = delete_conditions
            .entry(metadata.table.partition_key.clone())
            .or_insert(Condition::Exists);
        let mut items = vec![
            compile::transact_delete(compile::delete_input(
                metadata,
                key_values,
                &delete_conditions,
            )?)?,
            compile::transact_put(compile::create_input(metadata, moved.clone())?)?,
        ];
        items.extend(swaps);

        debug!(entity = %metadata.name, items = items.len(), "moving entity to a new key");
        let _ = transact_write(self.transport.as_ref(), items, self.config.transaction_limit).await?;
        Ok(Some(from_item(moved)?))
    }

    /// Update plus sentinel swaps in one transaction
    async fn update_with_unique<T: Entity>(
        &self,
        metadata: &EntityMetadata,
        key_values: &Item,
        delta: Item,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<Option<T>, Error> {
        let Some(stored) = self.fetch(metadata, key_values, true).await? else {
            return Ok(None);
        };
        let current = deserialize(stored, metadata, UnknownAttributes::Keep)?;
        let swaps = compile::unique_swaps(metadata, &current, &delta, &self.config)?;

        let update =
            compile::update_input(metadata, key_values, delta, conditions, &self.config)?;
        let mut items = vec![compile::transact_update(update)?];
        items.extend(swaps);

        debug!(entity = %metadata.name, items = items.len(), "updating entity with unique attributes");
        let _ = transact_write(self.transport.as_ref(), items, self.config.transaction_limit).await?;

        match self.fetch(metadata, key_values, true).await? {
            Some(item) => decode(metadata, item),
            None => Ok(None),
        }
    }

    /// Delete the entity stored under `key`
    ///
    /// Entities with unique attributes release their sentinels in the same
    /// transaction. Deleting a missing entity without conditions succeeds.
    pub async fn delete<T, K>(
        &self,
        key: &K,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<(), Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.metadata::<T>()?;
        let key_values = attributes_of(key)?;
        let input = compile::delete_input(&metadata, &key_values, conditions)?;

        if !metadata.has_unique_attributes() {
            let _ = self.transport.delete_item(input).await?;
            return Ok(());
        }

        let Some(stored) = self.fetch(&metadata, &key_values, true).await? else {
            return Ok(());
        };
        let current = deserialize(stored, &metadata, UnknownAttributes::Keep)?;
        let mut items = vec![compile::transact_delete(input)?];
        items.extend(compile::unique_deletes(&metadata, &current, &self.config)?);

        debug!(entity = %metadata.name, items = items.len(), "deleting entity with unique attributes");
        let _ = transact_write(self.transport.as_ref(), items, self.config.transaction_limit).await?;
        Ok(())
    }
}
