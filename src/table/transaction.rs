use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsOutput;
use aws_sdk_dynamodb::types::{TransactGetItem, TransactWriteItem};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::Item;
use crate::error::Error;
use crate::expression::Condition;
use crate::metadata::EntityMetadata;
use crate::table::compile;
use crate::table::operations::{Entity, EntityManager, attributes_of, decode, delta_of};
use crate::table::reconcile::{transact_get, transact_write};
use crate::transport::Transport;

/// Writes applied atomically
///
/// Items are sent in the order they were added; the reasons of a cancelled
/// transaction follow the same order.
#[must_use = "a write transaction does nothing until executed"]
#[derive(Debug)]
pub struct WriteTransaction<'a, Tr> {
    manager: &'a EntityManager<Tr>,
    items: Vec<TransactWriteItem>,
}

impl<'a, Tr: Transport> WriteTransaction<'a, Tr> {
    pub(crate) fn new(manager: &'a EntityManager<Tr>) -> Self {
        Self {
            manager,
            items: Vec::new(),
        }
    }

    /// Create an entity, reserving its unique attribute values
    pub fn create<T: Entity>(&mut self, entity: &T) -> Result<&mut Self, Error> {
        let metadata = self.manager.metadata::<T>()?;
        let attributes = attributes_of(entity)?;
        let sentinels = compile::unique_puts(&metadata, &attributes, self.manager.config())?;

        self.items
            .push(compile::transact_put(compile::create_input(&metadata, attributes)?)?);
        self.items.extend(sentinels);
        Ok(self)
    }

    /// Write an entity under `conditions`, replacing any stored item
    pub fn put<T: Entity>(
        &mut self,
        entity: &T,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<&mut Self, Error> {
        let metadata = self.manager.metadata::<T>()?;
        let input = compile::put_input(&metadata, attributes_of(entity)?, conditions)?;
        self.items.push(compile::transact_put(input)?);
        Ok(self)
    }

    /// Update an entity in place
    ///
    /// Unique attributes can not be changed here since their sentinels depend
    /// on the stored values; use [`EntityManager::update`].
    pub fn update<T, K, D>(
        &mut self,
        key: &K,
        delta: &D,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<&mut Self, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
        D: Serialize + ?Sized,
    {
        let metadata = self.manager.metadata::<T>()?;
        let delta = delta_of(delta)?;
        if let Some(unique) = metadata
            .unique_attributes
            .iter()
            .find(|unique| delta.contains_key(&unique.name))
        {
            return Err(Error::InvalidUpdateInput(format!(
                "unique attribute '{}' can not be updated inside a transaction",
                unique.name
            )));
        }

        let input = compile::update_input(
            &metadata,
            &attributes_of(key)?,
            delta,
            conditions,
            self.manager.config(),
        )?;
        self.items.push(compile::transact_update(input)?);
        Ok(self)
    }

    /// Delete an entity
    ///
    /// Sentinels of unique attributes are released only when `current`, the
    /// stored entity, is given.
    pub fn delete<T, K>(
        &mut self,
        key: &K,
        current: Option<&T>,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<&mut Self, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.manager.metadata::<T>()?;
        let input = compile::delete_input(&metadata, &attributes_of(key)?, conditions)?;
        self.items.push(compile::transact_delete(input)?);

        if let Some(current) = current {
            let attributes = attributes_of(current)?;
            self.items.extend(compile::unique_deletes(
                &metadata,
                &attributes,
                self.manager.config(),
            )?);
        }
        Ok(self)
    }

    /// Require `conditions` to hold on a stored entity without writing it
    pub fn condition_check<T, K>(
        &mut self,
        key: &K,
        conditions: &BTreeMap<String, Condition>,
    ) -> Result<&mut Self, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.manager.metadata::<T>()?;
        self.items.push(compile::condition_check(
            &metadata,
            &attributes_of(key)?,
            conditions,
        )?);
        Ok(self)
    }

    /// Add a compiled item
    pub fn push(&mut self, item: TransactWriteItem) -> &mut Self {
        self.items.push(item);
        self
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no item was added
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items compiled so far
    pub fn items(&self) -> &[TransactWriteItem] {
        &self.items
    }

    /// Send the transaction
    ///
    /// A cancellation fails with [`Error::WriteTransactionCancelled`] carrying
    /// one reason per item in the order the items were added.
    pub async fn execute(self) -> Result<TransactWriteItemsOutput, Error> {
        transact_write(
            self.manager.transport(),
            self.items,
            self.manager.config().transaction_limit,
        )
        .await
    }
}

/// Reads served from one consistent snapshot
#[must_use = "a read transaction does nothing until executed"]
#[derive(Debug)]
pub struct ReadTransaction<'a, Tr> {
    manager: &'a EntityManager<Tr>,
    entities: Vec<Arc<EntityMetadata>>,
    items: Vec<TransactGetItem>,
}

impl<'a, Tr: Transport> ReadTransaction<'a, Tr> {
    pub(crate) fn new(manager: &'a EntityManager<Tr>) -> Self {
        Self {
            manager,
            entities: Vec::new(),
            items: Vec::new(),
        }
    }

    /// Read the entity stored under `key`
    pub fn get<T, K>(&mut self, key: &K) -> Result<&mut Self, Error>
    where
        T: Entity,
        K: Serialize + ?Sized,
    {
        let metadata = self.manager.metadata::<T>()?;
        let input = compile::get_input(&metadata, &attributes_of(key)?, false)?;
        self.items.push(compile::transact_get(input)?);
        self.entities.push(metadata);
        Ok(self)
    }

    /// Number of reads
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no read was added
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Send the transaction
    pub async fn execute(self) -> Result<ReadTransactionOutput, Error> {
        let output = transact_get(
            self.manager.transport(),
            self.items,
            self.manager.config().transaction_limit,
        )
        .await?;

        let mut responses = output.responses.unwrap_or_default().into_iter();
        let entries = self
            .entities
            .into_iter()
            .map(|metadata| {
                let item = responses.next().and_then(|response| response.item);
                (metadata, item)
            })
            .collect();
        Ok(ReadTransactionOutput { entries })
    }
}

/// Items of a read transaction, in the order of the reads
#[derive(Debug)]
pub struct ReadTransactionOutput {
    entries: Vec<(Arc<EntityMetadata>, Option<Item>)>,
}

impl ReadTransactionOutput {
    /// Number of reads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transaction held no reads
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entity of the `index`-th read, `None` if nothing is stored there
    pub fn get<T: Entity>(&self, index: usize) -> Result<Option<T>, Error> {
        let Some((metadata, item)) = self.entries.get(index) else {
            return Ok(None);
        };
        if metadata.name != T::NAME {
            return Err(Error::UnknownEntity(T::NAME.to_string()));
        }
        match item {
            Some(item) => decode(metadata, item.clone()),
            None => Ok(None),
        }
    }
}
