use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::types::{
    ConsumedCapacity, DeleteRequest, ItemCollectionMetrics, KeysAndAttributes, PutRequest,
    ReturnConsumedCapacity, ReturnItemCollectionMetrics, WriteRequest,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{Error, Item};
use crate::key::primary_key;
use crate::metadata::EntityMetadata;
use crate::table::compile;
use crate::table::helpers::batch_processor::BatchProcessor;
use crate::table::operations::{Entity, EntityManager, attributes_of, decode};
use crate::transport::Transport;

/// Merged output of the BatchWriteItem calls of one batch write
///
/// Unprocessed requests are returned as the store reported them and are not
/// retried.
#[must_use = "batch write results contain unprocessed items that should be checked"]
#[derive(Debug, Default)]
pub struct BatchWriteOutput {
    /// Requests the store did not process, by table
    pub unprocessed_items: HashMap<String, Vec<WriteRequest>>,
    /// The capacity units consumed by every call
    pub consumed_capacity: Vec<ConsumedCapacity>,
    /// Item collections affected by the writes, by table
    pub item_collection_metrics: HashMap<String, Vec<ItemCollectionMetrics>>,
}

impl BatchWriteOutput {
    /// Whether every request was processed
    pub fn is_success(&self) -> bool {
        self.unprocessed_items.values().all(Vec::is_empty)
    }

    /// Number of requests the store did not process
    pub fn unprocessed_count(&self) -> usize {
        self.unprocessed_items.values().map(Vec::len).sum()
    }

    fn merge(&mut self, output: BatchWriteItemOutput) {
        for (table, requests) in output.unprocessed_items.unwrap_or_default() {
            self.unprocessed_items
                .entry(table)
                .or_default()
                .extend(requests);
        }
        for (table, metrics) in output.item_collection_metrics.unwrap_or_default() {
            self.item_collection_metrics
                .entry(table)
                .or_default()
                .extend(metrics);
        }
        self.consumed_capacity
            .extend(output.consumed_capacity.unwrap_or_default());
    }
}

/// Merged output of the BatchGetItem calls of one batch read
#[must_use = "batch read results contain unprocessed keys that should be checked"]
#[derive(Debug)]
pub struct BatchReadOutput<T> {
    /// Entities found, in no particular order
    pub items: Vec<T>,
    /// Keys the store did not process, by table
    pub unprocessed_keys: HashMap<String, KeysAndAttributes>,
    /// The capacity units consumed by every call
    pub consumed_capacity: Vec<ConsumedCapacity>,
}

impl<T> Default for BatchReadOutput<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            unprocessed_keys: HashMap::new(),
            consumed_capacity: Vec::new(),
        }
    }
}

impl<T: Entity> BatchReadOutput<T> {
    /// Whether every key was processed
    pub fn is_success(&self) -> bool {
        self.unprocessed_keys.values().all(|keys| keys.keys.is_empty())
    }

    fn merge(&mut self, metadata: &EntityMetadata, output: BatchGetItemOutput) -> Result<(), Error> {
        for items in output.responses.unwrap_or_default().into_values() {
            for item in items {
                if let Some(entity) = decode(metadata, item)? {
                    self.items.push(entity);
                }
            }
        }

        for (table, unprocessed) in output.unprocessed_keys.unwrap_or_default() {
            match self.unprocessed_keys.get_mut(&table) {
                Some(keys) => keys.keys.extend(unprocessed.keys),
                None => {
                    let _ = self.unprocessed_keys.insert(table, unprocessed);
                }
            }
        }

        self.consumed_capacity
            .extend(output.consumed_capacity.unwrap_or_default());
        Ok(())
    }
}

fn reject_unique(metadata: &EntityMetadata) -> Result<(), Error> {
    if metadata.has_unique_attributes() {
        return Err(Error::InvalidMetadata {
            entity: metadata.name.clone(),
            reason: "entities with unique attributes can not be written in batches".to_string(),
        });
    }
    Ok(())
}

impl<Tr: Transport> EntityManager<Tr> {
    /// Put `puts` and delete the entities under `delete_keys`
    ///
    /// Requests are split into BatchWriteItem calls of at most
    /// [`Config::batch_write_limit`](crate::Config::batch_write_limit) and sent
    /// with bounded concurrency. Puts overwrite existing items.
    pub async fn batch_write<T, K>(&self, puts: &[T], delete_keys: &[K]) -> Result<BatchWriteOutput, Error>
    where
        T: Entity,
        K: Serialize,
    {
        let metadata = self.metadata::<T>()?;
        if puts.is_empty() && delete_keys.is_empty() {
            return Ok(BatchWriteOutput::default());
        }
        reject_unique(&metadata)?;

        let mut requests = Vec::with_capacity(puts.len() + delete_keys.len());
        for entity in puts {
            let item = compile::entity_item(&metadata, attributes_of(entity)?)?;
            let put = PutRequest::builder().set_item(Some(item)).build()?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }
        for key in delete_keys {
            let key = primary_key(&metadata, &attributes_of(key)?)?;
            let delete = DeleteRequest::builder().set_key(Some(key)).build()?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }

        debug!(
            entity = %metadata.name,
            puts = puts.len(),
            deletes = delete_keys.len(),
            "batch write"
        );

        let table = metadata.table.name.as_str();
        let transport = self.transport();
        let output = BatchProcessor::new(self.config().batch_write_limit, self.config().concurrency)
            .process(
                requests,
                |batch: Vec<WriteRequest>| async move {
                    let input = BatchWriteItemInput::builder()
                        .request_items(table, batch)
                        .return_consumed_capacity(ReturnConsumedCapacity::Total)
                        .return_item_collection_metrics(ReturnItemCollectionMetrics::Size)
                        .build()?;
                    transport.batch_write_item(input).await
                },
                BatchWriteOutput::default(),
                |acc: &mut BatchWriteOutput, output: BatchWriteItemOutput| {
                    acc.merge(output);
                    Ok(())
                },
            )
            .await?;

        if !output.is_success() {
            warn!(
                entity = %metadata.name,
                unprocessed = output.unprocessed_count(),
                "batch write left unprocessed items"
            );
        }
        Ok(output)
    }

    /// Entities stored under `keys`
    ///
    /// Keys are split into BatchGetItem calls of at most
    /// [`Config::batch_read_limit`](crate::Config::batch_read_limit). Missing
    /// entities are simply absent from the output.
    pub async fn batch_get<T, K>(&self, keys: &[K]) -> Result<BatchReadOutput<T>, Error>
    where
        T: Entity,
        K: Serialize,
    {
        let metadata = self.metadata::<T>()?;
        let keys = keys
            .iter()
            .map(|key| primary_key(&metadata, &attributes_of(key)?))
            .collect::<Result<Vec<_>, Error>>()?;

        debug!(entity = %metadata.name, keys = keys.len(), "batch get");

        let table = metadata.table.name.as_str();
        let transport = self.transport();
        BatchProcessor::new(self.config().batch_read_limit, self.config().concurrency)
            .process(
                keys,
                |batch: Vec<Item>| async move {
                    let keys = KeysAndAttributes::builder().set_keys(Some(batch)).build()?;
                    let input = BatchGetItemInput::builder()
                        .request_items(table, keys)
                        .return_consumed_capacity(ReturnConsumedCapacity::Total)
                        .build()?;
                    transport.batch_get_item(input).await
                },
                BatchReadOutput::default(),
                |acc: &mut BatchReadOutput<T>, output: BatchGetItemOutput| {
                    acc.merge(&metadata, output)
                },
            )
            .await
    }
}
