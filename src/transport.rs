//! I/O boundary
//!
//! The compiler produces AWS SDK request inputs; a [`Transport`] sends them.
//! Transactions return [`TransactError`] so a cancellation arrives as a value
//! with its reason list rather than as an opaque service error.

use aws_config::{BehaviorVersion, SdkConfig, defaults};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::transact_get_items::{
    TransactGetItemsError, TransactGetItemsInput, TransactGetItemsOutput,
};
use aws_sdk_dynamodb::operation::transact_write_items::{
    TransactWriteItemsError, TransactWriteItemsInput, TransactWriteItemsOutput,
};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemInput, UpdateItemOutput};
use aws_sdk_dynamodb::types::error::TransactionCanceledException;
use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
use std::future::Future;
use std::time::Duration;

use crate::Error;

/// Failure of a transactional call
#[derive(Debug)]
pub enum TransactError {
    /// The store cancelled the transaction, payload as received
    Cancelled(TransactionCanceledException),
    /// Any other failure, passed through unchanged
    Failed(Error),
}

impl From<Error> for TransactError {
    fn from(e: Error) -> Self {
        TransactError::Failed(e)
    }
}

/// Executes compiled requests against a store
pub trait Transport: Send + Sync {
    /// PutItem
    fn put_item(
        &self,
        input: PutItemInput,
    ) -> impl Future<Output = Result<PutItemOutput, Error>> + Send;

    /// GetItem
    fn get_item(
        &self,
        input: GetItemInput,
    ) -> impl Future<Output = Result<GetItemOutput, Error>> + Send;

    /// UpdateItem
    fn update_item(
        &self,
        input: UpdateItemInput,
    ) -> impl Future<Output = Result<UpdateItemOutput, Error>> + Send;

    /// DeleteItem
    fn delete_item(
        &self,
        input: DeleteItemInput,
    ) -> impl Future<Output = Result<DeleteItemOutput, Error>> + Send;

    /// Query
    fn query(&self, input: QueryInput) -> impl Future<Output = Result<QueryOutput, Error>> + Send;

    /// BatchWriteItem
    fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> impl Future<Output = Result<BatchWriteItemOutput, Error>> + Send;

    /// BatchGetItem
    fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> impl Future<Output = Result<BatchGetItemOutput, Error>> + Send;

    /// TransactWriteItems
    fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> impl Future<Output = Result<TransactWriteItemsOutput, TransactError>> + Send;

    /// TransactGetItems
    fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> impl Future<Output = Result<TransactGetItemsOutput, TransactError>> + Send;
}

/// AWS config with the defaults this crate runs with
///
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
pub async fn aws_config_defaults() -> SdkConfig {
    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// [`Transport`] backed by the AWS SDK client
#[derive(Clone, Debug)]
pub struct DynamoTransport {
    client: Client,
}

impl DynamoTransport {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client built from an explicit AWS config
    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    /// Client built from the environment with [`aws_config_defaults`]
    pub async fn from_env() -> Self {
        Self::from_config(&aws_config_defaults().await)
    }

    /// Underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Transport for DynamoTransport {
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, Error> {
        Ok(self
            .client
            .put_item()
            .set_table_name(input.table_name)
            .set_item(input.item)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await?)
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, Error> {
        Ok(self
            .client
            .get_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_consistent_read(input.consistent_read)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await?)
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, Error> {
        Ok(self
            .client
            .update_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_update_expression(input.update_expression)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await?)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, Error> {
        Ok(self
            .client
            .delete_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await?)
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, Error> {
        Ok(self
            .client
            .query()
            .set_table_name(input.table_name)
            .set_index_name(input.index_name)
            .set_select(input.select)
            .set_limit(input.limit)
            .set_consistent_read(input.consistent_read)
            .set_scan_index_forward(input.scan_index_forward)
            .set_exclusive_start_key(input.exclusive_start_key)
            .set_key_condition_expression(input.key_condition_expression)
            .set_filter_expression(input.filter_expression)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await?)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, Error> {
        Ok(self
            .client
            .batch_write_item()
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await?)
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput, Error> {
        Ok(self
            .client
            .batch_get_item()
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await?)
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, TransactError> {
        self.client
            .transact_write_items()
            .set_transact_items(input.transact_items)
            .set_client_request_token(input.client_request_token)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await
            .map_err(|e| {
                if let Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) =
                    e.as_service_error()
                {
                    return TransactError::Cancelled(cancelled.clone());
                }
                TransactError::Failed(e.into())
            })
    }

    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, TransactError> {
        self.client
            .transact_get_items()
            .set_transact_items(input.transact_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(|e| {
                if let Some(TransactGetItemsError::TransactionCanceledException(cancelled)) =
                    e.as_service_error()
                {
                    return TransactError::Cancelled(cancelled.clone());
                }
                TransactError::Failed(e.into())
            })
    }
}
