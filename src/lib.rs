//! # DynamoDB Entity Mapper
//!
//! Maps typed entities onto a single-table DynamoDB design:
//! - Primary and secondary keys from `{{placeholder}}` templates
//! - Attribute renaming, custom conversion and schema versioning
//! - Unique attribute constraints enforced with sentinel items
//! - Condition, filter, key condition and update expressions with
//!   collision-free aliases
//! - Batches split to the per-call limits and run with bounded concurrency
//! - Write and read transactions with ordered cancellation reasons
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_entity::{
//!     AttributeKind, AttributeMetadata, DynamoTransport, Entity, EntityManager, EntityMetadata,
//!     Error, FindOptions, KeyTemplate, Registry, Table,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Order {
//!     customer_id: String,
//!     order_id: String,
//!     total: u32,
//! }
//!
//! impl Entity for Order {
//!     const NAME: &'static str = "order";
//! }
//!
//! #[derive(Serialize)]
//! struct Customer<'a> {
//!     customer_id: &'a str,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let table = Arc::new(Table::new("app", "PK").with_sort_key("SK"));
//!
//!     let mut registry = Registry::new();
//!     registry.register(
//!         EntityMetadata::new(
//!             "order",
//!             table,
//!             KeyTemplate::new("CUSTOMER#{{customer_id}}").with_sort_key("ORDER#{{order_id}}"),
//!         )
//!         .with_attribute(AttributeMetadata::new("customer_id", AttributeKind::String))
//!         .with_attribute(AttributeMetadata::new("order_id", AttributeKind::String))
//!         .with_attribute(AttributeMetadata::new("total", AttributeKind::Number)),
//!     )?;
//!
//!     let manager = EntityManager::new(DynamoTransport::from_env().await, registry);
//!
//!     let order = Order {
//!         customer_id: "c1".to_string(),
//!         order_id: "o1".to_string(),
//!         total: 42,
//!     };
//!     manager.create(&order).await?;
//!
//!     let orders = manager
//!         .find::<Order, _>(&Customer { customer_id: "c1" }, FindOptions::default())
//!         .await?;
//!     assert_eq!(orders.items.len(), 1);
//!
//!     Ok(())
//! }
//! ```
#![warn(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

mod error;
pub use error::{CancellationReason, Error};

/// Expression builders
pub mod expression;

/// Key templates and unique attribute keys
pub mod key;

/// Tables, entity metadata and the registry
pub mod metadata;

/// Table setup for local development and tests
pub mod setup;

/// Entity manager, batches and transactions
pub mod table;

/// Attribute transform layer
pub mod transform;

/// Request transport
pub mod transport;

/// Attributes of one stored item
pub type Item = HashMap<String, AttributeValue>;

pub use expression::{Condition, Expression, KeyCondition};
pub use metadata::{
    AttributeKind, AttributeMetadata, EntityMetadata, KeyTemplate, Registry, Table, Transformer,
};
pub use table::{
    BatchReadOutput, BatchWriteOutput, Config, Entity, EntityManager, FindOptions, OutputItems,
    ReadTransaction, ReadTransactionOutput, UpdateItemOptions, WriteTransaction,
    cancellation_reasons, chunk,
};
pub use transport::{DynamoTransport, TransactError, Transport};

// Re-export aws-config types for configuration
pub use aws_config::{
    BehaviorVersion, Region, SdkConfig, defaults,
    meta::region::{ProvideRegion, RegionProviderChain},
    retry::{RetryConfig, RetryMode},
    timeout::TimeoutConfig,
};

// Re-export aws-types for advanced configuration
pub use aws_types::sdk_config::Builder as SdkConfigBuilder;
