mod batch;
pub mod compile;
mod helpers;
mod operations;
mod reconcile;
mod transaction;
mod types;

pub use batch::{BatchReadOutput, BatchWriteOutput};
pub use helpers::chunk;
pub use operations::{Entity, EntityManager};
pub use reconcile::cancellation_reasons;
pub use transaction::{ReadTransaction, ReadTransactionOutput, WriteTransaction};
pub use types::{Config, FindOptions, OutputItems, UpdateItemOptions};
