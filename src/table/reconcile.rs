//! Transaction outcome reconciliation
//!
//! A cancelled transaction comes back from the [`Transport`] as the raw
//! `TransactionCanceledException`. The reasons are turned into one ordered
//! list so the n-th reason always describes the n-th request item.

use aws_sdk_dynamodb::operation::transact_get_items::{TransactGetItemsInput, TransactGetItemsOutput};
use aws_sdk_dynamodb::operation::transact_write_items::{
    TransactWriteItemsInput, TransactWriteItemsOutput,
};
use aws_sdk_dynamodb::types::error::TransactionCanceledException;
use aws_sdk_dynamodb::types::{TransactGetItem, TransactWriteItem};
use tracing::{debug, warn};

use crate::Error;
use crate::error::CancellationReason;
use crate::transport::{TransactError, Transport};

/// Code of items that did not cause the cancellation
const NO_FAILURE: &str = "None";

/// Ordered cancellation reasons of a cancelled transaction
///
/// The structured reason list is preferred. Without it, the bracketed code
/// list at the end of the message (`... [ConditionalCheckFailed, None]`) is
/// used. `None` when neither is present.
pub fn cancellation_reasons(
    cancelled: &TransactionCanceledException,
) -> Option<Vec<CancellationReason>> {
    if let Some(reasons) = cancelled.cancellation_reasons.as_deref() {
        if !reasons.is_empty() {
            return Some(
                reasons
                    .iter()
                    .map(|reason| CancellationReason {
                        code: reason.code().unwrap_or(NO_FAILURE).to_string(),
                        message: reason.message().map(str::to_string),
                    })
                    .collect(),
            );
        }
    }

    let message = cancelled.message()?;
    let start = message.rfind('[')?;
    let end = start + message[start..].find(']')?;
    let reasons: Vec<CancellationReason> = message[start + 1..end]
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| CancellationReason {
            code: code.to_string(),
            message: None,
        })
        .collect();

    (!reasons.is_empty()).then_some(reasons)
}

fn cancellation_error(
    cancelled: TransactionCanceledException,
    aggregate: fn(Vec<CancellationReason>) -> Error,
) -> Error {
    match cancellation_reasons(&cancelled) {
        Some(reasons) => {
            debug!(
                failed = reasons.iter().filter(|r| r.is_failure()).count(),
                items = reasons.len(),
                "transaction cancelled"
            );
            aggregate(reasons)
        }
        None => {
            warn!(
                payload = cancelled.message().unwrap_or_default(),
                "transaction cancelled without readable reasons"
            );
            Error::UnparsedCancellation(cancelled)
        }
    }
}

fn ensure_within_limit(items: usize, limit: usize) -> Result<(), Error> {
    if items > limit {
        return Err(Error::TransactionTooLarge { items, limit });
    }
    Ok(())
}

/// Send a write transaction and fold a cancellation into one error
///
/// An empty transaction is not sent.
pub(crate) async fn transact_write<Tr: Transport>(
    transport: &Tr,
    items: Vec<TransactWriteItem>,
    limit: usize,
) -> Result<TransactWriteItemsOutput, Error> {
    if items.is_empty() {
        return Ok(TransactWriteItemsOutput::builder().build());
    }
    ensure_within_limit(items.len(), limit)?;
    debug!(items = items.len(), "dispatching write transaction");

    let input = TransactWriteItemsInput::builder()
        .set_transact_items(Some(items))
        .build()?;

    match transport.transact_write_items(input).await {
        Ok(output) => Ok(output),
        Err(TransactError::Cancelled(cancelled)) => Err(cancellation_error(cancelled, |reasons| {
            Error::WriteTransactionCancelled { reasons }
        })),
        Err(TransactError::Failed(e)) => Err(e),
    }
}

/// Send a read transaction and fold a cancellation into one error
pub(crate) async fn transact_get<Tr: Transport>(
    transport: &Tr,
    items: Vec<TransactGetItem>,
    limit: usize,
) -> Result<TransactGetItemsOutput, Error> {
    if items.is_empty() {
        return Ok(TransactGetItemsOutput::builder().build());
    }
    ensure_within_limit(items.len(), limit)?;
    debug!(items = items.len(), "dispatching read transaction");

    let input = TransactGetItemsInput::builder()
        .set_transact_items(Some(items))
        .build()?;

    match transport.transact_get_items(input).await {
        Ok(output) => Ok(output),
        Err(TransactError::Cancelled(cancelled)) => Err(cancellation_error(cancelled, |reasons| {
            Error::TransactionCancelled { reasons }
        })),
        Err(TransactError::Failed(e)) => Err(e),
    }
}
