use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::transact_get_items::TransactGetItemsError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::error::{
    ConditionalCheckFailedException, TransactionCanceledException,
};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_dynamo::Error as SerdeDynamoError;
use std::error::Error as StdError;
use std::fmt;

type DynamoPutError = SdkError<PutItemError, Response>;
type DynamoUpdateError = SdkError<UpdateItemError, Response>;
type DynamoGetError = SdkError<GetItemError, Response>;
type DynamoQueryError = SdkError<QueryError, Response>;
type DynamoDeleteItemError = SdkError<DeleteItemError, Response>;
type DynamoCreateTableError = SdkError<CreateTableError, Response>;
type DynamoBatchWriteItemError = SdkError<BatchWriteItemError, Response>;
type DynamoBatchGetItemError = SdkError<BatchGetItemError, Response>;
type DynamoTransactWriteItemsError = SdkError<TransactWriteItemsError, Response>;
type DynamoTransactGetItemsError = SdkError<TransactGetItemsError, Response>;

/// Code DynamoDB reports for a transaction item whose condition failed
pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";

/// Per-item diagnostic of a cancelled transaction
///
/// Reasons are kept in the order of the items of the original request, so the
/// n-th reason always describes the n-th item. Items that did not cause the
/// abort carry the code `None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancellationReason {
    /// Cancellation code, e.g. `ConditionalCheckFailed` or `TransactionConflict`
    pub code: String,
    /// Human readable message, when the store supplied one
    pub message: Option<String>,
}

impl CancellationReason {
    /// Whether this item aborted the transaction
    pub fn is_failure(&self) -> bool {
        self.code != "None"
    }
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => f.write_str(&self.code),
        }
    }
}

/// Mapper error
#[derive(Debug)]
pub enum Error {
    /// A key template placeholder had no value
    MissingInterpolationValue {
        /// Template being resolved
        template: String,
        /// Placeholder without a value
        name: String,
    },
    /// A key template placeholder resolved to a value that is not a scalar
    InvalidInterpolationValue {
        /// Template being resolved
        template: String,
        /// Placeholder with the offending value
        name: String,
    },
    /// Update payload is not a non-empty mapping
    InvalidUpdateInput(String),
    /// Update mixes attributes that feed key templates with plain attributes
    InvalidPrimaryKeyAttributesUpdate {
        /// Attributes that participate in a key template
        key_attributes: Vec<String>,
        /// Attributes that do not
        other_attributes: Vec<String>,
    },
    /// A read transaction was cancelled by the store
    TransactionCancelled {
        /// Per-item reasons in request order
        reasons: Vec<CancellationReason>,
    },
    /// A write transaction was cancelled by the store
    WriteTransactionCancelled {
        /// Per-item reasons in request order
        reasons: Vec<CancellationReason>,
    },
    /// Transaction cancellation whose payload carried no readable reason list
    UnparsedCancellation(TransactionCanceledException),
    /// Transaction holds more items than one call accepts
    TransactionTooLarge {
        /// Number of items in the transaction
        items: usize,
        /// Per-call item limit
        limit: usize,
    },
    /// Two expression fragments bind one alias to different targets
    AliasCollision {
        /// Alias bound twice
        alias: String,
    },
    /// Query options that do not fit the queried key
    InvalidQuery(String),
    /// Chunk size of zero
    InvalidChunkLimit,
    /// Entity name registered twice
    DuplicateEntity(String),
    /// Entity name never registered
    UnknownEntity(String),
    /// Index not declared on the entity or its table
    UnknownIndex {
        /// Entity name
        entity: String,
        /// Index name
        index: String,
    },
    /// Entity metadata rejected at registration
    InvalidMetadata {
        /// Entity name
        entity: String,
        /// What is wrong
        reason: String,
    },
    /// Custom attribute transformer failed
    Transform {
        /// Attribute name
        attribute: String,
        /// Transformer message
        message: String,
    },
    /// Schema version attribute holds a non-numeric value
    InvalidSchemaVersion {
        /// Entity name
        entity: String,
        /// Stored value
        value: String,
    },
    /// Serde DynamoDB serialization/deserialization error
    SerdeDynamo(SerdeDynamoError),
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// DynamoDB PutItem operation error
    DynamoPutError(DynamoPutError),
    /// DynamoDB GetItem operation error
    DynamoGetError(DynamoGetError),
    /// DynamoDB Query operation error
    DynamoQueryError(DynamoQueryError),
    /// DynamoDB UpdateItem operation error
    DynamoUpdateError(DynamoUpdateError),
    /// DynamoDB DeleteItem operation error
    DynamoDeleteItemError(DynamoDeleteItemError),
    /// DynamoDB CreateTable operation error
    DynamoCreateTableError(DynamoCreateTableError),
    /// DynamoDB BatchWriteItem operation error
    DynamoBatchWriteItemError(DynamoBatchWriteItemError),
    /// DynamoDB BatchGetItem operation error
    DynamoBatchGetItemError(DynamoBatchGetItemError),
    /// DynamoDB TransactWriteItems operation error
    DynamoTransactWriteItemsError(DynamoTransactWriteItemsError),
    /// DynamoDB TransactGetItems operation error
    DynamoTransactGetItemsError(DynamoTransactGetItemsError),
}

impl Error {
    /// Check if the error is a DynamoDB ConditionalCheckFailedException
    ///
    /// Covers single-item writes as well as write transactions where at least
    /// one item failed its condition, which is how a unique attribute
    /// violation surfaces.
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            Error::DynamoPutError(e) => matches!(
                e.as_service_error(),
                Some(PutItemError::ConditionalCheckFailedException(
                    ConditionalCheckFailedException { .. }
                ))
            ),
            Error::DynamoUpdateError(e) => matches!(
                e.as_service_error(),
                Some(UpdateItemError::ConditionalCheckFailedException(
                    ConditionalCheckFailedException { .. }
                ))
            ),
            Error::DynamoDeleteItemError(e) => matches!(
                e.as_service_error(),
                Some(DeleteItemError::ConditionalCheckFailedException(
                    ConditionalCheckFailedException { .. }
                ))
            ),
            Error::WriteTransactionCancelled { reasons } => reasons
                .iter()
                .any(|reason| reason.code == CONDITIONAL_CHECK_FAILED),
            _ => false,
        }
    }

    /// Check if the store cancelled a transaction
    pub fn is_transaction_cancelled(&self) -> bool {
        matches!(
            self,
            Error::TransactionCancelled { .. }
                | Error::WriteTransactionCancelled { .. }
                | Error::UnparsedCancellation(_)
        )
    }

    /// Ordered per-item reasons of a cancelled transaction
    pub fn cancellation_reasons(&self) -> Option<&[CancellationReason]> {
        match self {
            Error::TransactionCancelled { reasons }
            | Error::WriteTransactionCancelled { reasons } => Some(reasons.as_slice()),
            _ => None,
        }
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::SerdeDynamo(_) | Error::Transform { .. })
    }

    /// Check if the error was raised while compiling a request, before any call
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Error::MissingInterpolationValue { .. }
                | Error::InvalidInterpolationValue { .. }
                | Error::InvalidUpdateInput(_)
                | Error::InvalidPrimaryKeyAttributesUpdate { .. }
                | Error::TransactionTooLarge { .. }
                | Error::AliasCollision { .. }
                | Error::InvalidQuery(_)
                | Error::InvalidChunkLimit
                | Error::UnknownEntity(_)
                | Error::UnknownIndex { .. }
        )
    }

    /// Check if the error is a DynamoDB-related error
    pub fn is_dynamodb_error(&self) -> bool {
        matches!(
            self,
            Error::BuildError(_)
                | Error::DynamoPutError(_)
                | Error::DynamoGetError(_)
                | Error::DynamoQueryError(_)
                | Error::DynamoUpdateError(_)
                | Error::DynamoDeleteItemError(_)
                | Error::DynamoCreateTableError(_)
                | Error::DynamoBatchWriteItemError(_)
                | Error::DynamoBatchGetItemError(_)
                | Error::DynamoTransactWriteItemsError(_)
                | Error::DynamoTransactGetItemsError(_)
        )
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(SerdeDynamoError, SerdeDynamo);
impl_from_error!(BuildError);
impl_from_error!(DynamoPutError);
impl_from_error!(DynamoGetError);
impl_from_error!(DynamoUpdateError);
impl_from_error!(DynamoQueryError);
impl_from_error!(DynamoDeleteItemError);
impl_from_error!(DynamoCreateTableError);
impl_from_error!(DynamoBatchWriteItemError);
impl_from_error!(DynamoBatchGetItemError);
impl_from_error!(DynamoTransactWriteItemsError);
impl_from_error!(DynamoTransactGetItemsError);

fn write_reasons(f: &mut fmt::Formatter<'_>, reasons: &[CancellationReason]) -> fmt::Result {
    for (index, reason) in reasons.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "[{index}] {reason}")?;
    }
    Ok(())
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingInterpolationValue { template, name } => write!(
                f,
                "No value supplied for placeholder '{name}' of key template '{template}'"
            ),
            Error::InvalidInterpolationValue { template, name } => write!(
                f,
                "Placeholder '{name}' of key template '{template}' must be a string, number or boolean"
            ),
            Error::InvalidUpdateInput(reason) => write!(f, "Invalid update input: {reason}"),
            Error::InvalidPrimaryKeyAttributesUpdate {
                key_attributes,
                other_attributes,
            } => write!(
                f,
                "Key attributes {key_attributes:?} can not be updated together with non-key attributes {other_attributes:?}"
            ),
            Error::TransactionCancelled { reasons } => {
                f.write_str("Transaction cancelled: ")?;
                write_reasons(f, reasons)
            }
            Error::WriteTransactionCancelled { reasons } => {
                f.write_str("Write transaction cancelled: ")?;
                write_reasons(f, reasons)
            }
            Error::UnparsedCancellation(e) => write!(f, "Transaction cancelled: {e}"),
            Error::TransactionTooLarge { items, limit } => write!(
                f,
                "Transaction holds {items} items, at most {limit} are allowed in one call"
            ),
            Error::AliasCollision { alias } => {
                write!(f, "Expression alias '{alias}' is bound to two different targets")
            }
            Error::InvalidQuery(reason) => write!(f, "Invalid query: {reason}"),
            Error::InvalidChunkLimit => f.write_str("Chunk limit must be at least 1"),
            Error::DuplicateEntity(name) => write!(f, "Entity '{name}' is already registered"),
            Error::UnknownEntity(name) => write!(f, "Entity '{name}' is not registered"),
            Error::UnknownIndex { entity, index } => {
                write!(f, "Entity '{entity}' has no index '{index}'")
            }
            Error::InvalidMetadata { entity, reason } => {
                write!(f, "Invalid metadata for entity '{entity}': {reason}")
            }
            Error::Transform { attribute, message } => {
                write!(f, "Failed to transform attribute '{attribute}': {message}")
            }
            Error::InvalidSchemaVersion { entity, value } => write!(
                f,
                "Schema version of entity '{entity}' must be a non-negative integer, got {value}"
            ),
            Error::SerdeDynamo(e) => write!(f, "DynamoDB serialization error: {}", e),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::DynamoPutError(e) => {
                write!(f, "DynamoDB PutItem operation failed: {}", e)
            }
            Error::DynamoGetError(e) => {
                write!(f, "DynamoDB GetItem operation failed: {}", e)
            }
            Error::DynamoQueryError(e) => {
                write!(f, "DynamoDB Query operation failed: {}", e)
            }
            Error::DynamoUpdateError(e) => {
                write!(f, "DynamoDB UpdateItem operation failed: {}", e)
            }
            Error::DynamoDeleteItemError(e) => {
                write!(f, "DynamoDB DeleteItem operation failed: {}", e)
            }
            Error::DynamoCreateTableError(e) => {
                write!(f, "DynamoDB CreateTable operation failed: {}", e)
            }
            Error::DynamoBatchWriteItemError(e) => {
                write!(f, "DynamoDB BatchWriteItem operation failed: {}", e)
            }
            Error::DynamoBatchGetItemError(e) => {
                write!(f, "DynamoDB BatchGetItem operation failed: {}", e)
            }
            Error::DynamoTransactWriteItemsError(e) => {
                write!(f, "DynamoDB TransactWriteItems operation failed: {}", e)
            }
            Error::DynamoTransactGetItemsError(e) => {
                write!(f, "DynamoDB TransactGetItems operation failed: {}", e)
            }
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(code: &str, message: Option<&str>) -> CancellationReason {
        CancellationReason {
            code: code.to_string(),
            message: message.map(str::to_string),
        }
    }

    #[test]
    fn test_is_dynamodb_error() {
        let err = Error::BuildError(BuildError::other("test"));
        assert!(err.is_dynamodb_error());
        assert!(!err.is_compile_error());
    }

    #[test]
    fn test_error_conversion() {
        let build_err = BuildError::other("test");
        let err: Error = build_err.into();
        assert!(matches!(err, Error::BuildError(_)));
    }

    #[test]
    fn test_conditional_check_failed_in_transaction() {
        let err = Error::WriteTransactionCancelled {
            reasons: vec![
                reason("None", None),
                reason(CONDITIONAL_CHECK_FAILED, Some("The conditional request failed")),
            ],
        };
        assert!(err.is_conditional_check_failed());
        assert!(err.is_transaction_cancelled());
        assert_eq!(err.cancellation_reasons().map(<[_]>::len), Some(2));
    }

    #[test]
    fn test_conflict_is_not_conditional_check_failed() {
        let err = Error::WriteTransactionCancelled {
            reasons: vec![reason("TransactionConflict", None)],
        };
        assert!(!err.is_conditional_check_failed());
    }

    #[test]
    fn test_display_lists_reasons_in_order() {
        let err = Error::WriteTransactionCancelled {
            reasons: vec![
                reason(CONDITIONAL_CHECK_FAILED, Some("failed")),
                reason("TransactionConflict", None),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Write transaction cancelled: [0] ConditionalCheckFailed: failed, [1] TransactionConflict"
        );
    }

    #[test]
    fn test_compile_errors_are_not_dynamodb_errors() {
        let err = Error::MissingInterpolationValue {
            template: "USER#{{id}}".to_string(),
            name: "id".to_string(),
        };
        assert!(err.is_compile_error());
        assert!(!err.is_dynamodb_error());
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_cancellation_reason_failure() {
        assert!(!reason("None", None).is_failure());
        assert!(reason("TransactionConflict", None).is_failure());
    }
}
