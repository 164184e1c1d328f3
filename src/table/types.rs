use std::collections::BTreeMap;

use crate::Item;
use crate::expression::{Condition, DEFAULT_NESTED_KEY_SEPARATOR, KeyCondition, UpdateOptions};
use crate::key::DEFAULT_UNIQUE_PREFIX;
use crate::table::helpers::batch_processor::{
    BATCH_READ_SIZE, BATCH_WRITE_SIZE, DEFAULT_CONCURRENCY, TRANSACTION_SIZE,
};

/// Per-call limits and naming conventions of an [`EntityManager`](crate::EntityManager)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Items per BatchWriteItem call
    pub batch_write_limit: usize,
    /// Keys per BatchGetItem call
    pub batch_read_limit: usize,
    /// Items per TransactWriteItems / TransactGetItems call
    pub transaction_limit: usize,
    /// Batch chunks in flight at once
    pub concurrency: usize,
    /// Separator of nested attribute paths in update deltas
    pub nested_key_separator: String,
    /// Prefix of unique attribute sentinel keys
    pub unique_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_write_limit: BATCH_WRITE_SIZE,
            batch_read_limit: BATCH_READ_SIZE,
            transaction_limit: TRANSACTION_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            nested_key_separator: DEFAULT_NESTED_KEY_SEPARATOR.to_string(),
            unique_prefix: DEFAULT_UNIQUE_PREFIX.to_string(),
        }
    }
}

impl Config {
    pub(crate) fn update_options(&self) -> UpdateOptions {
        UpdateOptions {
            nested_key_separator: self.nested_key_separator.clone(),
        }
    }
}

/// One page of query results
#[must_use = "query results should be used or you'll lose the fetched data"]
#[derive(Clone, Debug)]
pub struct OutputItems<T> {
    /// Items of this page belonging to the queried entity
    pub items: Vec<T>,
    /// Count reported by the store
    pub count: i32,
    /// Scanned count reported by the store
    pub scanned_count: i32,
    /// Key to pass as `exclusive_start_key` for the next page, as returned by the store
    pub last_evaluated_key: Option<Item>,
}

impl<T> OutputItems<T> {
    /// Whether the store has more pages
    pub fn has_more(&self) -> bool {
        self.last_evaluated_key.is_some()
    }
}

impl<T> Default for OutputItems<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            scanned_count: 0,
            last_evaluated_key: None,
        }
    }
}

/// Query options of [`EntityManager::find`](crate::EntityManager::find)
#[derive(Clone, Debug, PartialEq)]
pub struct FindOptions {
    /// Query this index instead of the primary key
    pub index: Option<String>,
    /// Comparison on the resolved sort key attribute
    pub sort_key: Option<KeyCondition>,
    /// Conditions on non-key attributes, applied by the store after reading
    pub filter: BTreeMap<String, Condition>,
    /// Maximum items read
    pub limit: Option<i32>,
    /// Ascending sort key order
    pub scan_index_forward: bool,
    /// Strongly consistent read
    pub consistent_read: bool,
    /// Continue after this key
    pub exclusive_start_key: Option<Item>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            index: None,
            sort_key: None,
            filter: BTreeMap::new(),
            limit: None,
            scan_index_forward: true,
            consistent_read: false,
            exclusive_start_key: None,
        }
    }
}

impl FindOptions {
    /// Query a secondary index
    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Restrict the sort key
    pub fn where_sort_key(mut self, condition: KeyCondition) -> Self {
        self.sort_key = Some(condition);
        self
    }

    /// Add a filter condition
    pub fn filter(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        let _ = self.filter.insert(attribute.into(), condition);
        self
    }

    /// Limit the items read
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Descending sort key order
    pub fn descending(mut self) -> Self {
        self.scan_index_forward = false;
        self
    }

    /// Strongly consistent read
    pub fn consistent(mut self) -> Self {
        self.consistent_read = true;
        self
    }

    /// Continue a previous query
    pub fn start_from(mut self, key: Option<Item>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// Options of [`EntityManager::update`](crate::EntityManager::update)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateItemOptions {
    /// Conditions the stored item must meet
    pub conditions: BTreeMap<String, Condition>,
}

impl UpdateItemOptions {
    /// Add a condition on the stored item
    pub fn with_condition(mut self, attribute: impl Into<String>, condition: Condition) -> Self {
        let _ = self.conditions.insert(attribute.into(), condition);
        self
    }
}
