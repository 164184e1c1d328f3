/// Test helpers and fixtures for entity manager integration tests
///
/// `MockTransport` keeps one table in memory and evaluates the expression
/// subset the compiler emits, so the manager can be driven end to end
/// without a store.
#[allow(dead_code)]
pub mod fixtures;

pub use aws_sdk_dynamodb::types::AttributeValue;
pub use dynamo_entity::{
    Condition, Config, EntityManager, Error, FindOptions, Item, KeyCondition, UpdateItemOptions,
};
pub use fixtures::*;
pub use serde::{Deserialize, Serialize};

use aws_sdk_dynamodb::operation::batch_get_item::{BatchGetItemInput, BatchGetItemOutput};
use aws_sdk_dynamodb::operation::batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput};
use aws_sdk_dynamodb::operation::delete_item::{DeleteItemError, DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::operation::get_item::{GetItemInput, GetItemOutput};
use aws_sdk_dynamodb::operation::put_item::{PutItemError, PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::operation::query::{QueryInput, QueryOutput};
use aws_sdk_dynamodb::operation::transact_get_items::{TransactGetItemsInput, TransactGetItemsOutput};
use aws_sdk_dynamodb::operation::transact_write_items::{
    TransactWriteItemsInput, TransactWriteItemsOutput,
};
use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemInput, UpdateItemOutput};
use aws_sdk_dynamodb::types::error::{ConditionalCheckFailedException, TransactionCanceledException};
use aws_sdk_dynamodb::types::{CancellationReason, ItemResponse, Select, TransactWriteItem};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::{Response, StatusCode};
use aws_smithy_types::body::SdkBody;
use dynamo_entity::{Registry, Transport, TransactError};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

type Names = HashMap<String, String>;
type Values = HashMap<String, AttributeValue>;

/// One request received by the mock, in arrival order
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub enum Request {
    Put(PutItemInput),
    Get(GetItemInput),
    Update(UpdateItemInput),
    Delete(DeleteItemInput),
    Query(QueryInput),
    BatchWrite(BatchWriteItemInput),
    BatchGet(BatchGetItemInput),
    TransactWrite(TransactWriteItemsInput),
    TransactGet(TransactGetItemsInput),
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<(String, String), Item>,
    requests: Vec<Request>,
    cancellation: Option<TransactionCanceledException>,
    leave_first_unprocessed: bool,
}

/// In-memory single-table store
#[derive(Debug)]
pub struct MockTransport {
    partition_key: String,
    sort_key: String,
    state: Mutex<State>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Self {
        Self {
            partition_key: "PK".to_string(),
            sort_key: "SK".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn key_of(&self, item: &Item) -> (String, String) {
        let part = |name: &str| match item.get(name) {
            Some(AttributeValue::S(value)) => value.clone(),
            other => panic!("item has no string key attribute {name}: {other:?}"),
        };
        (part(&self.partition_key), part(&self.sort_key))
    }

    /// Store an item as is
    pub fn insert(&self, item: Item) {
        let key = self.key_of(&item);
        let _ = self.lock().items.insert(key, item);
    }

    /// Stored item under a raw primary key
    pub fn stored(&self, pk: &str, sk: &str) -> Option<Item> {
        self.lock()
            .items
            .get(&(pk.to_string(), sk.to_string()))
            .cloned()
    }

    /// Every stored item
    pub fn stored_items(&self) -> Vec<Item> {
        self.lock().items.values().cloned().collect()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Cancel the next write transaction with `cancellation`, whatever it holds
    pub fn cancel_next_transaction(&self, cancellation: TransactionCanceledException) {
        self.lock().cancellation = Some(cancellation);
    }

    /// Leave the first request of every batch write unprocessed
    pub fn leave_first_unprocessed(&self) {
        self.lock().leave_first_unprocessed = true;
    }
}

fn http_response() -> Response {
    Response::new(StatusCode::try_from(400u16).unwrap(), SdkBody::empty())
}

fn condition_failed() -> ConditionalCheckFailedException {
    ConditionalCheckFailedException::builder()
        .message("The conditional request failed")
        .build()
}

fn resolve_name(names: &Names, token: &str) -> String {
    names
        .get(token.trim())
        .cloned()
        .unwrap_or_else(|| token.trim().to_string())
}

fn resolve_value(values: &Values, token: &str) -> AttributeValue {
    values
        .get(token.trim())
        .cloned()
        .unwrap_or_else(|| panic!("unbound value alias {token}"))
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<Ordering> {
    match (left, right) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            a.parse::<f64>().ok()?.partial_cmp(&b.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

/// Clauses of an `AND` conjunction, keeping `BETWEEN a AND b` whole
fn clauses(expression: &str) -> Vec<String> {
    let mut clauses: Vec<String> = Vec::new();
    for part in expression.split(" AND ") {
        match clauses.last_mut() {
            Some(last) if last.contains(" BETWEEN ") && !last.contains(" AND ") => {
                last.push_str(" AND ");
                last.push_str(part);
            }
            _ => clauses.push(part.to_string()),
        }
    }
    clauses
}

fn function_args<'a>(clause: &'a str, function: &str) -> Option<Vec<&'a str>> {
    let inner = clause.strip_prefix(function)?.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.split(',').map(str::trim).collect())
}

fn clause_holds(clause: &str, item: Option<&Item>, names: &Names, values: &Values) -> bool {
    let attribute = |token: &str| item.and_then(|item| item.get(&resolve_name(names, token)));

    if let Some(args) = function_args(clause, "attribute_not_exists") {
        return attribute(args[0]).is_none();
    }
    if let Some(args) = function_args(clause, "attribute_exists") {
        return attribute(args[0]).is_some();
    }
    if let Some(args) = function_args(clause, "begins_with") {
        return match (attribute(args[0]), resolve_value(values, args[1])) {
            (Some(AttributeValue::S(value)), AttributeValue::S(prefix)) => value.starts_with(&prefix),
            _ => false,
        };
    }
    if let Some(args) = function_args(clause, "contains") {
        return match (attribute(args[0]), resolve_value(values, args[1])) {
            (Some(AttributeValue::S(value)), AttributeValue::S(part)) => value.contains(&part),
            (Some(AttributeValue::Ss(set)), AttributeValue::S(part)) => set.contains(&part),
            _ => false,
        };
    }
    if let Some((name, range)) = clause.split_once(" BETWEEN ") {
        let (low, high) = range.split_once(" AND ").unwrap();
        let Some(value) = attribute(name) else {
            return false;
        };
        return compare(value, &resolve_value(values, low)).is_some_and(Ordering::is_ge)
            && compare(value, &resolve_value(values, high)).is_some_and(Ordering::is_le);
    }

    for (operator, accept) in [
        (" <> ", (|o: Ordering| o.is_ne()) as fn(Ordering) -> bool),
        (" <= ", Ordering::is_le),
        (" >= ", Ordering::is_ge),
        (" < ", Ordering::is_lt),
        (" > ", Ordering::is_gt),
        (" = ", Ordering::is_eq),
    ] {
        if let Some((name, value)) = clause.split_once(operator) {
            let expected = resolve_value(values, value);
            return match attribute(name) {
                Some(actual) if operator == " = " => actual == &expected,
                Some(actual) if operator == " <> " => actual != &expected,
                Some(actual) => compare(actual, &expected).is_some_and(accept),
                None => operator == " <> ",
            };
        }
    }
    panic!("unsupported clause {clause}")
}

fn holds(expression: Option<&str>, item: Option<&Item>, names: &Names, values: &Values) -> bool {
    expression.is_none_or(|expression| {
        clauses(expression)
            .iter()
            .all(|clause| clause_holds(clause, item, names, values))
    })
}

/// Apply `SET path = :value, ...` to `item`
fn apply_update(item: &mut Item, expression: &str, names: &Names, values: &Values) {
    let assignments = expression.strip_prefix("SET ").expect("only SET updates");
    for assignment in assignments.split(", ") {
        let (path, value) = assignment.split_once(" = ").unwrap();
        let value = resolve_value(values, value);
        let segments: Vec<String> = path.split('.').map(|s| resolve_name(names, s)).collect();
        set_path(item, &segments, value);
    }
}

fn set_path(item: &mut Item, segments: &[String], value: AttributeValue) {
    match segments {
        [last] => {
            let _ = item.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = item
                .entry(head.clone())
                .or_insert_with(|| AttributeValue::M(HashMap::new()));
            if let AttributeValue::M(inner) = entry {
                set_path(inner, rest, value);
            }
        }
        [] => {}
    }
}

struct Checked {
    key: (String, String),
    passed: bool,
}

impl State {
    fn get(&self, key: &(String, String)) -> Option<&Item> {
        self.items.get(key)
    }
}

impl Transport for MockTransport {
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::Put(input.clone()));

        let item = input.item.unwrap_or_default();
        let key = self.key_of(&item);
        let names = input.expression_attribute_names.unwrap_or_default();
        let values = input.expression_attribute_values.unwrap_or_default();
        if !holds(input.condition_expression.as_deref(), state.get(&key), &names, &values) {
            return Err(SdkError::service_error(
                PutItemError::ConditionalCheckFailedException(condition_failed()),
                http_response(),
            )
            .into());
        }
        let _ = state.items.insert(key, item);
        Ok(PutItemOutput::builder().build())
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::Get(input.clone()));

        let key = self.key_of(&input.key.unwrap_or_default());
        Ok(GetItemOutput::builder()
            .set_item(state.get(&key).cloned())
            .build())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<UpdateItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::Update(input.clone()));

        let key_item = input.key.unwrap_or_default();
        let key = self.key_of(&key_item);
        let names = input.expression_attribute_names.unwrap_or_default();
        let values = input.expression_attribute_values.unwrap_or_default();
        if !holds(input.condition_expression.as_deref(), state.get(&key), &names, &values) {
            return Err(SdkError::service_error(
                UpdateItemError::ConditionalCheckFailedException(condition_failed()),
                http_response(),
            )
            .into());
        }

        let item = state.items.entry(key).or_insert(key_item);
        apply_update(
            item,
            input.update_expression.as_deref().unwrap_or_default(),
            &names,
            &values,
        );
        Ok(UpdateItemOutput::builder()
            .set_attributes(Some(item.clone()))
            .build())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::Delete(input.clone()));

        let key = self.key_of(&input.key.unwrap_or_default());
        let names = input.expression_attribute_names.unwrap_or_default();
        let values = input.expression_attribute_values.unwrap_or_default();
        if !holds(input.condition_expression.as_deref(), state.get(&key), &names, &values) {
            return Err(SdkError::service_error(
                DeleteItemError::ConditionalCheckFailedException(condition_failed()),
                http_response(),
            )
            .into());
        }
        let _ = state.items.remove(&key);
        Ok(DeleteItemOutput::builder().build())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::Query(input.clone()));

        let names = input.expression_attribute_names.clone().unwrap_or_default();
        let values = input.expression_attribute_values.clone().unwrap_or_default();
        let key_clauses = clauses(input.key_condition_expression.as_deref().unwrap_or_default());
        let sort_attribute = key_clauses
            .get(1)
            .and_then(|clause| {
                let start = clause.find('#')?;
                let end = clause[start..]
                    .find([' ', ',', ')'])
                    .map_or(clause.len(), |end| start + end);
                Some(resolve_name(&names, &clause[start..end]))
            })
            .unwrap_or_else(|| self.sort_key.clone());

        let mut matched: Vec<&Item> = state
            .items
            .values()
            .filter(|item| {
                key_clauses
                    .iter()
                    .all(|clause| clause_holds(clause, Some(item), &names, &values))
            })
            .collect();
        matched.sort_by(|a, b| match (a.get(&sort_attribute), b.get(&sort_attribute)) {
            (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        });
        if input.scan_index_forward == Some(false) {
            matched.reverse();
        }

        if let Some(start) = &input.exclusive_start_key {
            let start = self.key_of(start);
            if let Some(position) = matched.iter().position(|item| self.key_of(item) == start) {
                matched.drain(..=position);
            }
        }

        let mut last_evaluated_key = None;
        if let Some(limit) = input.limit.and_then(|limit| usize::try_from(limit).ok()) {
            if matched.len() > limit {
                matched.truncate(limit);
                last_evaluated_key = matched.last().map(|item| {
                    [&self.partition_key, &self.sort_key]
                        .into_iter()
                        .filter_map(|name| Some((name.clone(), item.get(name)?.clone())))
                        .collect::<Item>()
                });
            }
        }

        let scanned = matched.len();
        let items: Vec<Item> = matched
            .into_iter()
            .filter(|item| holds(input.filter_expression.as_deref(), Some(item), &names, &values))
            .cloned()
            .collect();
        let count = items.len();

        Ok(QueryOutput::builder()
            .set_items((input.select != Some(Select::Count)).then_some(items))
            .count(i32::try_from(count).unwrap())
            .scanned_count(i32::try_from(scanned).unwrap())
            .set_last_evaluated_key(last_evaluated_key)
            .build())
    }

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::BatchWrite(input.clone()));

        let mut unprocessed = HashMap::new();
        for (table, requests) in input.request_items.unwrap_or_default() {
            let mut requests = requests.into_iter();
            if state.leave_first_unprocessed {
                if let Some(first) = requests.next() {
                    let _ = unprocessed.insert(table.clone(), vec![first]);
                }
            }
            for request in requests {
                if let Some(put) = request.put_request {
                    let key = self.key_of(&put.item);
                    let _ = state.items.insert(key, put.item);
                }
                if let Some(delete) = request.delete_request {
                    let _ = state.items.remove(&self.key_of(&delete.key));
                }
            }
        }

        Ok(BatchWriteItemOutput::builder()
            .set_unprocessed_items(Some(unprocessed))
            .build())
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput, Error> {
        let mut state = self.lock();
        state.requests.push(Request::BatchGet(input.clone()));

        let mut responses = HashMap::new();
        for (table, keys) in input.request_items.unwrap_or_default() {
            let found: Vec<Item> = keys
                .keys
                .iter()
                .filter_map(|key| state.get(&self.key_of(key)).cloned())
                .collect();
            let _ = responses.insert(table, found);
        }
        Ok(BatchGetItemOutput::builder()
            .set_responses(Some(responses))
            .build())
    }

    async fn transact_write_items(
        &self,
        input: TransactWriteItemsInput,
    ) -> Result<TransactWriteItemsOutput, TransactError> {
        let mut state = self.lock();
        state.requests.push(Request::TransactWrite(input.clone()));
        if let Some(cancellation) = state.cancellation.take() {
            return Err(TransactError::Cancelled(cancellation));
        }

        let items = input.transact_items.unwrap_or_default();
        let checked: Vec<Checked> = items.iter().map(|item| self.check(&state, item)).collect();
        if checked.iter().any(|check| !check.passed) {
            let reasons = checked
                .iter()
                .map(|check| {
                    let builder = CancellationReason::builder();
                    if check.passed {
                        builder.code("None").build()
                    } else {
                        builder
                            .code("ConditionalCheckFailed")
                            .message("The conditional request failed")
                            .build()
                    }
                })
                .collect();
            return Err(TransactError::Cancelled(
                TransactionCanceledException::builder()
                    .message("Transaction cancelled, please refer cancellation reasons for specific reasons")
                    .set_cancellation_reasons(Some(reasons))
                    .build(),
            ));
        }

        for (item, check) in items.into_iter().zip(checked) {
            if let Some(put) = item.put {
                let _ = state.items.insert(check.key, put.item);
            } else if let Some(update) = item.update {
                let names = update.expression_attribute_names.unwrap_or_default();
                let values = update.expression_attribute_values.unwrap_or_default();
                let stored = state.items.entry(check.key).or_insert(update.key);
                apply_update(stored, &update.update_expression, &names, &values);
            } else if item.delete.is_some() {
                let _ = state.items.remove(&check.key);
            }
        }
        Ok(TransactWriteItemsOutput::builder().build())
    }

    async fn transact_get_items(
        &self,
        input: TransactGetItemsInput,
    ) -> Result<TransactGetItemsOutput, TransactError> {
        let mut state = self.lock();
        state.requests.push(Request::TransactGet(input.clone()));

        let responses = input
            .transact_items
            .unwrap_or_default()
            .into_iter()
            .map(|item| {
                let found = item.get.and_then(|get| state.get(&self.key_of(&get.key)).cloned());
                ItemResponse::builder().set_item(found).build()
            })
            .collect();
        Ok(TransactGetItemsOutput::builder()
            .set_responses(Some(responses))
            .build())
    }
}

impl MockTransport {
    fn check(&self, state: &State, item: &TransactWriteItem) -> Checked {
        let (key, condition, names, values) = if let Some(put) = &item.put {
            (
                self.key_of(&put.item),
                put.condition_expression.as_deref(),
                put.expression_attribute_names.clone(),
                put.expression_attribute_values.clone(),
            )
        } else if let Some(update) = &item.update {
            (
                self.key_of(&update.key),
                update.condition_expression.as_deref(),
                update.expression_attribute_names.clone(),
                update.expression_attribute_values.clone(),
            )
        } else if let Some(delete) = &item.delete {
            (
                self.key_of(&delete.key),
                delete.condition_expression.as_deref(),
                delete.expression_attribute_names.clone(),
                delete.expression_attribute_values.clone(),
            )
        } else if let Some(check) = &item.condition_check {
            (
                self.key_of(&check.key),
                Some(check.condition_expression.as_str()),
                check.expression_attribute_names.clone(),
                check.expression_attribute_values.clone(),
            )
        } else {
            panic!("empty transaction item")
        };

        let passed = holds(
            condition,
            state.get(&key),
            &names.unwrap_or_default(),
            &values.unwrap_or_default(),
        );
        Checked { key, passed }
    }
}

/// Manager over a fresh mock store with every fixture entity registered
#[allow(dead_code)]
pub fn manager() -> EntityManager<MockTransport> {
    EntityManager::new(MockTransport::new(), registry())
}

/// Registry holding every fixture entity
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    for metadata in [
        widget_metadata(),
        user_metadata(),
        order_metadata(),
        article_metadata(),
    ] {
        let _ = registry.register(metadata).unwrap();
    }
    registry
}

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}
