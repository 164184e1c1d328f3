/// Common test fixtures and data structures
///
/// Entities share one table with a global index, the layout of a
/// single-table design.
use super::{Deserialize, Serialize};
use dynamo_entity::{
    AttributeKind, AttributeMetadata, Entity, EntityMetadata, KeyTemplate, Table,
};
use std::sync::Arc;

pub const TABLE: &str = "app";

pub fn table() -> Arc<Table> {
    Arc::new(
        Table::new(TABLE, "PK")
            .with_sort_key("SK")
            .with_global_index("GSI1", "GSI1PK", Some("GSI1SK")),
    )
}

/// Entity indexed by its container
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Widget {
    pub id: String,
    #[serde(rename = "ContainerId")]
    pub container_id: String,
    pub name: String,
}

impl Entity for Widget {
    const NAME: &'static str = "widget";
}

pub fn widget_metadata() -> EntityMetadata {
    EntityMetadata::new(
        Widget::NAME,
        table(),
        KeyTemplate::new("WIDGET#{{id}}").with_sort_key("WIDGET#{{id}}"),
    )
    .with_attribute(AttributeMetadata::new("id", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("ContainerId", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("name", AttributeKind::String))
    .with_index(
        "GSI1",
        KeyTemplate::new("CONTAINER#{{ContainerId}}").with_sort_key("WIDGET#{{id}}"),
    )
}

pub fn widget(id: &str, container_id: &str, name: &str) -> Widget {
    Widget {
        id: id.into(),
        container_id: container_id.into(),
        name: name.into(),
    }
}

/// Entity with a unique email
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl Entity for User {
    const NAME: &'static str = "user";
}

pub fn user_metadata() -> EntityMetadata {
    EntityMetadata::new(
        User::NAME,
        table(),
        KeyTemplate::new("USER#{{id}}").with_sort_key("PROFILE"),
    )
    .with_attribute(AttributeMetadata::new("id", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("email", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("name", AttributeKind::String).with_wire_name("display_name"))
    .with_unique_attribute("email", None)
}

pub fn user(id: &str, email: &str) -> User {
    User {
        id: id.into(),
        email: email.into(),
        name: format!("user {id}"),
    }
}

/// Entity sharing a partition with its customer
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Order {
    pub customer_id: String,
    pub order_id: String,
    pub total: u32,
    pub status: String,
}

impl Entity for Order {
    const NAME: &'static str = "order";
}

pub fn order_metadata() -> EntityMetadata {
    EntityMetadata::new(
        Order::NAME,
        table(),
        KeyTemplate::new("CUSTOMER#{{customer_id}}").with_sort_key("ORDER#{{order_id}}"),
    )
    .with_attribute(AttributeMetadata::new("customer_id", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("order_id", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("total", AttributeKind::Number))
    .with_attribute(AttributeMetadata::new("status", AttributeKind::String))
}

pub fn order(customer_id: &str, order_id: &str, total: u32) -> Order {
    Order {
        customer_id: customer_id.into(),
        order_id: order_id.into(),
        total,
        status: "OPEN".into(),
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct IdKey<'a> {
    pub id: &'a str,
}

#[derive(Serialize, Debug, Clone)]
pub struct CustomerKey<'a> {
    pub customer_id: &'a str,
}

#[derive(Serialize, Debug, Clone)]
pub struct OrderKey<'a> {
    pub customer_id: &'a str,
    pub order_id: &'a str,
}

/// Entity whose `summary` exists from schema version 2 on
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Article {
    pub id: String,
    pub version: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Entity for Article {
    const NAME: &'static str = "article";
}

pub fn article_metadata() -> EntityMetadata {
    EntityMetadata::new(
        Article::NAME,
        table(),
        KeyTemplate::new("ARTICLE#{{id}}").with_sort_key("ARTICLE#{{id}}"),
    )
    .with_attribute(AttributeMetadata::new("id", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("version", AttributeKind::Number))
    .with_attribute(AttributeMetadata::new("title", AttributeKind::String))
    .with_attribute(AttributeMetadata::new("summary", AttributeKind::String).since(2))
    .with_schema_version_attribute("version")
}
