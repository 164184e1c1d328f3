use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeMap;

use super::{Aliases, CONDITION_ROLE, Expression, FILTER_ROLE};

/// Precondition on one attribute
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// `=`
    Eq(AttributeValue),
    /// `<>`
    Ne(AttributeValue),
    /// `<`
    Lt(AttributeValue),
    /// `<=`
    Le(AttributeValue),
    /// `>`
    Gt(AttributeValue),
    /// `>=`
    Ge(AttributeValue),
    /// `begins_with`
    BeginsWith(AttributeValue),
    /// `contains`
    Contains(AttributeValue),
    /// `BETWEEN low AND high`
    Between(AttributeValue, AttributeValue),
    /// `attribute_exists`
    Exists,
    /// `attribute_not_exists`
    NotExists,
}

impl Condition {
    fn render(&self, attribute: &str, aliases: &mut Aliases) -> String {
        let name = aliases.name(attribute);
        let mut value = |value: &AttributeValue| aliases.value(&[attribute], value.clone());

        match self {
            Condition::Eq(v) => format!("{name} = {}", value(v)),
            Condition::Ne(v) => format!("{name} <> {}", value(v)),
            Condition::Lt(v) => format!("{name} < {}", value(v)),
            Condition::Le(v) => format!("{name} <= {}", value(v)),
            Condition::Gt(v) => format!("{name} > {}", value(v)),
            Condition::Ge(v) => format!("{name} >= {}", value(v)),
            Condition::BeginsWith(v) => format!("begins_with({name}, {})", value(v)),
            Condition::Contains(v) => format!("contains({name}, {})", value(v)),
            Condition::Between(low, high) => {
                let low = value(low);
                let high = value(high);
                format!("{name} BETWEEN {low} AND {high}")
            }
            Condition::Exists => format!("attribute_exists({name})"),
            Condition::NotExists => format!("attribute_not_exists({name})"),
        }
    }
}

fn build(role: &'static str, conditions: &BTreeMap<String, Condition>) -> Expression {
    let mut aliases = Aliases::new(role);
    let clauses: Vec<String> = conditions
        .iter()
        .map(|(attribute, condition)| condition.render(attribute, &mut aliases))
        .collect();
    aliases.finish(clauses.join(" AND "))
}

/// Precondition fragment, one clause per attribute, ANDed
///
/// An empty mapping yields an empty fragment; callers must leave the
/// condition out of the request in that case.
pub fn build_condition_expression(conditions: &BTreeMap<String, Condition>) -> Expression {
    build(CONDITION_ROLE, conditions)
}

/// Query filter fragment, same grammar as [`build_condition_expression`]
pub fn build_filter_expression(conditions: &BTreeMap<String, Condition>) -> Expression {
    build(FILTER_ROLE, conditions)
}
