use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeMap;

use super::{Aliases, Expression, KEY_CONDITION_ROLE};

/// Comparison on one key attribute of a query
#[derive(Clone, Debug, PartialEq)]
pub enum KeyCondition {
    /// `=`
    Eq(AttributeValue),
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
    /// `BETWEEN low AND high`
    Between(AttributeValue, AttributeValue),
}

/// Key condition fragment, exactly one comparison per key attribute, ANDed
pub fn build_key_condition_expression(conditions: &BTreeMap<String, KeyCondition>) -> Expression {
    let mut aliases = Aliases::new(KEY_CONDITION_ROLE);
    let mut clauses = Vec::with_capacity(conditions.len());

    for (attribute, condition) in conditions {
        let name = aliases.name(attribute);
        let mut value = |value: &AttributeValue| aliases.value(&[attribute.as_str()], value.clone());

        let clause = match condition {
            KeyCondition::Eq(v) => format!("{name} = {}", value(v)),
            KeyCondition::Lt(v) => format!("{name} < {}", value(v)),
            KeyCondition::Le(v) => format!("{name} <= {}", value(v)),
            KeyCondition::Gt(v) => format!("{name} > {}", value(v)),
            KeyCondition::Ge(v) => format!("{name} >= {}", value(v)),
            KeyCondition::BeginsWith(v) => format!("begins_with({name}, {})", value(v)),
            KeyCondition::Between(low, high) => {
                let low = value(low);
                let high = value(high);
                format!("{name} BETWEEN {low} AND {high}")
            }
        };
        clauses.push(clause);
    }

    aliases.finish(clauses.join(" AND "))
}
