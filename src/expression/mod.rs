//! Expression fragments
//!
//! Every builder returns an [`Expression`]: the expression string plus the
//! name and value alias maps it refers to. Aliases carry a role prefix
//! (`CE_`, `FE_`, `UE_`, `KY_CE_`) followed by the attribute name, so the
//! fragments of one request merge without clashes.

mod condition;
mod key_condition;
mod update;

pub use condition::{Condition, build_condition_expression, build_filter_expression};
pub use key_condition::{KeyCondition, build_key_condition_expression};
pub use update::{
    DEFAULT_NESTED_KEY_SEPARATOR, UpdateOptions, build_update_expression,
    ensure_key_attributes_isolated,
};

use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::Error;

/// Alias role of condition expressions
pub const CONDITION_ROLE: &str = "CE_";
/// Alias role of query filter expressions
pub const FILTER_ROLE: &str = "FE_";
/// Alias role of update expressions
pub const UPDATE_ROLE: &str = "UE_";
/// Alias role of key condition expressions
pub const KEY_CONDITION_ROLE: &str = "KY_CE_";

/// Expression string with the aliases it uses
///
/// Alias maps are `None` rather than empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    /// Expression string
    pub expression: String,
    /// Name alias (`#...`) to attribute name
    pub names: Option<HashMap<String, String>>,
    /// Value alias (`:...`) to value
    pub values: Option<HashMap<String, AttributeValue>>,
}

impl Expression {
    /// Whether the fragment holds no expression
    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    /// Join two fragments with `separator` and union their alias maps
    ///
    /// Fails with [`Error::AliasCollision`] when one alias is bound to two
    /// different targets.
    pub fn merge(self, other: Expression, separator: &str) -> Result<Expression, Error> {
        let expression = match (self.expression.is_empty(), other.expression.is_empty()) {
            (_, true) => self.expression,
            (true, false) => other.expression,
            (false, false) => format!("{}{}{}", self.expression, separator, other.expression),
        };

        Ok(Expression {
            expression,
            names: merge_aliases(self.names, other.names)?,
            values: merge_aliases(self.values, other.values)?,
        })
    }

    /// Both fragments must hold
    pub fn and(self, other: Expression) -> Result<Expression, Error> {
        self.merge(other, " AND ")
    }

    /// Union of the alias maps of both fragments, keeping only this expression string
    pub fn with_aliases_of(self, other: &Expression) -> Result<Expression, Error> {
        Ok(Expression {
            expression: self.expression,
            names: merge_aliases(self.names, other.names.clone())?,
            values: merge_aliases(self.values, other.values.clone())?,
        })
    }
}

pub(crate) fn merge_aliases<V: PartialEq>(
    left: Option<HashMap<String, V>>,
    right: Option<HashMap<String, V>>,
) -> Result<Option<HashMap<String, V>>, Error> {
    let (mut merged, right) = match (left, right) {
        (None, right) => return Ok(right),
        (left, None) => return Ok(left),
        (Some(left), Some(right)) => (left, right),
    };

    for (alias, target) in right {
        match merged.entry(alias) {
            Entry::Vacant(entry) => {
                let _ = entry.insert(target);
            }
            Entry::Occupied(entry) => {
                if *entry.get() != target {
                    return Err(Error::AliasCollision {
                        alias: entry.key().clone(),
                    });
                }
            }
        }
    }
    Ok(Some(merged))
}

/// Alias text for an attribute name or path segment
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Hands out the aliases of one fragment
#[derive(Debug)]
pub(crate) struct Aliases {
    role: &'static str,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Aliases {
    pub(crate) fn new(role: &'static str) -> Self {
        Self {
            role,
            names: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Name alias of `real`, reused for every further reference
    pub(crate) fn name(&mut self, real: &str) -> String {
        let base = format!("#{}{}", self.role, sanitize(real));
        let mut alias = base.clone();
        let mut occurrence = 0;
        loop {
            match self.names.entry(alias) {
                Entry::Vacant(entry) => {
                    let alias = entry.key().clone();
                    let _ = entry.insert(real.to_string());
                    return alias;
                }
                Entry::Occupied(entry) if entry.get() == real => return entry.key().clone(),
                Entry::Occupied(_) => {
                    occurrence += 1;
                    alias = format!("{base}_{occurrence}");
                }
            }
        }
    }

    /// Fresh value alias for a value at `segments`
    pub(crate) fn value(&mut self, segments: &[&str], value: AttributeValue) -> String {
        let path: Vec<String> = segments.iter().map(|segment| sanitize(segment)).collect();
        let base = format!(":{}{}", self.role, path.join("_"));
        let mut alias = base.clone();
        let mut occurrence = 0;
        while self.values.contains_key(&alias) {
            occurrence += 1;
            alias = format!("{base}_{occurrence}");
        }
        let _ = self.values.insert(alias.clone(), value);
        alias
    }

    pub(crate) fn finish(self, expression: String) -> Expression {
        Expression {
            expression,
            names: (!self.names.is_empty()).then_some(self.names),
            values: (!self.values.is_empty()).then_some(self.values),
        }
    }
}
