use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::BTreeSet;

use crate::metadata::{EntityMetadata, IndexKind};
use crate::{Error, Item};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Split a template into literal text and trimmed placeholder names
///
/// An opening `{{` without a closing `}}` is kept as literal text.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Placeholder(after_open[..end].trim()));
        rest = &after_open[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

fn render(template: &str, name: &str, value: Option<&AttributeValue>) -> Result<String, Error> {
    match value {
        None | Some(AttributeValue::Null(_)) => Err(Error::MissingInterpolationValue {
            template: template.to_string(),
            name: name.to_string(),
        }),
        Some(AttributeValue::S(value)) => Ok(value.clone()),
        Some(AttributeValue::N(value)) => Ok(value.clone()),
        Some(AttributeValue::Bool(value)) => Ok(value.to_string()),
        Some(_) => Err(Error::InvalidInterpolationValue {
            template: template.to_string(),
            name: name.to_string(),
        }),
    }
}

/// Substitute every `{{name}}` of `template` with its value from `values`
///
/// Placeholders may repeat and may carry whitespace inside the braces.
/// Strings are used verbatim, numbers as their decimal text and booleans as
/// `true`/`false`. A missing or `NULL` value fails with
/// [`Error::MissingInterpolationValue`], any other kind of value with
/// [`Error::InvalidInterpolationValue`].
pub fn interpolate(template: &str, values: &Item) -> Result<String, Error> {
    let mut output = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Placeholder(name) => {
                output.push_str(&render(template, name, values.get(name))?);
            }
        }
    }
    Ok(output)
}

/// Placeholder names of `template`, without substitution
pub fn placeholder_names(template: &str) -> BTreeSet<String> {
    segments(template)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.to_string()),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Primary key attributes of an entity, resolved from its field values
pub fn primary_key(metadata: &EntityMetadata, values: &Item) -> Result<Item, Error> {
    let table = &metadata.table;
    let mut key = Item::new();

    let partition = interpolate(&metadata.primary_key.partition_key, values)?;
    let _ = key.insert(table.partition_key.clone(), AttributeValue::S(partition));

    if let (Some(attribute), Some(pattern)) = (&table.sort_key, &metadata.primary_key.sort_key) {
        let sort = interpolate(pattern, values)?;
        let _ = key.insert(attribute.clone(), AttributeValue::S(sort));
    }

    Ok(key)
}

/// Index key attributes of an entity, resolved from its field values
///
/// With `only`, just the named indexes are resolved. The partition key of a
/// local index is the table partition key and is left to [`primary_key`].
pub fn index_keys<'a, I>(
    metadata: &EntityMetadata,
    values: &Item,
    only: Option<I>,
) -> Result<Item, Error>
where
    I: IntoIterator<Item = &'a String>,
{
    let names: Vec<&String> = match only {
        Some(names) => names.into_iter().collect(),
        None => metadata.indexes.keys().collect(),
    };

    let mut keys = Item::new();
    for name in names {
        let unknown = || Error::UnknownIndex {
            entity: metadata.name.clone(),
            index: name.clone(),
        };
        let template = metadata.indexes.get(name).ok_or_else(unknown)?;
        let index = metadata.table.indexes.get(name).ok_or_else(unknown)?;

        if index.kind == IndexKind::Global {
            let partition = interpolate(&template.partition_key, values)?;
            let _ = keys.insert(index.partition_key.clone(), AttributeValue::S(partition));
        }
        if let (Some(attribute), Some(pattern)) = (&index.sort_key, &template.sort_key) {
            let sort = interpolate(pattern, values)?;
            let _ = keys.insert(attribute.clone(), AttributeValue::S(sort));
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{AttributeKind, AttributeMetadata, KeyTemplate, Table};
    use std::sync::Arc;

    fn values(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_interpolate_user_key() {
        let values = values(&[("id", AttributeValue::S("42".into()))]);
        assert_eq!(interpolate("USER#{{id}}", &values).unwrap(), "USER#42");
    }

    #[test]
    fn test_interpolate_keeps_string_verbatim() {
        let values = values(&[("id", AttributeValue::S("1111-2222".into()))]);
        assert_eq!(interpolate("USER#{{id}}", &values).unwrap(), "USER#1111-2222");
    }

    #[test]
    fn test_interpolate_serialized_number_and_string() {
        #[derive(serde::Serialize)]
        struct Enrollment {
            id: u32,
            #[serde(rename = "classId")]
            class_id: String,
        }

        let values: Item = serde_dynamo::to_item(Enrollment {
            id: 1111,
            class_id: "class-1232".to_string(),
        })
        .unwrap();
        assert_eq!(values["id"], AttributeValue::N("1111".into()));
        assert_eq!(
            interpolate("USER#{{id}}#CLASS#{{classId}}", &values).unwrap(),
            "USER#1111#CLASS#class-1232"
        );
    }

    #[test]
    fn test_interpolate_repeats_and_whitespace() {
        let values = values(&[
            ("a", AttributeValue::S("x".into())),
            ("b", AttributeValue::N("7".into())),
        ]);
        assert_eq!(
            interpolate("{{a}}|{{ b }}|{{a}}", &values).unwrap(),
            "x|7|x"
        );
    }

    #[test]
    fn test_interpolate_boolean() {
        let values = values(&[("active", AttributeValue::Bool(true))]);
        assert_eq!(interpolate("ACTIVE#{{active}}", &values).unwrap(), "ACTIVE#true");
    }

    #[test]
    fn test_interpolate_without_placeholders() {
        assert_eq!(interpolate("STATIC", &Item::new()).unwrap(), "STATIC");
    }

    #[test]
    fn test_interpolate_missing_value() {
        let err = interpolate("ORG#{{orgId}}", &Item::new()).unwrap_err();
        match err {
            Error::MissingInterpolationValue { name, .. } => assert_eq!(name, "orgId"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_interpolate_null_is_missing() {
        let values = values(&[("id", AttributeValue::Null(true))]);
        assert!(matches!(
            interpolate("USER#{{id}}", &values),
            Err(Error::MissingInterpolationValue { .. })
        ));
    }

    #[test]
    fn test_interpolate_rejects_non_scalars() {
        let values = values(&[("tags", AttributeValue::L(vec![]))]);
        assert!(matches!(
            interpolate("TAG#{{tags}}", &values),
            Err(Error::InvalidInterpolationValue { .. })
        ));
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let values = values(&[("id", AttributeValue::S("1".into()))]);
        assert_eq!(interpolate("A#{{id}}#{{rest", &values).unwrap(), "A#1#{{rest");
        assert_eq!(
            placeholder_names("A#{{id}}#{{rest"),
            BTreeSet::from(["id".to_string()])
        );
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(
            placeholder_names("ORG#{{ org }}#USER#{{id}}#{{org}}"),
            BTreeSet::from(["id".to_string(), "org".to_string()])
        );
        assert!(placeholder_names("STATIC").is_empty());
    }

    fn order_metadata() -> EntityMetadata {
        let table = Table::new("app", "PK")
            .with_sort_key("SK")
            .with_global_index("GSI1", "GSI1PK", Some("GSI1SK"))
            .with_local_index("LSI1", "LSI1SK");
        EntityMetadata::new(
            "order",
            Arc::new(table),
            KeyTemplate::new("CUSTOMER#{{customerId}}").with_sort_key("ORDER#{{id}}"),
        )
        .with_attribute(AttributeMetadata::new("id", AttributeKind::String))
        .with_attribute(AttributeMetadata::new("customerId", AttributeKind::String))
        .with_attribute(AttributeMetadata::new("status", AttributeKind::String))
        .with_index(
            "GSI1",
            KeyTemplate::new("STATUS#{{status}}").with_sort_key("ORDER#{{id}}"),
        )
        .with_index(
            "LSI1",
            KeyTemplate::new("CUSTOMER#{{customerId}}").with_sort_key("STATUS#{{status}}"),
        )
    }

    #[test]
    fn test_primary_and_index_keys() {
        let metadata = order_metadata();
        let values = values(&[
            ("id", AttributeValue::S("o1".into())),
            ("customerId", AttributeValue::S("c1".into())),
            ("status", AttributeValue::S("OPEN".into())),
        ]);

        let key = primary_key(&metadata, &values).unwrap();
        assert_eq!(key["PK"], AttributeValue::S("CUSTOMER#c1".into()));
        assert_eq!(key["SK"], AttributeValue::S("ORDER#o1".into()));

        let keys = index_keys(&metadata, &values, None::<Vec<&String>>).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys["GSI1PK"], AttributeValue::S("STATUS#OPEN".into()));
        assert_eq!(keys["GSI1SK"], AttributeValue::S("ORDER#o1".into()));
        assert_eq!(keys["LSI1SK"], AttributeValue::S("STATUS#OPEN".into()));
    }

    #[test]
    fn test_index_keys_unknown_index() {
        let metadata = order_metadata();
        let missing = "GSI9".to_string();
        let err = index_keys(&metadata, &Item::new(), Some([&missing])).unwrap_err();
        assert!(matches!(err, Error::UnknownIndex { .. }));
    }
}
