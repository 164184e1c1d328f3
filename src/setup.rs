use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::create_table::{CreateTableError, CreateTableInput, CreateTableOutput};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType, LocalSecondaryIndex,
    Projection, ProjectionType, ProvisionedThroughput, ScalarAttributeType,
};
use tracing::debug;

use crate::error::Error;
use crate::metadata::{IndexKind, Table};

const CAPACITY_UNITS: i64 = 10;

fn key_schema(partition_key: &str, sort_key: Option<&str>) -> Result<Vec<KeySchemaElement>, Error> {
    let mut schema = vec![
        KeySchemaElement::builder()
            .attribute_name(partition_key)
            .key_type(KeyType::Hash)
            .build()?,
    ];
    if let Some(sort_key) = sort_key {
        schema.push(
            KeySchemaElement::builder()
                .attribute_name(sort_key)
                .key_type(KeyType::Range)
                .build()?,
        );
    }
    Ok(schema)
}

fn throughput() -> Result<ProvisionedThroughput, Error> {
    Ok(ProvisionedThroughput::builder()
        .read_capacity_units(CAPACITY_UNITS)
        .write_capacity_units(CAPACITY_UNITS)
        .build()?)
}

/// CreateTable request for `table`
///
/// Every key attribute is a string. Indexes project all attributes.
pub fn create_table_input(table: &Table) -> Result<CreateTableInput, Error> {
    let projection = Projection::builder()
        .projection_type(ProjectionType::All)
        .build();

    let mut global_indexes = Vec::new();
    let mut local_indexes = Vec::new();
    for (name, index) in &table.indexes {
        match index.kind {
            IndexKind::Global => global_indexes.push(
                GlobalSecondaryIndex::builder()
                    .index_name(name)
                    .set_key_schema(Some(key_schema(
                        &index.partition_key,
                        index.sort_key.as_deref(),
                    )?))
                    .projection(projection.clone())
                    .provisioned_throughput(throughput()?)
                    .build()?,
            ),
            IndexKind::Local => local_indexes.push(
                LocalSecondaryIndex::builder()
                    .index_name(name)
                    .set_key_schema(Some(key_schema(
                        &table.partition_key,
                        index.sort_key.as_deref(),
                    )?))
                    .projection(projection.clone())
                    .build()?,
            ),
        }
    }

    let attribute_definitions = table
        .key_attributes()
        .into_iter()
        .map(|name| {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::S)
                .build()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CreateTableInput::builder()
        .table_name(&table.name)
        .set_key_schema(Some(key_schema(&table.partition_key, table.sort_key.as_deref())?))
        .set_attribute_definitions(Some(attribute_definitions))
        .set_global_secondary_indexes((!global_indexes.is_empty()).then_some(global_indexes))
        .set_local_secondary_indexes((!local_indexes.is_empty()).then_some(local_indexes))
        .provisioned_throughput(throughput()?)
        .build()?)
}

/// Create `table`, treating an existing table as success
pub async fn create_table(client: &Client, table: &Table) -> Result<CreateTableOutput, Error> {
    let input = create_table_input(table)?;
    debug!(table = %table.name, "creating table");

    let result = client
        .create_table()
        .set_table_name(input.table_name)
        .set_key_schema(input.key_schema)
        .set_attribute_definitions(input.attribute_definitions)
        .set_global_secondary_indexes(input.global_secondary_indexes)
        .set_local_secondary_indexes(input.local_secondary_indexes)
        .set_provisioned_throughput(input.provisioned_throughput)
        .send()
        .await;

    match result {
        Ok(output) => Ok(output),
        Err(e) => {
            // Table already exists
            if let Some(CreateTableError::ResourceInUseException(_)) = e.as_service_error() {
                return Ok(CreateTableOutput::builder().build());
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_input_with_indexes() {
        let table = Table::new("app", "PK")
            .with_sort_key("SK")
            .with_global_index("GSI1", "GSI1PK", Some("GSI1SK"))
            .with_local_index("LSI1", "LSI1SK");
        let input = create_table_input(&table).unwrap();

        assert_eq!(input.table_name.as_deref(), Some("app"));
        let schema = input.key_schema.unwrap();
        assert_eq!(schema[0].attribute_name, "PK");
        assert_eq!(schema[0].key_type, KeyType::Hash);
        assert_eq!(schema[1].attribute_name, "SK");

        let definitions: Vec<String> = input
            .attribute_definitions
            .unwrap()
            .into_iter()
            .map(|d| d.attribute_name)
            .collect();
        assert_eq!(definitions, vec!["GSI1PK", "GSI1SK", "LSI1SK", "PK", "SK"]);

        let global = input.global_secondary_indexes.unwrap();
        assert_eq!(global[0].index_name, "GSI1");
        let local = input.local_secondary_indexes.unwrap();
        assert_eq!(local[0].key_schema[0].attribute_name, "PK");
        assert_eq!(local[0].key_schema[1].attribute_name, "LSI1SK");
    }

    #[test]
    fn test_create_table_input_without_indexes() {
        let input = create_table_input(&Table::new("plain", "id")).unwrap();
        assert_eq!(input.key_schema.unwrap().len(), 1);
        assert!(input.global_secondary_indexes.is_none());
        assert!(input.local_secondary_indexes.is_none());
    }
}
