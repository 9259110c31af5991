//! Raw SQL execution for business data
//!
//! Business entity tables never get a generated sea-orm `Entity`; the
//! write pipeline and fetch layer read and write them through parameterized
//! [`sea_orm::Statement`]s instead, mapping rows into [`AttributeMap`]s
//! against the field-type list the caller already knows from the metadata
//! registry. This mirrors `workflow::store`'s raw `Statement`/`query_all`
//! pattern, generalized from a handful of fixed columns to an arbitrary
//! entity schema.

use crate::database::value::{AttributeMap, AttributeValue, FieldType};
use crate::error::FrameworkError;
use sea_orm::{ConnectionTrait, QueryResult, Statement};

/// One column this query should decode, paired with its declared type.
pub type ColumnSpec<'a> = (&'a str, FieldType);

fn decode_column(row: &QueryResult, name: &str, field_type: FieldType) -> Result<AttributeValue, FrameworkError> {
    macro_rules! try_nullable {
        ($ty:ty, $variant:expr) => {{
            let value: Option<$ty> = row
                .try_get("", name)
                .map_err(|e| FrameworkError::database(format!("column '{name}': {e}")))?;
            Ok(value.map($variant).unwrap_or(AttributeValue::Null))
        }};
    }

    match field_type {
        FieldType::String => try_nullable!(String, AttributeValue::Text),
        FieldType::Integer => try_nullable!(i64, AttributeValue::Int),
        FieldType::Float => try_nullable!(f64, AttributeValue::Float),
        FieldType::Boolean => try_nullable!(bool, AttributeValue::Bool),
        FieldType::DateTime => try_nullable!(chrono::NaiveDateTime, AttributeValue::DateTime),
        FieldType::Uuid => {
            let value: Option<String> = row
                .try_get("", name)
                .map_err(|e| FrameworkError::database(format!("column '{name}': {e}")))?;
            match value {
                None => Ok(AttributeValue::Null),
                Some(s) => uuid::Uuid::parse_str(&s)
                    .map(AttributeValue::Uuid)
                    .map_err(|e| FrameworkError::internal(format!("invalid uuid in column '{name}': {e}"))),
            }
        }
        FieldType::Decimal => {
            let value: Option<String> = row
                .try_get("", name)
                .map_err(|e| FrameworkError::database(format!("column '{name}': {e}")))?;
            match value {
                None => Ok(AttributeValue::Null),
                Some(s) => s
                    .parse()
                    .map(AttributeValue::Decimal)
                    .map_err(|e| FrameworkError::internal(format!("invalid decimal in column '{name}': {e}"))),
            }
        }
        FieldType::Json => {
            let value: Option<String> = row
                .try_get("", name)
                .map_err(|e| FrameworkError::database(format!("column '{name}': {e}")))?;
            match value {
                None => Ok(AttributeValue::Null),
                Some(s) => serde_json::from_str(&s)
                    .map(AttributeValue::Json)
                    .map_err(|e| FrameworkError::internal(format!("invalid json in column '{name}': {e}"))),
            }
        }
    }
}

fn row_to_attribute_map(row: &QueryResult, columns: &[ColumnSpec<'_>]) -> Result<AttributeMap, FrameworkError> {
    let mut map = AttributeMap::new();
    for (name, field_type) in columns {
        map.insert((*name).to_string(), decode_column(row, name, *field_type)?);
    }
    Ok(map)
}

/// Run a parameterized query and decode every row into an [`AttributeMap`].
///
/// Generic over [`ConnectionTrait`] so the same helper runs unmodified
/// against either an app's pooled `DatabaseConnection` or an open
/// `DatabaseTransaction` — the write pipeline passes the latter so every
/// raw statement it issues lands inside the one transaction it opened.
pub async fn query_all<C: ConnectionTrait>(
    conn: &C,
    sql: &str,
    params: Vec<AttributeValue>,
    columns: &[ColumnSpec<'_>],
) -> Result<Vec<AttributeMap>, FrameworkError> {
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        params.iter().map(AttributeValue::to_sea_value),
    );
    let rows = conn.query_all(stmt).await.map_err(|e| FrameworkError::database(e.to_string()))?;
    rows.iter().map(|row| row_to_attribute_map(row, columns)).collect()
}

/// Run a parameterized query expected to return at most one row.
pub async fn query_one<C: ConnectionTrait>(
    conn: &C,
    sql: &str,
    params: Vec<AttributeValue>,
    columns: &[ColumnSpec<'_>],
) -> Result<Option<AttributeMap>, FrameworkError> {
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        params.iter().map(AttributeValue::to_sea_value),
    );
    let row = conn.query_one(stmt).await.map_err(|e| FrameworkError::database(e.to_string()))?;
    row.map(|row| row_to_attribute_map(&row, columns)).transpose()
}

/// Run a parameterized statement that doesn't return rows (UPDATE/DELETE,
/// or an INSERT whose id isn't needed back).
pub async fn execute<C: ConnectionTrait>(conn: &C, sql: &str, params: Vec<AttributeValue>) -> Result<u64, FrameworkError> {
    let stmt = Statement::from_sql_and_values(
        conn.get_database_backend(),
        sql,
        params.iter().map(AttributeValue::to_sea_value),
    );
    let result = conn.execute(stmt).await.map_err(|e| FrameworkError::database(e.to_string()))?;
    Ok(result.rows_affected())
}
