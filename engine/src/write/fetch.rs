//! Fetching & includes (spec §4.9)
//!
//! Reads filter out soft-deleted rows by default. `?include=rel1,rel2`
//! issues one extra query per relation, keyed by the primary IDs already
//! fetched, and merges the results into each row under the relation's
//! alias. No SQL JOINs — many-to-many issues two queries (join table,
//! then target rows).

use crate::database::{raw, AttributeMap, AttributeValue, ColumnSpec, DbConnection};
use crate::error::RocketError;
use crate::metadata::{Entity, Registry, RelationType};

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterOp {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "in" => Self::In,
            "not_in" => Self::NotIn,
            "like" => Self::Like,
            _ => return None,
        })
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Like => "like",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub page: u64,
    pub per_page: u64,
    pub include: Vec<String>,
}

fn entity_columns<'a>(entity: &'a Entity) -> Vec<ColumnSpec<'a>> {
    let mut columns = vec![(entity.primary_key.field.as_str(), pk_field_type(entity))];
    for field in &entity.fields {
        columns.push((field.name.as_str(), field.field_type));
    }
    if entity.soft_delete {
        columns.push(("deleted_at", crate::database::FieldType::DateTime));
    }
    columns
}

fn pk_field_type(entity: &Entity) -> crate::database::FieldType {
    use crate::metadata::PrimaryKeyType;
    match entity.primary_key.kind {
        PrimaryKeyType::Uuid => crate::database::FieldType::Uuid,
        PrimaryKeyType::Int | PrimaryKeyType::Bigint => crate::database::FieldType::Integer,
        PrimaryKeyType::String => crate::database::FieldType::String,
    }
}

pub async fn fetch_one(db: &DbConnection, entity: &Entity, id: &AttributeValue) -> Result<Option<AttributeMap>, RocketError> {
    let columns = entity_columns(entity);
    let quote = db.dialect().quote_ident(&entity.table);
    let mut sql = format!("SELECT * FROM {quote} WHERE {} = {}", db.dialect().quote_ident(&entity.primary_key.field), db.dialect().placeholder(1));
    if entity.soft_delete {
        sql.push_str(" AND deleted_at IS NULL");
    }
    raw::query_one(db.inner(), &sql, vec![id.clone()], &columns).await.map_err(RocketError::from)
}

pub struct Page {
    pub rows: Vec<AttributeMap>,
    pub total: u64,
}

pub async fn fetch_list(db: &DbConnection, entity: &Entity, query: &ListQuery) -> Result<Page, RocketError> {
    let columns = entity_columns(entity);
    let quote_table = db.dialect().quote_ident(&entity.table);

    let mut where_clauses = Vec::new();
    let mut params: Vec<AttributeValue> = Vec::new();
    if entity.soft_delete {
        where_clauses.push("deleted_at IS NULL".to_string());
    }
    for filter in &query.filters {
        let column = db.dialect().quote_ident(&filter.field);
        match filter.op {
            FilterOp::In | FilterOp::NotIn => {
                let placeholders: Vec<String> = filter
                    .values
                    .iter()
                    .map(|v| {
                        params.push(AttributeValue::Text(v.clone()));
                        db.dialect().placeholder(params.len())
                    })
                    .collect();
                where_clauses.push(format!("{column} {} ({})", filter.op.sql(), placeholders.join(", ")));
            }
            FilterOp::Like => {
                params.push(AttributeValue::Text(format!("%{}%", filter.values.first().cloned().unwrap_or_default())));
                where_clauses.push(format!("{column} like {}", db.dialect().placeholder(params.len())));
            }
            _ => {
                params.push(AttributeValue::Text(filter.values.first().cloned().unwrap_or_default()));
                where_clauses.push(format!("{column} {} {}", filter.op.sql(), db.dialect().placeholder(params.len())));
            }
        }
    }

    let where_sql = if where_clauses.is_empty() { String::new() } else { format!(" WHERE {}", where_clauses.join(" AND ")) };

    let order_sql = if query.sort.is_empty() {
        String::new()
    } else {
        let parts: Vec<String> = query
            .sort
            .iter()
            .map(|s| format!("{} {}", db.dialect().quote_ident(&s.field), if s.descending { "DESC" } else { "ASC" }))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    };

    let per_page = query.per_page.min(100).max(1);
    let page = query.page.max(1);
    let offset = (page - 1) * per_page;

    let count_sql = format!("SELECT COUNT(*) as total FROM {quote_table}{where_sql}");
    let count_row = raw::query_one(db.inner(), &count_sql, params.clone(), &[("total", crate::database::FieldType::Integer)])
        .await
        .map_err(RocketError::from)?;
    let total = count_row.and_then(|r| r.get("total").and_then(AttributeValue::as_i64)).unwrap_or(0).max(0) as u64;

    let list_sql = format!("SELECT * FROM {quote_table}{where_sql}{order_sql} LIMIT {per_page} OFFSET {offset}");
    let rows = raw::query_all(db.inner(), &list_sql, params, &columns).await.map_err(RocketError::from)?;

    Ok(Page { rows, total })
}

/// Loads `include`d relations for an already-fetched set of rows and
/// merges the result under each relation's alias.
pub async fn load_includes(
    db: &DbConnection,
    registry: &Registry,
    entity: &Entity,
    rows: &mut [AttributeMap],
    include: &[String],
) -> Result<(), RocketError> {
    if rows.is_empty() {
        return Ok(());
    }

    for alias in include {
        let Some(relation) = registry.find_relation_for_entity(alias, &entity.name) else { continue };
        let ids: Vec<AttributeValue> = rows.iter().filter_map(|r| r.get(&entity.primary_key.field).cloned()).collect();

        match relation.relation_type {
            RelationType::OneToOne | RelationType::OneToMany => {
                let Some(target) = registry.get_entity(&relation.target) else { continue };
                let children = fetch_children_by_fk(db, &target, &relation.target_key, &ids).await?;
                attach_to_parents(rows, &entity.primary_key.field, &relation.target_key, alias, children, relation.relation_type);
            }
            RelationType::ManyToMany => {
                let Some(target) = registry.get_entity(&relation.target) else { continue };
                let join_table = relation.join_table.clone().unwrap_or_else(|| format!("{}_{}", relation.source, relation.target));
                let source_join_key = relation.source_join_key.clone().unwrap_or_else(|| format!("{}_id", relation.source));
                let target_join_key = relation.target_join_key.clone().unwrap_or_else(|| format!("{}_id", relation.target));

                let join_rows = fetch_join_rows(db, &join_table, &source_join_key, &target_join_key, &ids).await?;
                let target_ids: Vec<AttributeValue> = join_rows.iter().map(|(_, tid)| tid.clone()).collect();
                let targets = fetch_by_pk(db, &target, &target_ids).await?;

                for row in rows.iter_mut() {
                    let Some(parent_id) = row.get(&entity.primary_key.field) else { continue };
                    let matched: Vec<serde_json::Value> = join_rows
                        .iter()
                        .filter(|(sid, _)| sid == parent_id)
                        .filter_map(|(_, tid)| targets.iter().find(|t| t.get(&target.primary_key.field) == Some(tid)))
                        .map(crate::database::attribute_map_to_json)
                        .collect();
                    row.insert(alias.clone(), AttributeValue::Json(serde_json::Value::Array(matched)));
                }
            }
        }
    }

    Ok(())
}

async fn fetch_children_by_fk(
    db: &DbConnection,
    target: &Entity,
    fk: &str,
    parent_ids: &[AttributeValue],
) -> Result<Vec<AttributeMap>, RocketError> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let columns = entity_columns(target);
    let placeholders: Vec<String> = (1..=parent_ids.len()).map(|i| db.dialect().placeholder(i)).collect();
    let quote_table = db.dialect().quote_ident(&target.table);
    let quote_fk = db.dialect().quote_ident(fk);
    let mut sql = format!("SELECT * FROM {quote_table} WHERE {quote_fk} in ({})", placeholders.join(", "));
    if target.soft_delete {
        sql.push_str(" AND deleted_at IS NULL");
    }
    raw::query_all(db.inner(), &sql, parent_ids.to_vec(), &columns).await.map_err(RocketError::from)
}

async fn fetch_by_pk(db: &DbConnection, target: &Entity, ids: &[AttributeValue]) -> Result<Vec<AttributeMap>, RocketError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let columns = entity_columns(target);
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| db.dialect().placeholder(i)).collect();
    let quote_table = db.dialect().quote_ident(&target.table);
    let quote_pk = db.dialect().quote_ident(&target.primary_key.field);
    let sql = format!("SELECT * FROM {quote_table} WHERE {quote_pk} in ({})", placeholders.join(", "));
    raw::query_all(db.inner(), &sql, ids.to_vec(), &columns).await.map_err(RocketError::from)
}

async fn fetch_join_rows(
    db: &DbConnection,
    join_table: &str,
    source_key: &str,
    target_key: &str,
    parent_ids: &[AttributeValue],
) -> Result<Vec<(AttributeValue, AttributeValue)>, RocketError> {
    if parent_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=parent_ids.len()).map(|i| db.dialect().placeholder(i)).collect();
    let quote_table = db.dialect().quote_ident(join_table);
    let quote_source = db.dialect().quote_ident(source_key);
    let sql = format!("SELECT {quote_source}, {} FROM {quote_table} WHERE {quote_source} in ({})", db.dialect().quote_ident(target_key), placeholders.join(", "));
    let columns = [(source_key, crate::database::FieldType::String), (target_key, crate::database::FieldType::String)];
    let rows = raw::query_all(db.inner(), &sql, parent_ids.to_vec(), &columns).await.map_err(RocketError::from)?;
    Ok(rows
        .into_iter()
        .filter_map(|r| Some((r.get(source_key)?.clone(), r.get(target_key)?.clone())))
        .collect())
}

fn attach_to_parents(
    rows: &mut [AttributeMap],
    parent_pk: &str,
    fk: &str,
    alias: &str,
    children: Vec<AttributeMap>,
    relation_type: RelationType,
) {
    for row in rows.iter_mut() {
        let Some(parent_id) = row.get(parent_pk).cloned() else { continue };
        let matched: Vec<&AttributeMap> = children.iter().filter(|c| c.get(fk) == Some(&parent_id)).collect();
        let value = match relation_type {
            RelationType::OneToOne => matched
                .first()
                .map(|c| crate::database::attribute_map_to_json(c))
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Array(matched.iter().map(|c| crate::database::attribute_map_to_json(c)).collect()),
        };
        row.insert(alias.to_string(), AttributeValue::Json(value));
    }
}
