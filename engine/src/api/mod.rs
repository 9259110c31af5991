//! The dynamic CRUD boundary (spec §6)
//!
//! `GET/POST/PUT/DELETE /api/{app}/{entity}[/{id}]` is the one HTTP
//! surface this repo materializes: it parses the query string into a
//! [`ListQuery`](crate::write::ListQuery), resolves `{app}` through
//! [`AppManager`], and hands off to [`WritePipeline`]/`fetch_list`/
//! `fetch_one`. Every other row in spec §6's table — metadata CRUD, auth,
//! blob storage, runtime workflow inspection — is represented below as a
//! named trait/struct stub per spec.md's explicit out-of-scope list; wiring
//! a real implementation behind them is future work, not a gap in this
//! boundary.

use crate::app_manager::{AppContext, AppManager};
use crate::database::attribute_map_to_json;
use crate::error::RocketError;
use crate::http::{HttpResponse, Request, Response};
use crate::metadata::Entity;
use crate::routing::Router;
use crate::write::{
    fetch_list, fetch_one, load_includes, CreateRequest, DeleteRequest, Filter, FilterOp, ListQuery, SortKey, UpdateRequest, WritePipeline,
};
use serde_json::json;

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

/// Mounts the dynamic CRUD routes onto `router`, grouped under the shared
/// `/api/{app}/{entity}` prefix every one of them hangs off.
pub fn register_routes(router: Router) -> Router {
    router
        .group("/api/{app}/{entity}", |r| {
            r.get("", list).post("", create).get("/{id}", get_one).put("/{id}", update).delete("/{id}", delete)
        })
        .into()
}

async fn resolve_app(req: &Request) -> Result<AppContext, RocketError> {
    let name = req.param("app").ok_or_else(|| RocketError::invalid_payload("missing app segment"))?;
    let manager = AppManager::global().ok_or_else(|| RocketError::internal("app manager not initialized"))?;
    manager.get(name).await
}

fn resolve_entity(ctx: &AppContext, req: &Request) -> Result<Entity, RocketError> {
    let name = req.param("entity").ok_or_else(|| RocketError::invalid_payload("missing entity segment"))?;
    ctx.registry.get_entity(name).ok_or_else(|| RocketError::unknown_entity(name))
}

fn parse_list_query(query: &str) -> ListQuery {
    let mut list = ListQuery { page: 1, per_page: DEFAULT_PER_PAGE, ..Default::default() };
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();

    for (key, value) in pairs {
        if let Some(inner) = key.strip_prefix("filter[").and_then(|s| s.strip_suffix(']')) {
            let (field, op) = match inner.split_once('.') {
                Some((field, op)) => (field.to_string(), FilterOp::parse(op).unwrap_or_default()),
                None => (inner.to_string(), FilterOp::Eq),
            };
            let values = match op {
                FilterOp::In | FilterOp::NotIn => value.split(',').map(str::to_string).collect(),
                _ => vec![value],
            };
            list.filters.push(Filter { field, op, values });
            continue;
        }
        match key.as_str() {
            "sort" => {
                list.sort = value
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| match s.strip_prefix('-') {
                        Some(field) => SortKey { field: field.to_string(), descending: true },
                        None => SortKey { field: s.to_string(), descending: false },
                    })
                    .collect();
            }
            "page" => list.page = value.parse().unwrap_or(1).max(1),
            "per_page" => list.per_page = value.parse::<u64>().unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE).max(1),
            "include" => list.include = value.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            _ => {}
        }
    }
    list
}

async fn list(req: Request) -> Response {
    let ctx = resolve_app(&req).await?;
    let entity = resolve_entity(&ctx, &req)?;
    let query = parse_list_query(req.query());

    let mut page = fetch_list(&ctx.db, &entity, &query).await?;
    load_includes(&ctx.db, &ctx.registry, &entity, &mut page.rows, &query.include).await?;

    let data: Vec<_> = page.rows.iter().map(attribute_map_to_json).collect();
    Ok(HttpResponse::json(json!({
        "data": data,
        "meta": { "page": query.page, "per_page": query.per_page, "total": page.total }
    })))
}

async fn get_one(req: Request) -> Response {
    let ctx = resolve_app(&req).await?;
    let entity = resolve_entity(&ctx, &req)?;
    let id = req.param("id").cloned().ok_or_else(|| RocketError::invalid_payload("missing id segment"))?;
    let query = parse_list_query(req.query());

    let id_attr = crate::write::parse_path_id(&id, &entity)?;
    let mut row = fetch_one(&ctx.db, &entity, &id_attr)
        .await?
        .ok_or_else(|| RocketError::not_found(format!("{} {id}", entity.name)))?;

    load_includes(&ctx.db, &ctx.registry, &entity, std::slice::from_mut(&mut row), &query.include).await?;

    Ok(HttpResponse::json(json!({ "data": attribute_map_to_json(&row) })))
}

async fn create(req: Request) -> Response {
    let ctx = resolve_app(&req).await?;
    let entity_name = req.param("entity").cloned().ok_or_else(|| RocketError::invalid_payload("missing entity segment"))?;
    let bytes = req.into_body_bytes().await?;
    let body = crate::http::parse_json(&bytes)?;

    let pipeline = WritePipeline::new(ctx.db.clone(), ctx.registry.clone());
    let record = pipeline
        .create(CreateRequest { entity: entity_name, body, user: json!(null), context: json!({}) })
        .await?;

    Ok(HttpResponse::json(json!({ "data": attribute_map_to_json(&record) })).status(201))
}

async fn update(req: Request) -> Response {
    let ctx = resolve_app(&req).await?;
    let entity_name = req.param("entity").cloned().ok_or_else(|| RocketError::invalid_payload("missing entity segment"))?;
    let id = req.param("id").cloned().ok_or_else(|| RocketError::invalid_payload("missing id segment"))?;
    let bytes = req.into_body_bytes().await?;
    let body = crate::http::parse_json(&bytes)?;

    let pipeline = WritePipeline::new(ctx.db.clone(), ctx.registry.clone());
    let record = pipeline
        .update(UpdateRequest { entity: entity_name, id, body, user: json!(null), context: json!({}) })
        .await?;

    Ok(HttpResponse::json(json!({ "data": attribute_map_to_json(&record) })))
}

async fn delete(req: Request) -> Response {
    let ctx = resolve_app(&req).await?;
    let entity_name = req.param("entity").cloned().ok_or_else(|| RocketError::invalid_payload("missing entity segment"))?;
    let id = req.param("id").cloned().ok_or_else(|| RocketError::invalid_payload("missing id segment"))?;

    let pipeline = WritePipeline::new(ctx.db.clone(), ctx.registry.clone());
    pipeline.delete(DeleteRequest { entity: entity_name, id, user: json!(null), context: json!({}) }).await?;

    Ok(HttpResponse::new().status(204))
}

/// Metadata CRUD (`/api/{app}/_admin/{entities,relations,...}`) and schema
/// import/export (spec §6). Out of scope per spec.md — system-table rows
/// are seeded directly today, not managed through an HTTP surface.
pub trait AdminHandler: Send + Sync {
    fn resource(&self) -> &'static str;
}

/// Tokened session exchange (`/api/{app}/auth/{login,refresh,logout,accept-invite}`).
/// Out of scope per spec.md — no `_users`/`_refresh_tokens` issuance is
/// implemented; an app embedding this engine supplies its own.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<serde_json::Value, RocketError>;
}

/// File upload/download (`/api/{app}/_files[/:id]`). Out of scope per
/// spec.md — no blob storage backend is wired up.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, RocketError>;
    async fn get(&self, id: &str) -> Result<Vec<u8>, RocketError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_query_reads_filters_sort_and_paging() {
        let q = parse_list_query("filter[status]=active&filter[age.gte]=21&sort=name,-created_at&page=2&per_page=500&include=owner,tags");
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[0].field, "status");
        assert_eq!(q.filters[0].op, FilterOp::Eq);
        assert_eq!(q.filters[1].field, "age");
        assert_eq!(q.filters[1].op, FilterOp::Gte);
        assert_eq!(q.sort, vec![SortKey { field: "name".into(), descending: false }, SortKey { field: "created_at".into(), descending: true }]);
        assert_eq!(q.page, 2);
        assert_eq!(q.per_page, MAX_PER_PAGE);
        assert_eq!(q.include, vec!["owner".to_string(), "tags".to_string()]);
    }

    #[test]
    fn parse_list_query_defaults_when_empty() {
        let q = parse_list_query("");
        assert_eq!(q.page, 1);
        assert_eq!(q.per_page, DEFAULT_PER_PAGE);
        assert!(q.filters.is_empty());
    }
}
