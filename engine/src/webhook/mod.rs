//! Webhook Dispatcher (spec §4.10)
//!
//! Invoked at `before_write`/`before_delete` (sync, inside the parent
//! transaction — any non-2xx or transport error aborts the write) and at
//! `after_write`/`after_delete` (async, fired after commit). Retry is the
//! Scheduler's job; this module only performs one dispatch attempt and
//! records its outcome.

use crate::database::{raw, DbConnection};
use crate::error::RocketError;
use crate::expr::{evaluate_bool_cached, Env};
use crate::metadata::{HttpMethod, Webhook};
use sea_orm::{ConnectionTrait, DatabaseTransaction};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// The candidate payload built for every webhook invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WebhookPayload {
    pub entity: String,
    pub hook: String,
    pub action: String,
    pub record: JsonValue,
    pub old: JsonValue,
    pub user: JsonValue,
    pub timestamp: String,
}

pub struct DispatchOutcome {
    pub http_status: Option<u16>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    fn success(&self) -> bool {
        self.error.is_none() && self.http_status.map(|s| (200..300).contains(&s)).unwrap_or(false)
    }
}

fn to_env(payload: &WebhookPayload) -> Env {
    Env::new()
        .with("entity", JsonValue::String(payload.entity.clone()))
        .with("hook", JsonValue::String(payload.hook.clone()))
        .with("action", JsonValue::String(payload.action.clone()))
        .with("record", payload.record.clone())
        .with("old", payload.old.clone())
        .with("user", payload.user.clone())
}

fn resolve_headers(webhook: &Webhook, payload: &WebhookPayload) -> Vec<(String, String)> {
    webhook
        .headers
        .iter()
        .map(|(k, template)| (k.clone(), resolve_template(template, payload)))
        .collect()
}

fn resolve_template(template: &str, payload: &WebhookPayload) -> String {
    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            break;
        };
        let expr = after[..end].trim();
        out.push_str(&resolve_placeholder(expr, payload));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(expr: &str, payload: &WebhookPayload) -> String {
    if let Some(name) = expr.strip_prefix("env.") {
        return std::env::var(name).unwrap_or_default();
    }
    if let Some(path) = expr.strip_prefix("record.") {
        let mut current = &payload.record;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) => current = v,
                None => return String::new(),
            }
        }
        return match current {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    String::new()
}

/// Dispatch one webhook attempt (no retry — the Scheduler handles that).
pub async fn dispatch(client: &reqwest::Client, webhook: &Webhook, payload: &WebhookPayload) -> DispatchOutcome {
    let headers = resolve_headers(webhook, payload);
    let mut builder = match webhook.method {
        HttpMethod::Get => client.get(&webhook.url),
        HttpMethod::Post => client.post(&webhook.url),
        HttpMethod::Put => client.put(&webhook.url),
        HttpMethod::Patch => client.patch(&webhook.url),
        HttpMethod::Delete => client.delete(&webhook.url),
    }
    .json(payload)
    .timeout(Duration::from_secs(10));

    for (key, value) in headers {
        builder = builder.header(key, value);
    }

    match builder.send().await {
        Ok(response) => DispatchOutcome { http_status: Some(response.status().as_u16()), error: None },
        Err(e) => DispatchOutcome { http_status: None, error: Some(e.to_string()) },
    }
}

/// Evaluate `webhook.condition` (if present) against the candidate payload.
pub fn matches_condition(webhook: &Webhook, payload: &WebhookPayload) -> Result<bool, RocketError> {
    let Some(condition) = &webhook.condition else { return Ok(true) };
    let env = to_env(payload);
    evaluate_bool_cached(&webhook.compiled_condition, condition, &env).map_err(|e| RocketError::internal(e.to_string()))
}

/// Write a `pending` log row, returning its id. `conn` carries the actual
/// connection (a transaction for the sync path, the pool for the async
/// path); `db` is only consulted for its SQL dialect.
async fn log_pending<C: ConnectionTrait>(conn: &C, db: &DbConnection, webhook: &Webhook, payload: &WebhookPayload, record_id: &str) -> Result<i64, RocketError> {
    let now = db.dialect().now_expr();
    let sql = format!(
        "INSERT INTO {} (webhook_id, entity, hook, action, record_id, payload, attempt, status, http_status, error, next_retry_at, created_at, updated_at) VALUES ({}, {}, {}, {}, {}, {}, 0, 'pending', NULL, NULL, NULL, {now}, {now})",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().placeholder(1),
        db.dialect().placeholder(2),
        db.dialect().placeholder(3),
        db.dialect().placeholder(4),
        db.dialect().placeholder(5),
        db.dialect().placeholder(6),
    );
    raw::execute(
        conn,
        &sql,
        vec![
            crate::database::AttributeValue::Text(webhook.id.clone()),
            crate::database::AttributeValue::Text(payload.entity.clone()),
            crate::database::AttributeValue::Text(payload.hook.clone()),
            crate::database::AttributeValue::Text(payload.action.clone()),
            crate::database::AttributeValue::Text(record_id.to_string()),
            crate::database::AttributeValue::Text(serde_json::to_string(payload).unwrap_or_default()),
        ],
    )
    .await
    .map_err(RocketError::from)?;

    let row = raw::query_one(
        conn,
        &format!("SELECT MAX(id) as id FROM {}", db.dialect().quote_ident("_webhook_logs")),
        vec![],
        &[("id", crate::database::FieldType::Integer)],
    )
    .await
    .map_err(RocketError::from)?;
    Ok(row.and_then(|r| r.get("id").and_then(crate::database::AttributeValue::as_i64)).unwrap_or(0))
}

async fn mark_log_status<C: ConnectionTrait>(conn: &C, db: &DbConnection, log_id: i64, outcome: &DispatchOutcome) -> Result<(), RocketError> {
    let status = if outcome.success() { "success" } else { "failed" };
    let sql = format!(
        "UPDATE {} SET status = {}, http_status = {}, error = {}, updated_at = {} WHERE id = {}",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().placeholder(1),
        db.dialect().placeholder(2),
        db.dialect().placeholder(3),
        db.dialect().now_expr(),
        db.dialect().placeholder(4),
    );
    raw::execute(
        conn,
        &sql,
        vec![
            crate::database::AttributeValue::Text(status.to_string()),
            outcome.http_status.map(|s| crate::database::AttributeValue::Int(s as i64)).unwrap_or(crate::database::AttributeValue::Null),
            outcome.error.clone().map(crate::database::AttributeValue::Text).unwrap_or(crate::database::AttributeValue::Null),
            crate::database::AttributeValue::Int(log_id),
        ],
    )
    .await
    .map_err(RocketError::from)?;
    Ok(())
}

/// Dispatch the sync path (`before_*` hooks): non-2xx or transport error
/// aborts the write. Runs inside the caller's open write transaction so the
/// log row rolls back with everything else on failure.
pub async fn dispatch_sync(
    client: &reqwest::Client,
    txn: &DatabaseTransaction,
    db: &DbConnection,
    webhook: &Webhook,
    payload: &WebhookPayload,
    record_id: &str,
) -> Result<(), RocketError> {
    if !matches_condition(webhook, payload)? {
        return Ok(());
    }
    let log_id = log_pending(txn, db, webhook, payload, record_id).await?;
    let outcome = dispatch(client, webhook, payload).await;
    mark_log_status(txn, db, log_id, &outcome).await?;
    if !outcome.success() {
        return Err(RocketError::internal(format!(
            "sync webhook '{}' failed: {}",
            webhook.id,
            outcome.error.unwrap_or_else(|| format!("http {:?}", outcome.http_status))
        )));
    }
    Ok(())
}

/// Dispatch the async path (`after_*` hooks): failures are logged with a
/// `next_retry_at`, never surfaced to the caller.
pub async fn dispatch_async(client: &reqwest::Client, db: &DbConnection, webhook: &Webhook, payload: &WebhookPayload, record_id: &str) {
    match matches_condition(webhook, payload) {
        Ok(false) => return,
        Ok(true) => {}
        Err(e) => {
            tracing::warn!(webhook_id = %webhook.id, error = %e, "webhook condition evaluation failed");
            return;
        }
    }
    let log_id = match log_pending(db.inner(), db, webhook, payload, record_id).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(webhook_id = %webhook.id, error = %e, "failed to log webhook dispatch");
            return;
        }
    };
    let outcome = dispatch(client, webhook, payload).await;
    if !outcome.success() {
        let next_retry_at = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(30);
        if let Err(e) = mark_retry(db, log_id, next_retry_at).await {
            tracing::error!(webhook_id = %webhook.id, error = %e, "failed to record webhook retry state");
        }
        return;
    }
    if let Err(e) = mark_log_status(db.inner(), db, log_id, &outcome).await {
        tracing::error!(webhook_id = %webhook.id, error = %e, "failed to record webhook success");
    }
}

async fn mark_retry(db: &DbConnection, log_id: i64, next_retry_at: chrono::NaiveDateTime) -> Result<(), RocketError> {
    let sql = format!(
        "UPDATE {} SET status = 'retrying', attempt = attempt + 1, next_retry_at = {}, updated_at = {} WHERE id = {}",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().placeholder(1),
        db.dialect().now_expr(),
        db.dialect().placeholder(2),
    );
    raw::execute(db.inner(), &sql, vec![crate::database::AttributeValue::DateTime(next_retry_at), crate::database::AttributeValue::Int(log_id)])
        .await
        .map_err(RocketError::from)?;
    Ok(())
}
