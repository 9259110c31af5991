//! Fixed-interval background sweeps (spec §4.12)
//!
//! Three sweeps run for the process lifetime, fanned out across every
//! currently-connected [`AppContext`]: workflow approval timeouts (60s
//! default), webhook retry (30s default), and event/instance retention
//! (1h default). Fixed by spec rather than configurable per app — each
//! sweep is its own `tokio::time::interval` loop spawned once from
//! `AppManager`'s owning process.

use crate::app_manager::{AppContext, AppManager};
use crate::config::RuntimeConfig;
use crate::database::{raw, AttributeValue, DbConnection, FieldType};
use crate::error::RocketError;
use crate::metadata::{Backoff, Webhook};
use crate::webhook;
use crate::workflow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Drives the three sweeps. Dropping every clone of the returned
/// `Arc<AtomicBool>` doesn't stop anything by itself — call [`Scheduler::stop`]
/// (or let the process exit) to end the loops.
pub struct Scheduler {
    manager: Arc<AppManager>,
    runtime: RuntimeConfig,
    http: reqwest::Client,
    stop: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(manager: Arc<AppManager>, runtime: RuntimeConfig) -> Self {
        Self { manager, runtime, http: reqwest::Client::new(), stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Spawns all three sweep loops as detached tasks.
    pub fn spawn(self: &Arc<Self>) {
        self.clone().spawn_timeout_loop();
        self.clone().spawn_retry_loop();
        self.clone().spawn_retention_loop();
    }

    fn spawn_timeout_loop(self: Arc<Self>) {
        let period = self.runtime.workflow_timeout_sweep();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                for ctx in self.manager.live_contexts().await {
                    if let Err(e) = self.sweep_workflow_timeouts(&ctx).await {
                        tracing::error!(app = %ctx.name, error = %e, "workflow timeout sweep failed");
                    }
                }
            }
        });
    }

    fn spawn_retry_loop(self: Arc<Self>) {
        let period = self.runtime.webhook_retry_sweep();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                for ctx in self.manager.live_contexts().await {
                    if let Err(e) = self.sweep_webhook_retries(&ctx).await {
                        tracing::error!(app = %ctx.name, error = %e, "webhook retry sweep failed");
                    }
                }
            }
        });
    }

    fn spawn_retention_loop(self: Arc<Self>) {
        let period = self.runtime.event_retention_sweep();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                for ctx in self.manager.live_contexts().await {
                    if let Err(e) = self.sweep_retention(&ctx).await {
                        tracing::error!(app = %ctx.name, error = %e, "retention sweep failed");
                    }
                }
            }
        });
    }

    async fn sweep_workflow_timeouts<'a>(&'a self, ctx: &'a AppContext) -> Result<(), RocketError> {
        for (workflow_id, instance_id) in workflow::find_timed_out_instances(&ctx.db).await? {
            let Some(def) = ctx.registry.get_workflow(&workflow_id) else {
                tracing::warn!(workflow_id = %workflow_id, instance_id, "timed-out instance references unknown workflow, skipping");
                continue;
            };
            if let Err(e) = workflow::resume_on_timeout(&ctx.db, &ctx.registry, &def, instance_id).await {
                tracing::error!(workflow_id = %workflow_id, instance_id, error = %e, "failed to resume timed-out workflow instance");
            }
        }
        Ok(())
    }

    async fn sweep_webhook_retries<'a>(&'a self, ctx: &'a AppContext) -> Result<(), RocketError> {
        for log in find_due_retries(&ctx.db).await? {
            let Some(wh) = ctx.registry.get_webhook(&log.webhook_id) else {
                tracing::warn!(webhook_id = %log.webhook_id, "retry log references unknown webhook, giving up");
                mark_retry_permanently_failed(&ctx.db, log.id).await?;
                continue;
            };
            if log.attempt >= wh.retry.max_attempts {
                mark_retry_permanently_failed(&ctx.db, log.id).await?;
                continue;
            }

            let payload: crate::webhook::WebhookPayload = match serde_json::from_str(&log.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(log_id = log.id, error = %e, "corrupt webhook log payload, giving up");
                    mark_retry_permanently_failed(&ctx.db, log.id).await?;
                    continue;
                }
            };

            let outcome = webhook::dispatch(&self.http, &wh, &payload).await;
            if outcome_success(&outcome) {
                mark_retry_success(&ctx.db, log.id, &outcome).await?;
            } else {
                let delay = retry_delay(&self.runtime, &wh, log.attempt + 1);
                let next_retry_at = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(delay.as_secs() as i64);
                mark_retry_failed(&ctx.db, log.id, next_retry_at).await?;
            }
        }
        Ok(())
    }

    async fn sweep_retention<'a>(&'a self, ctx: &'a AppContext) -> Result<(), RocketError> {
        let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::days(self.runtime.event_retention_days);
        delete_stale_rows(&ctx.db, "_workflow_instances", &["completed", "failed", "rejected"], cutoff).await?;
        delete_stale_rows(&ctx.db, "_webhook_logs", &["success", "permanently_failed"], cutoff).await?;
        Ok(())
    }
}

fn outcome_success(outcome: &webhook::DispatchOutcome) -> bool {
    outcome.error.is_none() && outcome.http_status.map(|s| (200..300).contains(&s)).unwrap_or(false)
}

fn retry_delay(runtime: &RuntimeConfig, webhook: &Webhook, attempt: u32) -> Duration {
    match webhook.retry.backoff {
        Backoff::Exponential => runtime.webhook_retry_delay(attempt),
        Backoff::Linear => Duration::from_secs(runtime.webhook_retry_base_secs.saturating_mul(attempt as u64)),
    }
}

struct DueRetry {
    id: i64,
    webhook_id: String,
    payload: String,
    attempt: u32,
}

async fn find_due_retries(db: &DbConnection) -> Result<Vec<DueRetry>, RocketError> {
    let now = db.dialect().now_expr();
    let sql = format!(
        "SELECT id, webhook_id, payload, attempt FROM {} WHERE status = 'retrying' AND next_retry_at IS NOT NULL AND next_retry_at <= {now}",
        db.dialect().quote_ident("_webhook_logs"),
    );
    let columns = [
        ("id", FieldType::Integer),
        ("webhook_id", FieldType::String),
        ("payload", FieldType::String),
        ("attempt", FieldType::Integer),
    ];
    let rows = raw::query_all(db.inner(), &sql, vec![], &columns).await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| {
            Some(DueRetry {
                id: r.get("id")?.as_i64()?,
                webhook_id: r.get("webhook_id")?.as_str()?.to_string(),
                payload: r.get("payload")?.as_str()?.to_string(),
                attempt: r.get("attempt")?.as_i64()? as u32,
            })
        })
        .collect())
}

async fn mark_retry_success(db: &DbConnection, log_id: i64, outcome: &webhook::DispatchOutcome) -> Result<(), RocketError> {
    let sql = format!(
        "UPDATE {} SET status = 'success', attempt = attempt + 1, http_status = {}, error = NULL, next_retry_at = NULL, updated_at = {} WHERE id = {}",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().placeholder(1),
        db.dialect().now_expr(),
        db.dialect().placeholder(2),
    );
    raw::execute(db.inner(), &sql, vec![outcome.http_status.map(|s| AttributeValue::Int(s as i64)).unwrap_or(AttributeValue::Null), AttributeValue::Int(log_id)]).await?;
    Ok(())
}

async fn mark_retry_failed(db: &DbConnection, log_id: i64, next_retry_at: chrono::NaiveDateTime) -> Result<(), RocketError> {
    let sql = format!(
        "UPDATE {} SET status = 'retrying', attempt = attempt + 1, next_retry_at = {}, updated_at = {} WHERE id = {}",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().placeholder(1),
        db.dialect().now_expr(),
        db.dialect().placeholder(2),
    );
    raw::execute(db.inner(), &sql, vec![AttributeValue::DateTime(next_retry_at), AttributeValue::Int(log_id)]).await?;
    Ok(())
}

async fn mark_retry_permanently_failed(db: &DbConnection, log_id: i64) -> Result<(), RocketError> {
    let sql = format!(
        "UPDATE {} SET status = 'permanently_failed', next_retry_at = NULL, updated_at = {} WHERE id = {}",
        db.dialect().quote_ident("_webhook_logs"),
        db.dialect().now_expr(),
        db.dialect().placeholder(1),
    );
    raw::execute(db.inner(), &sql, vec![AttributeValue::Int(log_id)]).await?;
    Ok(())
}

async fn delete_stale_rows(db: &DbConnection, table: &str, terminal_statuses: &[&str], cutoff: chrono::NaiveDateTime) -> Result<(), RocketError> {
    let statuses: Vec<String> = terminal_statuses.iter().map(|s| format!("'{s}'")).collect();
    let sql = format!(
        "DELETE FROM {} WHERE status IN ({}) AND updated_at < {}",
        db.dialect().quote_ident(table),
        statuses.join(", "),
        db.dialect().placeholder(1),
    );
    raw::execute(db.inner(), &sql, vec![AttributeValue::DateTime(cutoff)]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_respects_backoff_kind() {
        let runtime = RuntimeConfig { webhook_retry_base_secs: 5, ..Default::default() };
        let mut webhook = sample_webhook();
        webhook.retry.backoff = Backoff::Linear;
        assert_eq!(retry_delay(&runtime, &webhook, 3), Duration::from_secs(15));

        webhook.retry.backoff = Backoff::Exponential;
        assert_eq!(retry_delay(&runtime, &webhook, 2), runtime.webhook_retry_delay(2));
    }

    fn sample_webhook() -> Webhook {
        Webhook {
            id: "wh1".into(),
            entity: "order".into(),
            hook: crate::metadata::Hook::AfterWrite,
            url: "https://example.com".into(),
            method: crate::metadata::HttpMethod::Post,
            headers: Default::default(),
            condition: None,
            is_async: true,
            retry: Default::default(),
            active: true,
            compiled_condition: Default::default(),
        }
    }
}
