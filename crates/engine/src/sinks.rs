//! Where run results go once a run ends.
//!
//! Both sinks are fire-and-forget from the engine's point of view: a sink
//! that cannot deliver logs the problem itself and never fails the run.

use async_trait::async_trait;

use galley_core::report::AuditEntry;
use galley_core::types::Actor;

/// Receives the one human-readable message each run produces.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, actor: &Actor, message: &str);
}

/// Receives the structured record of each run.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, actor: &Actor, message: &str) {
        tracing::info!(actor = %actor, message, "Import notification");
    }
}

/// Writes audit entries to the log as structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            target: "galley_engine::audit",
            run_id = %entry.run.run_id,
            actor = %entry.run.actor,
            entity = %entry.run.entity,
            format = %entry.run.format,
            conflict_resolution = entry.run.policy.conflict_resolution.as_str(),
            deleted_state_policy = entry.run.policy.deleted_state_policy.as_str(),
            status = ?entry.status,
            imported = entry.imported,
            updated = entry.updated,
            skipped = entry.skipped,
            restored = entry.restored,
            error_count = entry.error_count,
            dropped_rows = entry.dropped_rows,
            failure = entry.failure.as_deref(),
            started_at = %entry.run.started_at,
            finished_at = %entry.finished_at,
            "Import audit"
        );
    }
}
