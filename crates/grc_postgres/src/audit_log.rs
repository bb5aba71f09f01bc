//! Append-only `audit_log` sink.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use grc_core::audit_log::AuditLogEntry;
use grc_core::ports::{AuditLogSink, Result};

pub struct PgAuditLogSink {
    pool: PgPool,
}

impl PgAuditLogSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogSink for PgAuditLogSink {
    async fn record(&self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, org_id, actor_id, action, resource_type, resource_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.org_id)
        .bind(entry.actor_id)
        .bind(entry.action.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id)
        .bind(&entry.metadata)
        .bind(entry.at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }
}
