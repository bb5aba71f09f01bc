//! Reference lookups: users, controls, requirements and adopted frameworks.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use grc_core::directory::{ControlRecord, RequirementRecord, UserRecord};
use grc_core::ports::{DirectoryStore, Result};

use crate::rows::{convert, ControlRow, RequirementRow, UserRow};

pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryStore for PgDirectoryStore {
    async fn get_user(&self, org_id: Uuid, user_id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, org_id, email, display_name, role, is_active
            FROM users
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(org_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn get_control(&self, org_id: Uuid, control_id: Uuid) -> Result<Option<ControlRecord>> {
        let row = sqlx::query_as::<_, ControlRow>(
            r#"
            SELECT id, org_id, identifier, title, category, is_active
            FROM controls
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(org_id)
        .bind(control_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Into::into))
    }

    async fn list_active_controls(&self, org_id: Uuid) -> Result<Vec<ControlRecord>> {
        let rows = sqlx::query_as::<_, ControlRow>(
            r#"
            SELECT id, org_id, identifier, title, category, is_active
            FROM controls
            WHERE org_id = $1 AND is_active
            ORDER BY identifier
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_requirement(
        &self,
        org_id: Uuid,
        requirement_id: Uuid,
    ) -> Result<Option<RequirementRecord>> {
        let row = sqlx::query_as::<_, RequirementRow>(
            r#"
            SELECT r.id, fv.framework_id, r.identifier, r.title
            FROM requirements r
            JOIN framework_versions fv ON fv.id = r.framework_version_id
            JOIN org_frameworks ofw ON ofw.framework_id = fv.framework_id
            WHERE ofw.org_id = $1 AND r.id = $2
            LIMIT 1
            "#,
        )
        .bind(org_id)
        .bind(requirement_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.map(Into::into))
    }

    async fn framework_exists(&self, org_id: Uuid, framework_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM org_frameworks WHERE org_id = $1 AND framework_id = $2
            )
            "#,
        )
        .bind(org_id)
        .bind(framework_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(exists)
    }
}
