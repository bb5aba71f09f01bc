//! Evidence artifacts, their control/requirement links and evaluations.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use grc_core::error::GrcError;
use grc_core::evidence::types::*;
use grc_core::pagination::PageRequest;
use grc_core::ports::{EvidenceStore, Result};

use crate::rows::{
    convert_all, ArtifactRow, EvaluationRow, FreshnessRow, LinkRow, ARTIFACT_COLUMNS,
    EVALUATION_COLUMNS, LINK_COLUMNS,
};
use crate::{count, like_pattern, unique_or_internal, window};

pub struct PgEvidenceStore {
    pool: PgPool,
}

impl PgEvidenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn sort_column(field: EvidenceSortField) -> &'static str {
    match field {
        EvidenceSortField::CreatedAt => "a.created_at",
        EvidenceSortField::UpdatedAt => "a.updated_at",
        EvidenceSortField::Title => "lower(a.title)",
        EvidenceSortField::CollectionDate => "a.collection_date",
        EvidenceSortField::ExpiresAt => "a.expires_at",
        EvidenceSortField::Status => "a.status",
    }
}

/// Appends the artifact-list predicate. Shared by the count and the page
/// query so both see the same rows.
fn push_artifact_filter(qb: &mut QueryBuilder<'_, Postgres>, org_id: Uuid, query: &EvidenceQuery) {
    let f = &query.filter;
    qb.push(" WHERE a.org_id = ");
    qb.push_bind(org_id);
    if !f.include_history {
        qb.push(" AND a.is_current");
    }
    if let Some(status) = f.status {
        qb.push(" AND a.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(evidence_type) = f.evidence_type {
        qb.push(" AND a.evidence_type = ");
        qb.push_bind(evidence_type.as_str());
    }
    if let Some(method) = f.collection_method {
        qb.push(" AND a.collection_method = ");
        qb.push_bind(method.as_str());
    }
    if let Some(uploaded_by) = f.uploaded_by {
        qb.push(" AND a.uploaded_by = ");
        qb.push_bind(uploaded_by);
    }
    if let Some(control_id) = f.control_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM evidence_links l \
             WHERE l.org_id = a.org_id AND l.artifact_id = a.id AND l.control_id = ",
        );
        qb.push_bind(control_id);
        qb.push(")");
    }
    if let Some(requirement_id) = f.requirement_id {
        qb.push(
            " AND EXISTS (SELECT 1 FROM evidence_links l \
             WHERE l.org_id = a.org_id AND l.artifact_id = a.id AND l.requirement_id = ",
        );
        qb.push_bind(requirement_id);
        qb.push(")");
    }
    if !f.tags.is_empty() {
        qb.push(" AND a.tags && ");
        qb.push_bind(f.tags.clone());
    }
    if let Some(freshness) = f.freshness {
        let soon = query.now + Duration::days(query.expiring_soon_days);
        match freshness {
            FreshnessStatus::Expired => {
                qb.push(" AND a.expires_at < ");
                qb.push_bind(query.now);
            }
            FreshnessStatus::ExpiringSoon => {
                qb.push(" AND a.expires_at >= ");
                qb.push_bind(query.now);
                qb.push(" AND a.expires_at <= ");
                qb.push_bind(soon);
            }
            FreshnessStatus::Fresh => {
                qb.push(" AND (a.expires_at IS NULL OR a.expires_at > ");
                qb.push_bind(soon);
                qb.push(")");
            }
        }
    }
    if let Some(q) = f.q.as_deref() {
        let pattern = like_pattern(q);
        qb.push(" AND (a.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR a.description ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    if let Some(search) = f.search.as_deref() {
        // search_vector covers title, description, source_system and tags
        qb.push(" AND (a.search_vector @@ plainto_tsquery('english', ");
        qb.push_bind(search.to_string());
        qb.push(") OR a.title ILIKE ");
        qb.push_bind(like_pattern(search));
        qb.push(")");
    }
}

fn insert_artifact_query(a: &EvidenceArtifact) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO evidence_artifacts (
            id, org_id, title, description, evidence_type, status, collection_method,
            file_name, file_size, mime_type, object_key, checksum_sha256,
            parent_artifact_id, version, is_current, collection_date, expires_at,
            freshness_period_days, source_system, uploaded_by, upload_confirmed_at,
            tags, created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
        )
        "#,
    )
    .bind(a.id)
    .bind(a.org_id)
    .bind(&a.title)
    .bind(&a.description)
    .bind(a.evidence_type.as_str())
    .bind(a.status.as_str())
    .bind(a.collection_method.as_str())
    .bind(&a.file_name)
    .bind(a.file_size)
    .bind(&a.mime_type)
    .bind(&a.object_key)
    .bind(&a.checksum_sha256)
    .bind(a.parent_artifact_id)
    .bind(a.version)
    .bind(a.is_current)
    .bind(a.collection_date)
    .bind(a.expires_at)
    .bind(a.freshness_period_days)
    .bind(&a.source_system)
    .bind(a.uploaded_by)
    .bind(a.upload_confirmed_at)
    .bind(&a.tags)
    .bind(a.created_at)
    .bind(a.updated_at)
}

const UPDATE_ARTIFACT: &str = r#"
    UPDATE evidence_artifacts SET
        title = $3, description = $4, status = $5, checksum_sha256 = $6,
        is_current = $7, collection_date = $8, expires_at = $9,
        freshness_period_days = $10, source_system = $11,
        upload_confirmed_at = $12, tags = $13, updated_at = $14
    WHERE org_id = $1 AND id = $2
"#;

/// Same update, applied only while the row is still the current version.
const SUPERSEDE_ARTIFACT: &str = r#"
    UPDATE evidence_artifacts SET
        title = $3, description = $4, status = $5, checksum_sha256 = $6,
        is_current = $7, collection_date = $8, expires_at = $9,
        freshness_period_days = $10, source_system = $11,
        upload_confirmed_at = $12, tags = $13, updated_at = $14
    WHERE org_id = $1 AND id = $2 AND is_current
"#;

fn update_artifact_query<'q>(
    sql: &'q str,
    a: &'q EvidenceArtifact,
) -> Query<'q, Postgres, PgArguments> {
    sqlx::query(sql)
        .bind(a.org_id)
        .bind(a.id)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.status.as_str())
        .bind(&a.checksum_sha256)
        .bind(a.is_current)
        .bind(a.collection_date)
        .bind(a.expires_at)
        .bind(a.freshness_period_days)
        .bind(&a.source_system)
        .bind(a.upload_confirmed_at)
        .bind(&a.tags)
        .bind(a.updated_at)
}

fn insert_link_query(l: &EvidenceLink) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO evidence_links (
            id, org_id, artifact_id, target_type, control_id, requirement_id,
            strength, notes, linked_by, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(l.id)
    .bind(l.org_id)
    .bind(l.artifact_id)
    .bind(l.target_type.as_str())
    .bind(l.control_id)
    .bind(l.requirement_id)
    .bind(l.strength.as_str())
    .bind(&l.notes)
    .bind(l.linked_by)
    .bind(l.created_at)
    .bind(l.updated_at)
}

fn link_conflict(l: &EvidenceLink) -> impl FnOnce() -> String + '_ {
    move || format!("artifact already linked to {} {}", l.target_type, l.target_id())
}

#[async_trait]
impl EvidenceStore for PgEvidenceStore {
    async fn insert_artifact(&self, artifact: &EvidenceArtifact) -> Result<()> {
        insert_artifact_query(artifact)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                unique_or_internal(e, || {
                    format!("version {} already exists", artifact.version)
                })
            })?;
        Ok(())
    }

    async fn get_artifact(&self, org_id: Uuid, id: Uuid) -> Result<Option<EvidenceArtifact>> {
        let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM evidence_artifacts WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, ArtifactRow>(&sql)
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(crate::rows::convert).transpose()
    }

    async fn update_artifact(&self, artifact: &EvidenceArtifact) -> Result<()> {
        let result = update_artifact_query(UPDATE_ARTIFACT, artifact)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::NotFound(format!("evidence artifact {}", artifact.id)));
        }
        Ok(())
    }

    async fn list_artifacts(
        &self,
        org_id: Uuid,
        query: &EvidenceQuery,
    ) -> Result<(Vec<EvidenceArtifact>, u64)> {
        let mut counter = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM evidence_artifacts a");
        push_artifact_filter(&mut counter, org_id, query);
        let total: i64 = counter
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;

        let (limit, offset) = window(query.page);
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM evidence_artifacts a",
            qualified(ARTIFACT_COLUMNS, "a")
        ));
        push_artifact_filter(&mut qb, org_id, query);
        qb.push(format!(
            " ORDER BY {} {} NULLS LAST, a.id",
            sort_column(query.sort.field),
            query.sort.direction.as_sql()
        ));
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);
        let rows = qb
            .build_query_as::<ArtifactRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok((convert_all(rows)?, count(total)))
    }

    async fn list_chain(&self, org_id: Uuid, root_id: Uuid) -> Result<Vec<EvidenceArtifact>> {
        let sql = format!(
            r#"
            SELECT {ARTIFACT_COLUMNS} FROM evidence_artifacts
            WHERE org_id = $1 AND (id = $2 OR parent_artifact_id = $2)
            ORDER BY version ASC
            "#
        );
        let rows = sqlx::query_as::<_, ArtifactRow>(&sql)
            .bind(org_id)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn create_version(
        &self,
        superseded: Option<&EvidenceArtifact>,
        next: &EvidenceArtifact,
        copy_links_from: Option<Uuid>,
    ) -> Result<Vec<EvidenceLink>> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        if let Some(prev) = superseded {
            let result = update_artifact_query(SUPERSEDE_ARTIFACT, prev)
                .execute(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
            if result.rows_affected() == 0 {
                return Err(GrcError::Conflict(format!(
                    "artifact {} was superseded concurrently",
                    prev.id
                )));
            }
        }

        insert_artifact_query(next)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_or_internal(e, || format!("version {} already exists", next.version)))?;

        let mut copies = Vec::new();
        if let Some(source) = copy_links_from {
            let sql = format!(
                "SELECT {LINK_COLUMNS} FROM evidence_links WHERE org_id = $1 AND artifact_id = $2 ORDER BY created_at, id"
            );
            let rows = sqlx::query_as::<_, LinkRow>(&sql)
                .bind(next.org_id)
                .bind(source)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
            let links: Vec<EvidenceLink> = convert_all(rows)?;
            for link in &links {
                let copy = link.copied_to(next.id, next.created_at);
                insert_link_query(&copy)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| unique_or_internal(e, link_conflict(&copy)))?;
                copies.push(copy);
            }
        }

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(copies)
    }

    async fn insert_link(&self, link: &EvidenceLink) -> Result<()> {
        insert_link_query(link)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_or_internal(e, link_conflict(link)))?;
        Ok(())
    }

    async fn get_link(&self, org_id: Uuid, link_id: Uuid) -> Result<Option<EvidenceLink>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM evidence_links WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(org_id)
            .bind(link_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(crate::rows::convert).transpose()
    }

    async fn list_links(&self, org_id: Uuid, artifact_id: Uuid) -> Result<Vec<EvidenceLink>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM evidence_links WHERE org_id = $1 AND artifact_id = $2 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(org_id)
            .bind(artifact_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn delete_link(&self, org_id: Uuid, link_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM evidence_links WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_evaluation(&self, evaluation: &EvidenceEvaluation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO evidence_evaluations (
                id, org_id, artifact_id, evidence_link_id, verdict, confidence, comments,
                missing_elements, remediation_notes, evaluated_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(evaluation.id)
        .bind(evaluation.org_id)
        .bind(evaluation.artifact_id)
        .bind(evaluation.evidence_link_id)
        .bind(evaluation.verdict.as_str())
        .bind(evaluation.confidence.as_str())
        .bind(&evaluation.comments)
        .bind(&evaluation.missing_elements)
        .bind(&evaluation.remediation_notes)
        .bind(evaluation.evaluated_by)
        .bind(evaluation.created_at)
        .bind(evaluation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn list_evaluations(
        &self,
        org_id: Uuid,
        artifact_id: Uuid,
        page: PageRequest,
    ) -> Result<(Vec<EvidenceEvaluation>, u64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM evidence_evaluations WHERE org_id = $1 AND artifact_id = $2",
        )
        .bind(org_id)
        .bind(artifact_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        let (limit, offset) = window(page);
        let sql = format!(
            r#"
            SELECT {EVALUATION_COLUMNS} FROM evidence_evaluations
            WHERE org_id = $1 AND artifact_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        );
        let rows = sqlx::query_as::<_, EvaluationRow>(&sql)
            .bind(org_id)
            .bind(artifact_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok((convert_all(rows)?, count(total)))
    }

    async fn freshness_summary(
        &self,
        org_id: Uuid,
        now: DateTime<Utc>,
        expiring_soon_days: i64,
    ) -> Result<FreshnessSummary> {
        let soon = now + Duration::days(expiring_soon_days);
        let row = sqlx::query_as::<_, FreshnessRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE expires_at > $3) AS fresh,
                COUNT(*) FILTER (WHERE expires_at >= $2 AND expires_at <= $3) AS expiring_soon,
                COUNT(*) FILTER (WHERE expires_at < $2) AS expired,
                COUNT(*) FILTER (WHERE expires_at IS NULL) AS no_expiry
            FROM evidence_artifacts
            WHERE org_id = $1 AND is_current
            "#,
        )
        .bind(org_id)
        .bind(now)
        .bind(soon)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(row.into())
    }
}

/// Prefixes every column of a comma-separated list with a table alias.
pub(crate) fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
