//! Audit engagements, PBC requests, evidence submissions, findings and
//! comments.
//!
//! The four counters on `audits` are written only by `set_*_counters`;
//! `update_audit` leaves them untouched.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use grc_core::audit::types::*;
use grc_core::error::GrcError;
use grc_core::pagination::PageRequest;
use grc_core::ports::{AuditStore, Result};

use crate::evidence::qualified;
use crate::rows::{
    convert, convert_all, AuditRow, CommentRow, FindingRow, RequestRow, StatusCountRow,
    SubmissionRow, TemplateRow, AUDIT_COLUMNS, COMMENT_COLUMNS, FINDING_COLUMNS,
    REQUEST_COLUMNS, SUBMISSION_COLUMNS, TEMPLATE_COLUMNS,
};
use crate::{count, escape_like, like_pattern, unique_or_internal, window};

fn insert_request_query(r: &AuditRequest) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO audit_requests (
            id, org_id, audit_id, title, description, priority, status, control_id,
            requirement_id, requested_by, assigned_to, due_date, submitted_at,
            reviewed_at, reviewed_by, reviewer_notes, reference_number, tags,
            created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
        )
        "#,
    )
    .bind(r.id)
    .bind(r.org_id)
    .bind(r.audit_id)
    .bind(&r.title)
    .bind(&r.description)
    .bind(r.priority.as_str())
    .bind(r.status.as_str())
    .bind(r.control_id)
    .bind(r.requirement_id)
    .bind(r.requested_by)
    .bind(r.assigned_to)
    .bind(r.due_date)
    .bind(r.submitted_at)
    .bind(r.reviewed_at)
    .bind(r.reviewed_by)
    .bind(&r.reviewer_notes)
    .bind(&r.reference_number)
    .bind(&r.tags)
    .bind(r.created_at)
    .bind(r.updated_at)
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn status_counts<T>(&self, table: &str, org_id: Uuid, audit_id: Uuid) -> Result<Vec<(T, u64)>>
    where
        T: std::str::FromStr<Err = GrcError>,
    {
        let sql = format!(
            "SELECT status, COUNT(*) AS n FROM {table} WHERE org_id = $1 AND audit_id = $2 GROUP BY status ORDER BY status"
        );
        let rows = sqlx::query_as::<_, StatusCountRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        rows.into_iter()
            .map(|r| r.parse().map_err(|e: String| GrcError::Internal(anyhow!(e))))
            .collect()
    }

    async fn set_counters(
        &self,
        sql: &str,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(total)
            .bind(open)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::AuditNotFound);
        }
        Ok(())
    }
}

// ── Filters ───────────────────────────────────────────────────

fn audit_sort_column(field: AuditSortField) -> &'static str {
    match field {
        AuditSortField::CreatedAt => "a.created_at",
        AuditSortField::UpdatedAt => "a.updated_at",
        AuditSortField::Title => "lower(a.title)",
        AuditSortField::Status => "a.status",
        AuditSortField::PlannedStart => "a.planned_start",
    }
}

fn push_audit_filter(qb: &mut QueryBuilder<'_, Postgres>, org_id: Uuid, f: &AuditFilter) {
    qb.push(" WHERE a.org_id = ");
    qb.push_bind(org_id);
    if let Some(status) = f.status {
        qb.push(" AND a.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(audit_type) = f.audit_type {
        qb.push(" AND a.audit_type = ");
        qb.push_bind(audit_type.as_str());
    }
    if let Some(framework_id) = f.framework_id {
        qb.push(" AND a.framework_id = ");
        qb.push_bind(framework_id);
    }
    if let Some(auditor_id) = f.auditor_id {
        qb.push(" AND ");
        qb.push_bind(auditor_id);
        qb.push(" = ANY(a.auditor_ids)");
    }
    if let Some(q) = f.q.as_deref() {
        let pattern = like_pattern(q);
        qb.push(" AND (a.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR a.description ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR a.audit_firm ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

fn push_request_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    org_id: Uuid,
    audit_id: Uuid,
    f: &RequestFilter,
) {
    qb.push(" WHERE r.org_id = ");
    qb.push_bind(org_id);
    qb.push(" AND r.audit_id = ");
    qb.push_bind(audit_id);
    if let Some(status) = f.status {
        qb.push(" AND r.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(priority) = f.priority {
        qb.push(" AND r.priority = ");
        qb.push_bind(priority.as_str());
    }
    if let Some(assigned_to) = f.assigned_to {
        qb.push(" AND r.assigned_to = ");
        qb.push_bind(assigned_to);
    }
    if let Some(control_id) = f.control_id {
        qb.push(" AND r.control_id = ");
        qb.push_bind(control_id);
    }
    if let Some(q) = f.q.as_deref() {
        let pattern = like_pattern(q);
        qb.push(" AND (r.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR r.description ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR r.reference_number ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

fn push_finding_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    org_id: Uuid,
    audit_id: Uuid,
    f: &FindingFilter,
) {
    qb.push(" WHERE f.org_id = ");
    qb.push_bind(org_id);
    qb.push(" AND f.audit_id = ");
    qb.push_bind(audit_id);
    if let Some(status) = f.status {
        qb.push(" AND f.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(severity) = f.severity {
        qb.push(" AND f.severity = ");
        qb.push_bind(severity.as_str());
    }
    if let Some(owner) = f.remediation_owner_id {
        qb.push(" AND f.remediation_owner_id = ");
        qb.push_bind(owner);
    }
    if let Some(control_id) = f.control_id {
        qb.push(" AND f.control_id = ");
        qb.push_bind(control_id);
    }
    if let Some(q) = f.q.as_deref() {
        let pattern = like_pattern(q);
        qb.push(" AND (f.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR f.description ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

fn push_comment_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    org_id: Uuid,
    audit_id: Uuid,
    query: &CommentQuery,
) {
    qb.push(" WHERE c.org_id = ");
    qb.push_bind(org_id);
    qb.push(" AND c.audit_id = ");
    qb.push_bind(audit_id);
    if !query.include_internal {
        qb.push(" AND NOT c.is_internal");
    }
    if let Some(target_type) = query.filter.target_type {
        qb.push(" AND c.target_type = ");
        qb.push_bind(target_type.as_str());
    }
    if let Some(target_id) = query.filter.target_id {
        qb.push(" AND c.target_id = ");
        qb.push_bind(target_id);
    }
}

/// Runs the count and page queries of a list endpoint over one filter.
async fn fetch_page<R>(
    pool: &PgPool,
    table: &str,
    alias: &str,
    columns: &str,
    order_by: &str,
    page: PageRequest,
    push_filter: impl Fn(&mut QueryBuilder<'_, Postgres>),
) -> Result<(Vec<R>, u64)>
where
    R: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    let mut counter = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {table} {alias}"));
    push_filter(&mut counter);
    let total: i64 = counter
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow!(e))?;

    let (limit, offset) = window(page);
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM {table} {alias}",
        qualified(columns, alias)
    ));
    push_filter(&mut qb);
    qb.push(format!(" ORDER BY {order_by}"));
    qb.push(" LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);
    let rows = qb
        .build_query_as::<R>()
        .fetch_all(pool)
        .await
        .map_err(|e| anyhow!(e))?;
    Ok((rows, count(total)))
}

const SET_REQUEST_COUNTERS: &str = r#"
    UPDATE audits SET total_requests = $3, open_requests = $4, updated_at = $5
    WHERE org_id = $1 AND id = $2
"#;

const SET_FINDING_COUNTERS: &str = r#"
    UPDATE audits SET total_findings = $3, open_findings = $4, updated_at = $5
    WHERE org_id = $1 AND id = $2
"#;

#[async_trait]
impl AuditStore for PgAuditStore {
    // ── Engagements ───────────────────────────────────────────

    async fn insert_audit(&self, a: &Audit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audits (
                id, org_id, title, description, audit_type, status, framework_id,
                period_start, period_end, planned_start, planned_end, actual_start, actual_end,
                audit_firm, lead_auditor, internal_lead_id, auditor_ids, milestones,
                report_metadata, total_requests, open_requests, total_findings, open_findings,
                tags, created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            "#,
        )
        .bind(a.id)
        .bind(a.org_id)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.audit_type.as_str())
        .bind(a.status.as_str())
        .bind(a.framework_id)
        .bind(a.period_start)
        .bind(a.period_end)
        .bind(a.planned_start)
        .bind(a.planned_end)
        .bind(a.actual_start)
        .bind(a.actual_end)
        .bind(&a.audit_firm)
        .bind(&a.lead_auditor)
        .bind(a.internal_lead_id)
        .bind(&a.auditor_ids)
        .bind(&a.milestones)
        .bind(&a.report_metadata)
        .bind(a.total_requests)
        .bind(a.open_requests)
        .bind(a.total_findings)
        .bind(a.open_findings)
        .bind(&a.tags)
        .bind(a.created_by)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_audit(&self, org_id: Uuid, id: Uuid) -> Result<Option<Audit>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_audit(&self, a: &Audit) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audits SET
                title = $3, description = $4, audit_type = $5, status = $6,
                framework_id = $7, period_start = $8, period_end = $9,
                planned_start = $10, planned_end = $11, actual_start = $12,
                actual_end = $13, audit_firm = $14, lead_auditor = $15,
                internal_lead_id = $16, auditor_ids = $17, milestones = $18,
                report_metadata = $19, tags = $20, updated_at = $21
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(a.org_id)
        .bind(a.id)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.audit_type.as_str())
        .bind(a.status.as_str())
        .bind(a.framework_id)
        .bind(a.period_start)
        .bind(a.period_end)
        .bind(a.planned_start)
        .bind(a.planned_end)
        .bind(a.actual_start)
        .bind(a.actual_end)
        .bind(&a.audit_firm)
        .bind(&a.lead_auditor)
        .bind(a.internal_lead_id)
        .bind(&a.auditor_ids)
        .bind(&a.milestones)
        .bind(&a.report_metadata)
        .bind(&a.tags)
        .bind(a.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::AuditNotFound);
        }
        Ok(())
    }

    async fn list_audits(
        &self,
        org_id: Uuid,
        filter: &AuditFilter,
        sort: AuditSort,
        page: PageRequest,
    ) -> Result<(Vec<Audit>, u64)> {
        let order_by = format!(
            "{} {} NULLS LAST, a.id",
            audit_sort_column(sort.field),
            sort.direction.as_sql()
        );
        let (rows, total) = fetch_page::<AuditRow>(
            &self.pool,
            "audits",
            "a",
            AUDIT_COLUMNS,
            &order_by,
            page,
            |qb| push_audit_filter(qb, org_id, filter),
        )
        .await?;
        Ok((convert_all(rows)?, total))
    }

    async fn list_audit_ids(&self, org_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM audits WHERE org_id = $1 ORDER BY created_at, id")
                .bind(org_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| anyhow!(e))?;
        Ok(ids)
    }

    async fn dashboard(&self, org_id: Uuid, auditor_id: Option<Uuid>) -> Result<AuditDashboard> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r#"
            SELECT status, COUNT(*) AS n FROM audits
            WHERE org_id = $1 AND ($2::uuid IS NULL OR $2 = ANY(auditor_ids))
            GROUP BY status
            "#,
        )
        .bind(org_id)
        .bind(auditor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        let counted: Vec<(AuditStatus, u64)> = rows
            .into_iter()
            .map(|r| r.parse().map_err(|e: String| GrcError::Internal(anyhow!(e))))
            .collect::<Result<_>>()?;

        let (open_requests, open_findings): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(open_requests), 0)::BIGINT,
                   COALESCE(SUM(open_findings), 0)::BIGINT
            FROM audits
            WHERE org_id = $1 AND ($2::uuid IS NULL OR $2 = ANY(auditor_ids))
            "#,
        )
        .bind(org_id)
        .bind(auditor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;

        Ok(AuditDashboard {
            by_status: AuditStatus::ALL
                .iter()
                .map(|s| {
                    let n = counted
                        .iter()
                        .find(|(status, _)| status == s)
                        .map_or(0, |(_, n)| *n);
                    (*s, n)
                })
                .collect(),
            open_requests,
            open_findings,
        })
    }

    async fn set_request_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_counters(SET_REQUEST_COUNTERS, org_id, audit_id, total, open, at)
            .await
    }

    async fn set_finding_counters(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        total: i32,
        open: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.set_counters(SET_FINDING_COUNTERS, org_id, audit_id, total, open, at)
            .await
    }

    // ── Requests ──────────────────────────────────────────────

    async fn insert_request(&self, request: &AuditRequest) -> Result<()> {
        insert_request_query(request)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn insert_requests(&self, requests: &[AuditRequest]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        for request in requests {
            insert_request_query(request)
                .execute(&mut *tx)
                .await
                .map_err(|e| anyhow!(e))?;
        }
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_request(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditRequest>> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM audit_requests WHERE org_id = $1 AND audit_id = $2 AND id = $3"
        );
        let row = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_request(&self, r: &AuditRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_requests SET
                title = $3, description = $4, priority = $5, status = $6, control_id = $7,
                requirement_id = $8, assigned_to = $9, due_date = $10, submitted_at = $11,
                reviewed_at = $12, reviewed_by = $13, reviewer_notes = $14,
                reference_number = $15, tags = $16, updated_at = $17
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(r.org_id)
        .bind(r.id)
        .bind(&r.title)
        .bind(&r.description)
        .bind(r.priority.as_str())
        .bind(r.status.as_str())
        .bind(r.control_id)
        .bind(r.requirement_id)
        .bind(r.assigned_to)
        .bind(r.due_date)
        .bind(r.submitted_at)
        .bind(r.reviewed_at)
        .bind(r.reviewed_by)
        .bind(&r.reviewer_notes)
        .bind(&r.reference_number)
        .bind(&r.tags)
        .bind(r.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::AuditRequestNotFound);
        }
        Ok(())
    }

    async fn list_requests(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditRequest>, u64)> {
        let (rows, total) = fetch_page::<RequestRow>(
            &self.pool,
            "audit_requests",
            "r",
            REQUEST_COLUMNS,
            "r.created_at, r.id",
            page,
            |qb| push_request_filter(qb, org_id, audit_id, filter),
        )
        .await?;
        Ok((convert_all(rows)?, total))
    }

    async fn request_status_counts(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Vec<(AuditRequestStatus, u64)>> {
        self.status_counts("audit_requests", org_id, audit_id).await
    }

    async fn list_reference_numbers(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        prefix: &str,
    ) -> Result<Vec<String>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT reference_number FROM audit_requests
            WHERE org_id = $1 AND audit_id = $2 AND reference_number LIKE $3
            "#,
        )
        .bind(org_id)
        .bind(audit_id)
        .bind(format!("{}-%", escape_like(prefix)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(numbers)
    }

    async fn get_templates(
        &self,
        org_id: Uuid,
        template_ids: &[Uuid],
    ) -> Result<Vec<AuditRequestTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM audit_request_templates WHERE org_id = $1 AND id = ANY($2)"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(org_id)
            .bind(template_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    // ── Evidence submissions ──────────────────────────────────

    async fn insert_submission(&self, link: &AuditEvidenceLink) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_evidence_links (
                id, org_id, audit_id, request_id, artifact_id, submitted_by, submitted_at,
                submission_notes, status, reviewed_by, reviewed_at, review_notes,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(link.id)
        .bind(link.org_id)
        .bind(link.audit_id)
        .bind(link.request_id)
        .bind(link.artifact_id)
        .bind(link.submitted_by)
        .bind(link.submitted_at)
        .bind(&link.submission_notes)
        .bind(link.status.as_str())
        .bind(link.reviewed_by)
        .bind(link.reviewed_at)
        .bind(&link.review_notes)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_or_internal(e, || {
                format!("artifact {} already submitted for this request", link.artifact_id)
            })
        })?;
        Ok(())
    }

    async fn get_submission(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditEvidenceLink>> {
        let sql = format!(
            "SELECT {SUBMISSION_COLUMNS} FROM audit_evidence_links WHERE org_id = $1 AND audit_id = $2 AND id = $3"
        );
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_submission(&self, link: &AuditEvidenceLink) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_evidence_links SET
                submission_notes = $3, status = $4, reviewed_by = $5, reviewed_at = $6,
                review_notes = $7, updated_at = $8
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(link.org_id)
        .bind(link.id)
        .bind(&link.submission_notes)
        .bind(link.status.as_str())
        .bind(link.reviewed_by)
        .bind(link.reviewed_at)
        .bind(&link.review_notes)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::NotFound(format!("evidence submission {}", link.id)));
        }
        Ok(())
    }

    async fn delete_submission(&self, org_id: Uuid, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM audit_evidence_links WHERE org_id = $1 AND id = $2")
            .bind(org_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_submissions(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<AuditEvidenceLink>> {
        let sql = format!(
            r#"
            SELECT {SUBMISSION_COLUMNS} FROM audit_evidence_links
            WHERE org_id = $1 AND audit_id = $2 AND request_id = $3
            ORDER BY submitted_at, id
            "#
        );
        let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn count_submissions(&self, org_id: Uuid, request_id: Uuid) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM audit_evidence_links WHERE org_id = $1 AND request_id = $2",
        )
        .bind(org_id)
        .bind(request_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(count(n))
    }

    // ── Findings ──────────────────────────────────────────────

    async fn insert_finding(&self, f: &AuditFinding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_findings (
                id, org_id, audit_id, title, description, severity, category, status,
                control_id, requirement_id, found_by, remediation_owner_id, remediation_plan,
                remediation_due_date, remediation_started_at, remediation_completed_at,
                verified_at, verified_by, verification_notes, risk_accepted,
                risk_acceptance_reason, risk_accepted_by, risk_accepted_at, reference_number,
                recommendation, management_response, tags, metadata, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30
            )
            "#,
        )
        .bind(f.id)
        .bind(f.org_id)
        .bind(f.audit_id)
        .bind(&f.title)
        .bind(&f.description)
        .bind(f.severity.as_str())
        .bind(&f.category)
        .bind(f.status.as_str())
        .bind(f.control_id)
        .bind(f.requirement_id)
        .bind(f.found_by)
        .bind(f.remediation_owner_id)
        .bind(&f.remediation_plan)
        .bind(f.remediation_due_date)
        .bind(f.remediation_started_at)
        .bind(f.remediation_completed_at)
        .bind(f.verified_at)
        .bind(f.verified_by)
        .bind(&f.verification_notes)
        .bind(f.risk_accepted)
        .bind(&f.risk_acceptance_reason)
        .bind(f.risk_accepted_by)
        .bind(f.risk_accepted_at)
        .bind(&f.reference_number)
        .bind(&f.recommendation)
        .bind(&f.management_response)
        .bind(&f.tags)
        .bind(&f.metadata)
        .bind(f.created_at)
        .bind(f.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_finding(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditFinding>> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM audit_findings WHERE org_id = $1 AND audit_id = $2 AND id = $3"
        );
        let row = sqlx::query_as::<_, FindingRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_finding(&self, f: &AuditFinding) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_findings SET
                title = $3, description = $4, severity = $5, category = $6, status = $7,
                control_id = $8, requirement_id = $9, remediation_owner_id = $10,
                remediation_plan = $11, remediation_due_date = $12,
                remediation_started_at = $13, remediation_completed_at = $14,
                verified_at = $15, verified_by = $16, verification_notes = $17,
                risk_accepted = $18, risk_acceptance_reason = $19, risk_accepted_by = $20,
                risk_accepted_at = $21, reference_number = $22, recommendation = $23,
                management_response = $24, tags = $25, metadata = $26, updated_at = $27
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(f.org_id)
        .bind(f.id)
        .bind(&f.title)
        .bind(&f.description)
        .bind(f.severity.as_str())
        .bind(&f.category)
        .bind(f.status.as_str())
        .bind(f.control_id)
        .bind(f.requirement_id)
        .bind(f.remediation_owner_id)
        .bind(&f.remediation_plan)
        .bind(f.remediation_due_date)
        .bind(f.remediation_started_at)
        .bind(f.remediation_completed_at)
        .bind(f.verified_at)
        .bind(f.verified_by)
        .bind(&f.verification_notes)
        .bind(f.risk_accepted)
        .bind(&f.risk_acceptance_reason)
        .bind(f.risk_accepted_by)
        .bind(f.risk_accepted_at)
        .bind(&f.reference_number)
        .bind(&f.recommendation)
        .bind(&f.management_response)
        .bind(&f.tags)
        .bind(&f.metadata)
        .bind(f.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::AuditFindingNotFound);
        }
        Ok(())
    }

    async fn list_findings(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        filter: &FindingFilter,
        page: PageRequest,
    ) -> Result<(Vec<AuditFinding>, u64)> {
        let (rows, total) = fetch_page::<FindingRow>(
            &self.pool,
            "audit_findings",
            "f",
            FINDING_COLUMNS,
            "f.created_at, f.id",
            page,
            |qb| push_finding_filter(qb, org_id, audit_id, filter),
        )
        .await?;
        Ok((convert_all(rows)?, total))
    }

    async fn finding_status_counts(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
    ) -> Result<Vec<(FindingStatus, u64)>> {
        self.status_counts("audit_findings", org_id, audit_id).await
    }

    // ── Comments ──────────────────────────────────────────────

    async fn insert_comment(&self, c: &AuditComment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_comments (
                id, org_id, audit_id, target_type, target_id, author_id, body,
                parent_comment_id, is_internal, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(c.id)
        .bind(c.org_id)
        .bind(c.audit_id)
        .bind(c.target_type.as_str())
        .bind(c.target_id)
        .bind(c.author_id)
        .bind(&c.body)
        .bind(c.parent_comment_id)
        .bind(c.is_internal)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_comment(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        id: Uuid,
    ) -> Result<Option<AuditComment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM audit_comments WHERE org_id = $1 AND audit_id = $2 AND id = $3"
        );
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(org_id)
            .bind(audit_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_comment(&self, c: &AuditComment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_comments SET body = $3, is_internal = $4, updated_at = $5
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(c.org_id)
        .bind(c.id)
        .bind(&c.body)
        .bind(c.is_internal)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::AuditCommentNotFound);
        }
        Ok(())
    }

    async fn delete_comment(&self, org_id: Uuid, id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM audit_comments WHERE org_id = $1 AND (id = $2 OR parent_comment_id = $2)",
        )
        .bind(org_id)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected())
    }

    async fn list_comments(
        &self,
        org_id: Uuid,
        audit_id: Uuid,
        query: &CommentQuery,
    ) -> Result<(Vec<AuditComment>, u64)> {
        let (rows, total) = fetch_page::<CommentRow>(
            &self.pool,
            "audit_comments",
            "c",
            COMMENT_COLUMNS,
            "c.created_at, c.id",
            query.page,
            |qb| push_comment_filter(qb, org_id, audit_id, query),
        )
        .await?;
        Ok((convert_all(rows)?, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auditor_filter_checks_array_membership() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audits a");
        push_audit_filter(
            &mut qb,
            Uuid::nil(),
            &AuditFilter {
                auditor_id: Some(Uuid::nil()),
                ..AuditFilter::default()
            },
        );
        assert!(qb.sql().ends_with("AND $2 = ANY(a.auditor_ids)"));
    }

    #[test]
    fn comment_filter_hides_internal_unless_allowed() {
        let mut query = CommentQuery {
            filter: CommentFilter::default(),
            include_internal: false,
            page: PageRequest::default(),
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_comments c");
        push_comment_filter(&mut qb, Uuid::nil(), Uuid::nil(), &query);
        assert!(qb.sql().contains("NOT c.is_internal"));

        query.include_internal = true;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_comments c");
        push_comment_filter(&mut qb, Uuid::nil(), Uuid::nil(), &query);
        assert!(!qb.sql().contains("is_internal"));
    }

    #[test]
    fn request_filter_is_scoped_to_org_and_audit() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_requests r");
        push_request_filter(
            &mut qb,
            Uuid::nil(),
            Uuid::nil(),
            &RequestFilter {
                q: Some("PBC".into()),
                ..RequestFilter::default()
            },
        );
        let sql = qb.sql();
        assert!(sql.contains("WHERE r.org_id = $1 AND r.audit_id = $2"));
        assert!(sql.contains("r.reference_number ILIKE $5"));
    }
}
