//! Policies, their versions, sign-offs and control links.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use grc_core::error::GrcError;
use grc_core::policy::types::*;
use grc_core::ports::{CoverageLink, PolicyStore, Result};

use crate::evidence::qualified;
use crate::rows::{
    convert, convert_all, CoverageRow, PolicyControlRow, PolicyRow, SignoffRow, VersionRow,
    POLICY_COLUMNS, POLICY_CONTROL_COLUMNS, SIGNOFF_COLUMNS, VERSION_COLUMNS,
};
use crate::{count, like_pattern, unique_or_internal, window};

pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn sort_column(field: PolicySortField) -> &'static str {
    match field {
        PolicySortField::CreatedAt => "p.created_at",
        PolicySortField::UpdatedAt => "p.updated_at",
        PolicySortField::Identifier => "p.identifier",
        PolicySortField::Title => "lower(p.title)",
        PolicySortField::Status => "p.status",
        PolicySortField::NextReviewAt => "p.next_review_at",
    }
}

fn push_policy_filter(qb: &mut QueryBuilder<'_, Postgres>, org_id: Uuid, query: &PolicyQuery) {
    let f = &query.filter;
    qb.push(" WHERE p.org_id = ");
    qb.push_bind(org_id);
    if let Some(status) = f.status {
        qb.push(" AND p.status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(category) = f.category {
        qb.push(" AND p.category = ");
        qb.push_bind(category.as_str());
    }
    if let Some(owner_id) = f.owner_id {
        qb.push(" AND (p.owner_id = ");
        qb.push_bind(owner_id);
        qb.push(" OR p.secondary_owner_id = ");
        qb.push_bind(owner_id);
        qb.push(")");
    }
    if let Some(is_template) = f.is_template {
        qb.push(" AND p.is_template = ");
        qb.push_bind(is_template);
    }
    if let Some(review) = f.review_status {
        let soon = query.today + Duration::days(query.due_soon_days);
        match review {
            ReviewStatus::NoSchedule => {
                qb.push(" AND p.next_review_at IS NULL");
            }
            ReviewStatus::Overdue => {
                qb.push(" AND p.next_review_at < ");
                qb.push_bind(query.today);
            }
            ReviewStatus::DueSoon => {
                qb.push(" AND p.next_review_at >= ");
                qb.push_bind(query.today);
                qb.push(" AND p.next_review_at <= ");
                qb.push_bind(soon);
            }
            ReviewStatus::OnTrack => {
                qb.push(" AND p.next_review_at > ");
                qb.push_bind(soon);
            }
        }
    }
    if !f.tags.is_empty() {
        qb.push(" AND p.tags && ");
        qb.push_bind(f.tags.clone());
    }
    if let Some(q) = f.q.as_deref() {
        let pattern = like_pattern(q);
        qb.push(" AND (p.identifier ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR p.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR p.description ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
    if let Some(search) = f.search.as_deref() {
        let pattern = like_pattern(search);
        qb.push(" AND (p.identifier ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR p.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR p.description ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR array_to_string(p.tags, ' ') ILIKE ");
        qb.push_bind(pattern);
        qb.push(
            " OR EXISTS (SELECT 1 FROM policy_versions v \
             WHERE v.org_id = p.org_id AND v.id = p.current_version_id \
             AND v.search_vector @@ plainto_tsquery('english', ",
        );
        qb.push_bind(search.to_string());
        qb.push(")))");
    }
}

fn insert_policy_query(p: &Policy) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO policies (
            id, org_id, identifier, title, description, category, status, owner_id,
            secondary_owner_id, current_version_id, review_frequency_days, next_review_at,
            last_reviewed_at, approved_at, approved_version, published_at, is_template,
            template_framework_id, cloned_from_policy_id, tags, created_by, created_at,
            updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
            $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
        )
        "#,
    )
    .bind(p.id)
    .bind(p.org_id)
    .bind(&p.identifier)
    .bind(&p.title)
    .bind(&p.description)
    .bind(p.category.as_str())
    .bind(p.status.as_str())
    .bind(p.owner_id)
    .bind(p.secondary_owner_id)
    .bind(p.current_version_id)
    .bind(p.review_frequency_days)
    .bind(p.next_review_at)
    .bind(p.last_reviewed_at)
    .bind(p.approved_at)
    .bind(p.approved_version)
    .bind(p.published_at)
    .bind(p.is_template)
    .bind(p.template_framework_id)
    .bind(p.cloned_from_policy_id)
    .bind(&p.tags)
    .bind(p.created_by)
    .bind(p.created_at)
    .bind(p.updated_at)
}

fn update_policy_query(p: &Policy) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        UPDATE policies SET
            title = $3, description = $4, category = $5, status = $6, owner_id = $7,
            secondary_owner_id = $8, current_version_id = $9, review_frequency_days = $10,
            next_review_at = $11, last_reviewed_at = $12, approved_at = $13,
            approved_version = $14, published_at = $15, is_template = $16,
            template_framework_id = $17, tags = $18, updated_at = $19
        WHERE org_id = $1 AND id = $2
        "#,
    )
    .bind(p.org_id)
    .bind(p.id)
    .bind(&p.title)
    .bind(&p.description)
    .bind(p.category.as_str())
    .bind(p.status.as_str())
    .bind(p.owner_id)
    .bind(p.secondary_owner_id)
    .bind(p.current_version_id)
    .bind(p.review_frequency_days)
    .bind(p.next_review_at)
    .bind(p.last_reviewed_at)
    .bind(p.approved_at)
    .bind(p.approved_version)
    .bind(p.published_at)
    .bind(p.is_template)
    .bind(p.template_framework_id)
    .bind(&p.tags)
    .bind(p.updated_at)
}

fn insert_version_query(v: &PolicyVersion) -> Query<'_, Postgres, PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO policy_versions (
            id, org_id, policy_id, version_number, is_current, content, content_format,
            content_summary, change_summary, change_type, word_count, character_count,
            created_by, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(v.id)
    .bind(v.org_id)
    .bind(v.policy_id)
    .bind(v.version_number)
    .bind(v.is_current)
    .bind(&v.content)
    .bind(v.content_format.as_str())
    .bind(&v.content_summary)
    .bind(&v.change_summary)
    .bind(v.change_type.as_str())
    .bind(v.word_count)
    .bind(v.character_count)
    .bind(v.created_by)
    .bind(v.created_at)
    .bind(v.updated_at)
}

const WITHDRAW_PENDING: &str = r#"
    UPDATE policy_signoffs
    SET status = 'withdrawn', decided_at = $3, updated_at = $3
    WHERE org_id = $1 AND policy_id = $2 AND status = 'pending'
"#;

fn not_found(p: &Policy) -> GrcError {
    GrcError::NotFound(format!("policy {}", p.id))
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn create_policy(&self, policy: &Policy, version: &PolicyVersion) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        insert_policy_query(policy)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                unique_or_internal(e, || {
                    format!("policy identifier '{}' already exists", policy.identifier)
                })
            })?;
        insert_version_query(version)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_policy(&self, org_id: Uuid, id: Uuid) -> Result<Option<Policy>> {
        let sql = format!("SELECT {POLICY_COLUMNS} FROM policies WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(org_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn find_by_identifier(&self, org_id: Uuid, identifier: &str) -> Result<Option<Policy>> {
        let sql =
            format!("SELECT {POLICY_COLUMNS} FROM policies WHERE org_id = $1 AND identifier = $2");
        let row = sqlx::query_as::<_, PolicyRow>(&sql)
            .bind(org_id)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn update_policy(&self, policy: &Policy) -> Result<()> {
        let result = update_policy_query(policy)
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(not_found(policy));
        }
        Ok(())
    }

    async fn list_policies(
        &self,
        org_id: Uuid,
        query: &PolicyQuery,
    ) -> Result<(Vec<Policy>, u64)> {
        let mut counter = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM policies p");
        push_policy_filter(&mut counter, org_id, query);
        let total: i64 = counter
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;

        let (limit, offset) = window(query.page);
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM policies p",
            qualified(POLICY_COLUMNS, "p")
        ));
        push_policy_filter(&mut qb, org_id, query);
        qb.push(format!(
            " ORDER BY {} {} NULLS LAST, p.id",
            sort_column(query.sort.field),
            query.sort.direction.as_sql()
        ));
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);
        let rows = qb
            .build_query_as::<PolicyRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok((convert_all(rows)?, count(total)))
    }

    async fn get_version(&self, org_id: Uuid, version_id: Uuid) -> Result<Option<PolicyVersion>> {
        let sql =
            format!("SELECT {VERSION_COLUMNS} FROM policy_versions WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(org_id)
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn get_version_by_number(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
        version_number: i32,
    ) -> Result<Option<PolicyVersion>> {
        let sql = format!(
            r#"
            SELECT {VERSION_COLUMNS} FROM policy_versions
            WHERE org_id = $1 AND policy_id = $2 AND version_number = $3
            "#
        );
        let row = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(org_id)
            .bind(policy_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn list_versions(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicyVersion>> {
        let sql = format!(
            r#"
            SELECT {VERSION_COLUMNS} FROM policy_versions
            WHERE org_id = $1 AND policy_id = $2
            ORDER BY version_number DESC
            "#
        );
        let rows = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(org_id)
            .bind(policy_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn create_version(
        &self,
        policy: &Policy,
        version: &PolicyVersion,
        withdrawn_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;

        sqlx::query(
            r#"
            UPDATE policy_versions SET is_current = FALSE, updated_at = $3
            WHERE org_id = $1 AND policy_id = $2 AND is_current
            "#,
        )
        .bind(policy.org_id)
        .bind(policy.id)
        .bind(version.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| anyhow!(e))?;

        insert_version_query(version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                unique_or_internal(e, || {
                    format!("version {} already exists", version.version_number)
                })
            })?;

        let result = update_policy_query(policy)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(not_found(policy));
        }

        let withdrawn = sqlx::query(WITHDRAW_PENDING)
            .bind(policy.org_id)
            .bind(policy.id)
            .bind(withdrawn_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?
            .rows_affected();

        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(withdrawn)
    }

    async fn submit_for_review(&self, policy: &Policy, signoffs: &[PolicySignoff]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let result = update_policy_query(policy)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(not_found(policy));
        }
        for s in signoffs {
            sqlx::query(
                r#"
                INSERT INTO policy_signoffs (
                    id, org_id, policy_id, policy_version_id, signer_id, signer_role,
                    requested_by, requested_at, due_date, status, decided_at, comments,
                    reminder_count, reminder_sent_at, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(s.id)
            .bind(s.org_id)
            .bind(s.policy_id)
            .bind(s.policy_version_id)
            .bind(s.signer_id)
            .bind(s.signer_role.as_str())
            .bind(s.requested_by)
            .bind(s.requested_at)
            .bind(s.due_date)
            .bind(s.status.as_str())
            .bind(s.decided_at)
            .bind(&s.comments)
            .bind(s.reminder_count)
            .bind(s.reminder_sent_at)
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        }
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(())
    }

    async fn get_signoff(&self, org_id: Uuid, signoff_id: Uuid) -> Result<Option<PolicySignoff>> {
        let sql =
            format!("SELECT {SIGNOFF_COLUMNS} FROM policy_signoffs WHERE org_id = $1 AND id = $2");
        let row = sqlx::query_as::<_, SignoffRow>(&sql)
            .bind(org_id)
            .bind(signoff_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        row.map(convert).transpose()
    }

    async fn list_signoffs(&self, org_id: Uuid, policy_id: Uuid) -> Result<Vec<PolicySignoff>> {
        let sql = format!(
            r#"
            SELECT {SIGNOFF_COLUMNS} FROM policy_signoffs
            WHERE org_id = $1 AND policy_id = $2
            ORDER BY requested_at, id
            "#
        );
        let rows = sqlx::query_as::<_, SignoffRow>(&sql)
            .bind(org_id)
            .bind(policy_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn list_pending_for_signer(
        &self,
        org_id: Uuid,
        signer_id: Uuid,
    ) -> Result<Vec<PolicySignoff>> {
        let sql = format!(
            r#"
            SELECT {SIGNOFF_COLUMNS} FROM policy_signoffs
            WHERE org_id = $1 AND signer_id = $2 AND status = 'pending'
            ORDER BY due_date NULLS LAST, requested_at, id
            "#
        );
        let rows = sqlx::query_as::<_, SignoffRow>(&sql)
            .bind(org_id)
            .bind(signer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn update_signoff(&self, signoff: &PolicySignoff) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE policy_signoffs SET
                status = $3, decided_at = $4, comments = $5, reminder_count = $6,
                reminder_sent_at = $7, updated_at = $8
            WHERE org_id = $1 AND id = $2
            "#,
        )
        .bind(signoff.org_id)
        .bind(signoff.id)
        .bind(signoff.status.as_str())
        .bind(signoff.decided_at)
        .bind(&signoff.comments)
        .bind(signoff.reminder_count)
        .bind(signoff.reminder_sent_at)
        .bind(signoff.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(GrcError::NotFound(format!("sign-off {}", signoff.id)));
        }
        Ok(())
    }

    async fn count_pending_signoffs(&self, org_id: Uuid, version_id: Uuid) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM policy_signoffs
            WHERE org_id = $1 AND policy_version_id = $2 AND status = 'pending'
            "#,
        )
        .bind(org_id)
        .bind(version_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(count(n))
    }

    async fn archive_policy(&self, policy: &Policy, at: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(|e| anyhow!(e))?;
        let result = update_policy_query(policy)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?;
        if result.rows_affected() == 0 {
            return Err(not_found(policy));
        }
        let withdrawn = sqlx::query(WITHDRAW_PENDING)
            .bind(policy.org_id)
            .bind(policy.id)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| anyhow!(e))?
            .rows_affected();
        tx.commit().await.map_err(|e| anyhow!(e))?;
        Ok(withdrawn)
    }

    async fn insert_control_link(&self, link: &PolicyControl) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO policy_controls (
                id, org_id, policy_id, control_id, coverage, notes, linked_by,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(link.id)
        .bind(link.org_id)
        .bind(link.policy_id)
        .bind(link.control_id)
        .bind(link.coverage.as_str())
        .bind(&link.notes)
        .bind(link.linked_by)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            unique_or_internal(e, || {
                format!("control {} is already linked to this policy", link.control_id)
            })
        })?;
        Ok(())
    }

    async fn list_control_links(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
    ) -> Result<Vec<PolicyControl>> {
        let sql = format!(
            r#"
            SELECT {POLICY_CONTROL_COLUMNS} FROM policy_controls
            WHERE org_id = $1 AND policy_id = $2
            ORDER BY created_at, id
            "#
        );
        let rows = sqlx::query_as::<_, PolicyControlRow>(&sql)
            .bind(org_id)
            .bind(policy_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }

    async fn delete_control_link(
        &self,
        org_id: Uuid,
        policy_id: Uuid,
        control_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM policy_controls WHERE org_id = $1 AND policy_id = $2 AND control_id = $3",
        )
        .bind(org_id)
        .bind(policy_id)
        .bind(control_id)
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_coverage_links(&self, org_id: Uuid) -> Result<Vec<CoverageLink>> {
        let rows = sqlx::query_as::<_, CoverageRow>(
            r#"
            SELECT p.id AS policy_id, p.identifier AS policy_identifier,
                   p.title AS policy_title, p.status AS policy_status,
                   pc.control_id, pc.coverage
            FROM policy_controls pc
            JOIN policies p ON p.org_id = pc.org_id AND p.id = pc.policy_id
            WHERE pc.org_id = $1 AND p.status <> 'archived'
            ORDER BY p.identifier, pc.created_at
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| anyhow!(e))?;
        convert_all(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use grc_core::pagination::PageRequest;

    fn query(filter: PolicyFilter) -> PolicyQuery {
        PolicyQuery {
            filter,
            sort: PolicySort::default(),
            page: PageRequest::default(),
            today: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            due_soon_days: 30,
        }
    }

    #[test]
    fn owner_filter_covers_secondary_owner() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM policies p");
        push_policy_filter(
            &mut qb,
            Uuid::nil(),
            &query(PolicyFilter {
                owner_id: Some(Uuid::nil()),
                ..PolicyFilter::default()
            }),
        );
        assert!(qb
            .sql()
            .contains("(p.owner_id = $2 OR p.secondary_owner_id = $3)"));
    }

    #[test]
    fn review_windows_translate_to_date_ranges() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM policies p");
        push_policy_filter(
            &mut qb,
            Uuid::nil(),
            &query(PolicyFilter {
                review_status: Some(ReviewStatus::DueSoon),
                ..PolicyFilter::default()
            }),
        );
        assert!(qb
            .sql()
            .ends_with("p.next_review_at >= $2 AND p.next_review_at <= $3"));

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM policies p");
        push_policy_filter(
            &mut qb,
            Uuid::nil(),
            &query(PolicyFilter {
                review_status: Some(ReviewStatus::NoSchedule),
                ..PolicyFilter::default()
            }),
        );
        assert!(qb.sql().ends_with("p.next_review_at IS NULL"));
    }

    #[test]
    fn search_parentheses_balance() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM policies p");
        push_policy_filter(
            &mut qb,
            Uuid::nil(),
            &query(PolicyFilter {
                search: Some("encryption".into()),
                ..PolicyFilter::default()
            }),
        );
        let sql = qb.sql();
        assert_eq!(sql.matches('(').count(), sql.matches(')').count());
    }
}
