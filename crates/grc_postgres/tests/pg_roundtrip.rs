//! Runs the core services against a live Postgres.
//!
//! Needs `DATABASE_URL` pointing at a scratch database:
//!   cargo test -p grc_postgres -- --ignored

use uuid::Uuid;

use grc_core::audit::types::{AuditRequestStatus, AuditStatus, AuditType, CreateAudit, CreateRequest};
use grc_core::config::CoreConfig;
use grc_core::policy::types::{ContentFormat, CreatePolicy, PolicyCategory};
use grc_core::ports::{AuditStore, PolicyStore};
use grc_core::{GrcCore, Principal, Role};
use grc_postgres::{DbConfig, PgStores};

const SCHEMA: &str = include_str!("../migrations/0001_grc_core.sql");

async fn setup() -> anyhow::Result<(sqlx::PgPool, GrcCore, PgStores)> {
    dotenvy::dotenv().ok();
    let pool = DbConfig::from_env()?.connect().await?;
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;
    let stores = PgStores::new(pool.clone());
    let core = GrcCore::new(stores.ports(), CoreConfig::default());
    Ok((pool, core, stores))
}

async fn user(pool: &sqlx::PgPool, org_id: Uuid, role: Role) -> anyhow::Result<Principal> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO users (id, org_id, email, role, is_active) VALUES ($1, $2, $3, $4, TRUE)"#,
    )
    .bind(id)
    .bind(org_id)
    .bind(format!("{id}@example.test"))
    .bind(role.as_str())
    .execute(pool)
    .await?;
    Ok(Principal::new(id, org_id, role))
}

fn audit_input(auditor: Uuid) -> CreateAudit {
    CreateAudit {
        title: "SOC 2 Type II".into(),
        description: None,
        audit_type: AuditType::External,
        framework_id: None,
        period_start: None,
        period_end: None,
        planned_start: None,
        planned_end: None,
        audit_firm: Some("Example LLP".into()),
        lead_auditor: None,
        internal_lead_id: None,
        auditor_ids: vec![auditor],
        milestones: None,
        report_metadata: None,
        tags: vec!["soc2".into()],
    }
}

fn request_input(title: &str) -> CreateRequest {
    CreateRequest {
        title: title.into(),
        description: None,
        priority: None,
        control_id: None,
        requirement_id: None,
        assigned_to: None,
        due_date: None,
        reference_number: None,
        tags: vec![],
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn audit_requests_keep_counters_in_sync() -> anyhow::Result<()> {
    let (pool, core, stores) = setup().await?;
    let org = Uuid::new_v4();
    let manager = user(&pool, org, Role::ComplianceManager).await?;
    let auditor = user(&pool, org, Role::Auditor).await?;

    let created = core
        .audits
        .create_audit(&manager, audit_input(auditor.user_id))
        .await?;
    assert_eq!(created.status, AuditStatus::Planning);

    let first = core
        .audits
        .create_request(&auditor, created.id, request_input("Access review"))
        .await?;
    core.audits
        .create_request(&auditor, created.id, request_input("Change tickets"))
        .await?;
    assert_eq!(first.status, AuditRequestStatus::Open);

    let audit = stores
        .audits
        .get_audit(org, created.id)
        .await?
        .expect("audit row");
    assert_eq!(audit.total_requests, 2);
    assert_eq!(audit.open_requests, 2);
    assert_eq!(audit.auditor_ids, vec![auditor.user_id]);

    let dashboard = core.audits.dashboard(&auditor).await?;
    assert!(dashboard
        .by_status
        .iter()
        .any(|(status, n)| *status == AuditStatus::Planning && *n == 1));

    // Another tenant never sees the row.
    assert!(stores.audits.get_audit(Uuid::new_v4(), created.id).await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn policy_identifier_is_unique_per_org() -> anyhow::Result<()> {
    let (pool, core, stores) = setup().await?;
    let org = Uuid::new_v4();
    let manager = user(&pool, org, Role::ComplianceManager).await?;

    let input = CreatePolicy {
        identifier: "POL-AC-01".into(),
        title: "Access control".into(),
        description: None,
        category: PolicyCategory::InformationSecurity,
        owner_id: None,
        secondary_owner_id: None,
        review_frequency_days: Some(365),
        is_template: false,
        template_framework_id: None,
        tags: vec![],
        content: "<p>Access is reviewed <script>x()</script>quarterly.</p>".into(),
        content_format: ContentFormat::Html,
        content_summary: None,
    };
    let detail = core.policies.create_policy(&manager, input.clone()).await?;
    let version = detail.current_version.expect("first version");
    assert_eq!(version.version_number, 1);
    assert!(!version.content.contains("<script"));

    let duplicate = core.policies.create_policy(&manager, input).await;
    assert_eq!(duplicate.unwrap_err().code(), "CONFLICT");

    let versions = stores.policies.list_versions(org, detail.policy.id).await?;
    assert_eq!(versions.len(), 1);
    Ok(())
}
