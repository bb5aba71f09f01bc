//! Evidence library: upload handshake, limits, version chains, links,
//! evaluations and freshness.

mod common;

use chrono::Duration;
use uuid::Uuid;

use common::*;
use grc_core::audit_log::AuditAction;
use grc_core::config::MAX_FILE_SIZE_BYTES;
use grc_core::evidence::types::*;
use grc_core::pagination::{PageRequest, LIST_LIMITS};
use grc_core::Role;

fn target(target_type: LinkTargetType, target_id: Uuid) -> LinkTarget {
    LinkTarget {
        target_type,
        target_id,
        strength: None,
        notes: None,
    }
}

// ── Create / confirm ─────────────────────────────────────────────

#[tokio::test]
async fn create_presigns_upload_under_chain_key() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;

    let created = h
        .core
        .evidence
        .create_artifact(&engineer, new_artifact("Access review"))
        .await
        .unwrap();

    let a = &created.artifact;
    assert_eq!(a.status, EvidenceStatus::Draft);
    assert_eq!(a.version, 1);
    assert!(a.is_current);
    assert_eq!(a.collection_date, h.clock_today());
    assert_eq!(a.object_key, format!("{}/{}/1/access-review.png", h.org, a.id));
    let upload = created.upload.expect("storage is configured");
    assert_eq!(upload.ttl_seconds, 900);
    assert!(upload.url.contains(&a.object_key));
    assert_eq!(h.log.actions(), vec![AuditAction::EvidenceCreated]);
}

#[tokio::test]
async fn file_size_limit_is_inclusive() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;

    let mut at_limit = new_artifact("Full disk image");
    at_limit.file_size = MAX_FILE_SIZE_BYTES;
    assert!(h.core.evidence.create_artifact(&engineer, at_limit).await.is_ok());

    let mut over = new_artifact("Too big");
    over.file_size = MAX_FILE_SIZE_BYTES + 1;
    assert_eq!(
        code(h.core.evidence.create_artifact(&engineer, over).await),
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn collection_date_cannot_be_in_the_future() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;

    let mut today = new_artifact("Today");
    today.collection_date = Some(h.clock_today());
    assert!(h.core.evidence.create_artifact(&engineer, today).await.is_ok());

    let mut tomorrow = new_artifact("Tomorrow");
    tomorrow.collection_date = Some(h.clock_today() + Duration::days(1));
    assert_eq!(
        code(h.core.evidence.create_artifact(&engineer, tomorrow).await),
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn freshness_period_bounds() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;

    for days in [1, 3650] {
        let mut input = new_artifact("In range");
        input.freshness_period_days = Some(days);
        assert!(
            h.core.evidence.create_artifact(&engineer, input).await.is_ok(),
            "{days} days should be accepted"
        );
    }
    for days in [0, 3651] {
        let mut input = new_artifact("Out of range");
        input.freshness_period_days = Some(days);
        assert_eq!(
            code(h.core.evidence.create_artifact(&engineer, input).await),
            "VALIDATION_ERROR",
            "{days} days should be rejected"
        );
    }
}

#[tokio::test]
async fn executables_are_rejected() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let mut input = new_artifact("Installer");
    input.file_name = "setup.exe".into();
    input.mime_type = "application/x-msdownload".into();
    assert_eq!(
        code(h.core.evidence.create_artifact(&engineer, input).await),
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn confirm_upload_checks_object_store() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let artifact = h.artifact(&engineer, "Firewall config").await;

    let missing = h
        .core
        .evidence
        .confirm_upload(&engineer, artifact.id, ConfirmUpload::default())
        .await;
    assert_eq!(code(missing), "UNPROCESSABLE");

    h.storage.put_object(&artifact.object_key, 10).await;
    let wrong_size = h
        .core
        .evidence
        .confirm_upload(&engineer, artifact.id, ConfirmUpload::default())
        .await;
    assert_eq!(code(wrong_size), "UNPROCESSABLE");

    h.storage
        .put_object(&artifact.object_key, artifact.file_size as u64)
        .await;
    let checksum = "AB".repeat(32);
    let confirmed = h
        .core
        .evidence
        .confirm_upload(
            &engineer,
            artifact.id,
            ConfirmUpload {
                checksum_sha256: Some(checksum.clone()),
            },
        )
        .await
        .unwrap();
    assert!(confirmed.upload_confirmed_at.is_some());
    assert_eq!(confirmed.checksum_sha256, Some(checksum.to_lowercase()));

    let again = h
        .core
        .evidence
        .confirm_upload(&engineer, artifact.id, ConfirmUpload::default())
        .await;
    assert_eq!(code(again), "CONFLICT");
}

#[tokio::test]
async fn missing_object_storage_is_service_unavailable() {
    let h = Harness::without_storage();
    let engineer = h.user(Role::SecurityEngineer).await;

    let created = h
        .core
        .evidence
        .create_artifact(&engineer, new_artifact("Offline"))
        .await
        .unwrap();
    assert!(created.upload.is_none());

    let confirm = h
        .core
        .evidence
        .confirm_upload(&engineer, created.artifact.id, ConfirmUpload::default())
        .await;
    assert_eq!(code(confirm), "SERVICE_UNAVAILABLE");
    assert_eq!(
        code(h.core.evidence.download_url(&engineer, created.artifact.id).await),
        "SERVICE_UNAVAILABLE"
    );
}

// ── Access ───────────────────────────────────────────────────────

#[tokio::test]
async fn roles_and_tenancy_gate_the_library() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let auditor = h.user(Role::Auditor).await;
    let viewer = h.user(Role::Viewer).await;
    let outsider = h.user_in(Uuid::new_v4(), Role::Ciso).await;
    let artifact = h.artifact(&engineer, "Backup report").await;

    assert_eq!(
        code(h.core.evidence.create_artifact(&viewer, new_artifact("x")).await),
        "FORBIDDEN"
    );
    assert_eq!(
        code(h.core.evidence.get_artifact(&auditor, artifact.id).await),
        "FORBIDDEN"
    );
    assert_eq!(
        code(h.core.evidence.get_artifact(&outsider, artifact.id).await),
        "NOT_FOUND"
    );
    let page = h
        .core
        .evidence
        .list_artifacts(
            &outsider,
            EvidenceFilter::default(),
            EvidenceSort::default(),
            PageRequest::first(LIST_LIMITS),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    // viewers read
    assert!(h.core.evidence.get_artifact(&viewer, artifact.id).await.is_ok());
}

#[tokio::test]
async fn review_statuses_need_review_roles() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let manager = h.user(Role::ComplianceManager).await;
    let artifact = h.pending_artifact(&engineer, "Pen test").await;

    assert_eq!(
        code(
            h.core
                .evidence
                .transition_status(&engineer, artifact.id, EvidenceStatus::Approved, None)
                .await
        ),
        "FORBIDDEN"
    );
    let approved = h
        .core
        .evidence
        .transition_status(&manager, artifact.id, EvidenceStatus::Approved, None)
        .await
        .unwrap();
    assert_eq!(approved.status, EvidenceStatus::Approved);

    let back_to_draft = h
        .core
        .evidence
        .transition_status(&engineer, artifact.id, EvidenceStatus::Draft, None)
        .await;
    assert_eq!(code(back_to_draft), "INVALID_STATUS_TRANSITION");
}

// ── Versions ─────────────────────────────────────────────────────

#[tokio::test]
async fn older_versions_are_read_only() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let v1 = h.artifact(&engineer, "Policy export").await;
    h.core
        .evidence
        .create_version(&engineer, v1.id, new_version("export-v2.pdf"))
        .await
        .unwrap();

    let edit = h
        .core
        .evidence
        .update_artifact(
            &engineer,
            v1.id,
            UpdateArtifact {
                title: Some("renamed".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(code(edit), "CONFLICT");
}

#[tokio::test]
async fn deleted_chain_is_revived_by_new_version() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let control = h.control("AC-1").await;
    let v1 = h.artifact(&engineer, "SSO config").await;
    h.core
        .evidence
        .link_targets(&engineer, v1.id, vec![target(LinkTargetType::Control, control)])
        .await
        .unwrap();

    h.core.evidence.delete_artifact(&engineer, v1.id).await.unwrap();
    let deleted = h.core.evidence.get_artifact(&engineer, v1.id).await.unwrap();
    assert!(!deleted.artifact.is_current);
    assert_eq!(deleted.artifact.status, EvidenceStatus::Superseded);

    let v2 = h
        .core
        .evidence
        .create_version(&engineer, v1.id, new_version("sso-v2.pdf"))
        .await
        .unwrap()
        .artifact;
    assert_eq!(v2.version, 2);
    assert!(v2.is_current);
    assert_eq!(v2.parent_artifact_id, Some(v1.id));
    let links = h.core.evidence.list_links(&engineer, v2.id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].control_id, Some(control));
}

#[tokio::test]
async fn only_uploader_or_reviewer_deletes() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let admin = h.user(Role::ItAdmin).await;
    let ciso = h.user(Role::Ciso).await;
    let artifact = h.artifact(&engineer, "Asset inventory").await;

    assert_eq!(
        code(h.core.evidence.delete_artifact(&admin, artifact.id).await),
        "FORBIDDEN"
    );
    h.core.evidence.delete_artifact(&ciso, artifact.id).await.unwrap();
}

// ── Links ────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_link_skips_duplicates_and_reports_missing_targets() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let control = h.control("CC6.1").await;
    let requirement = h.requirement("A.9.2.1").await;
    let artifact = h.artifact(&engineer, "MFA report").await;

    let outcome = h
        .core
        .evidence
        .link_targets(
            &engineer,
            artifact.id,
            vec![
                target(LinkTargetType::Control, control),
                target(LinkTargetType::Requirement, requirement),
                target(LinkTargetType::Control, control),
                target(LinkTargetType::Control, Uuid::new_v4()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 2);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].index, 2);
    assert_eq!(outcome.skipped[0].code, "CONFLICT");
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].code, "NOT_FOUND");

    let all_duplicates = h
        .core
        .evidence
        .link_targets(&engineer, artifact.id, vec![target(LinkTargetType::Control, control)])
        .await;
    assert_eq!(code(all_duplicates), "CONFLICT");

    let too_many = vec![target(LinkTargetType::Control, control); 51];
    assert_eq!(
        code(h.core.evidence.link_targets(&engineer, artifact.id, too_many).await),
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn unlink_removes_only_own_links() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let control = h.control("CC7.2").await;
    let a = h.artifact(&engineer, "SIEM alerts").await;
    let b = h.artifact(&engineer, "SIEM rules").await;
    let link = h
        .core
        .evidence
        .link_targets(&engineer, a.id, vec![target(LinkTargetType::Control, control)])
        .await
        .unwrap()
        .created
        .remove(0);

    assert_eq!(
        code(h.core.evidence.unlink(&engineer, b.id, link.id).await),
        "NOT_FOUND"
    );
    h.core.evidence.unlink(&engineer, a.id, link.id).await.unwrap();
    assert!(h.core.evidence.list_links(&engineer, a.id).await.unwrap().is_empty());
}

// ── Evaluations ──────────────────────────────────────────────────

#[tokio::test]
async fn evaluation_link_must_belong_to_artifact() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let control = h.control("CC8.1").await;
    let a = h.artifact(&engineer, "Change tickets").await;
    let b = h.artifact(&engineer, "Deploy log").await;
    let foreign = h
        .core
        .evidence
        .link_targets(&engineer, b.id, vec![target(LinkTargetType::Control, control)])
        .await
        .unwrap()
        .created
        .remove(0);

    let input = CreateEvaluation {
        evidence_link_id: Some(foreign.id),
        verdict: Verdict::Partial,
        confidence: Confidence::Medium,
        comments: None,
        missing_elements: vec![],
        remediation_notes: None,
    };
    assert_eq!(
        code(h.core.evidence.evaluate(&engineer, a.id, input).await),
        "VALIDATION_ERROR"
    );
}

#[tokio::test]
async fn evaluations_list_newest_first() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let artifact = h.artifact(&engineer, "Vuln scan").await;
    for verdict in [Verdict::Partial, Verdict::NeedsUpdate] {
        h.core
            .evidence
            .evaluate(
                &engineer,
                artifact.id,
                CreateEvaluation {
                    evidence_link_id: None,
                    verdict,
                    confidence: Confidence::Low,
                    comments: None,
                    missing_elements: vec!["owner sign-off".into()],
                    remediation_notes: None,
                },
            )
            .await
            .unwrap();
        h.clock.advance(Duration::minutes(1));
    }

    let page = h
        .core
        .evidence
        .list_evaluations(&engineer, artifact.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].verdict, Verdict::NeedsUpdate);
    // draft artifacts keep their status
    let detail = h.core.evidence.get_artifact(&engineer, artifact.id).await.unwrap();
    assert_eq!(detail.artifact.status, EvidenceStatus::Draft);
}

// ── Freshness ────────────────────────────────────────────────────

#[tokio::test]
async fn freshness_summary_and_filter() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;

    let mut no_expiry = new_artifact("Org chart");
    no_expiry.freshness_period_days = None;
    let mut soon = new_artifact("Cert");
    soon.freshness_period_days = Some(10);
    let mut stale = new_artifact("Old scan");
    stale.collection_date = Some(date(2026, 1, 1));
    stale.freshness_period_days = Some(30);
    for input in [no_expiry, new_artifact("Fresh"), soon, stale] {
        h.core.evidence.create_artifact(&engineer, input).await.unwrap();
    }

    let summary = h.core.evidence.freshness_summary(&engineer).await.unwrap();
    assert_eq!(
        summary,
        FreshnessSummary {
            fresh: 1,
            expiring_soon: 1,
            expired: 1,
            no_expiry: 1,
        }
    );

    let expired = h
        .core
        .evidence
        .list_artifacts(
            &engineer,
            EvidenceFilter {
                freshness: Some(FreshnessStatus::Expired),
                ..Default::default()
            },
            EvidenceSort::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(expired.total, 1);
    assert_eq!(expired.items[0].artifact.title, "Old scan");
    assert_eq!(expired.items[0].freshness_status, FreshnessStatus::Expired);

    // eleven days later the ten-day certificate has lapsed too
    h.clock.advance(Duration::days(11));
    let later = h.core.evidence.freshness_summary(&engineer).await.unwrap();
    assert_eq!(later.expired, 2);
}

#[tokio::test]
async fn search_matches_tags_and_source_system() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    h.artifact(&engineer, "Access review").await;
    let mut other = new_artifact("Laptop encryption");
    other.source_system = Some("jamf".into());
    other.tags = vec!["endpoint".into()];
    h.core.evidence.create_artifact(&engineer, other).await.unwrap();

    let by_source = h
        .core
        .evidence
        .search_artifacts(&engineer, "JAMF", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_source.total, 1);
    let by_tag = h
        .core
        .evidence
        .search_artifacts(&engineer, "q1", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(by_tag.total, 1);
    assert_eq!(by_tag.items[0].artifact.title, "Access review");
}
