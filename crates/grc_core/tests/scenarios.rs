//! End-to-end flows across the three domains, each driven from a fresh
//! in-memory harness.

mod common;

use chrono::Duration;

use common::*;
use grc_core::audit::types::*;
use grc_core::evidence::types::*;
use grc_core::pagination::PageRequest;
use grc_core::policy::types::*;
use grc_core::Role;

fn evaluation(verdict: Verdict) -> CreateEvaluation {
    CreateEvaluation {
        evidence_link_id: None,
        verdict,
        confidence: Confidence::High,
        comments: None,
        missing_elements: vec![],
        remediation_notes: None,
    }
}

#[tokio::test]
async fn evidence_version_chain_carries_links() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let control = h.control("AC-2").await;

    let a1 = h.artifact(&engineer, "User access review").await;
    assert_eq!(a1.version, 1);
    let linked = h
        .core
        .evidence
        .link_targets(
            &engineer,
            a1.id,
            vec![LinkTarget {
                target_type: LinkTargetType::Control,
                target_id: control,
                strength: Some(LinkStrength::Primary),
                notes: None,
            }],
        )
        .await
        .unwrap();
    assert_eq!(linked.created.len(), 1);

    let a2 = h
        .core
        .evidence
        .create_version(&engineer, a1.id, new_version("access-review-v2.pdf"))
        .await
        .unwrap()
        .artifact;
    assert_eq!(a2.version, 2);
    assert_eq!(a2.status, EvidenceStatus::Draft);
    assert!(a2.is_current);
    assert_eq!(a2.parent_artifact_id, Some(a1.id));

    let chain = h.core.evidence.list_versions(&engineer, a2.id).await.unwrap();
    let old = chain.iter().find(|a| a.id == a1.id).unwrap();
    assert_eq!(old.status, EvidenceStatus::Superseded);
    assert!(!old.is_current);
    assert_eq!(chain.iter().filter(|a| a.is_current).count(), 1);

    let links = h.core.evidence.list_links(&engineer, a2.id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].control_id, Some(control));
    assert_eq!(links[0].strength, LinkStrength::Primary);
}

#[tokio::test]
async fn policy_needs_every_signer_before_approval() {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let u1 = h.user(Role::Ciso).await;
    let u2 = h.user(Role::SecurityEngineer).await;
    let u3 = h.user(Role::ItAdmin).await;
    let id = h.policy(&manager, "ISP-001").await.policy.id;

    let signoffs = h
        .core
        .policies
        .submit_for_review(
            &manager,
            id,
            SubmitForReview {
                signers: vec![u1.user_id, u2.user_id, u3.user_id],
                due_date: Some(h.clock_today() + Duration::days(14)),
                message: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(signoffs.len(), 3);

    for (signer, expected) in [
        (&u1, PolicyStatus::InReview),
        (&u2, PolicyStatus::InReview),
        (&u3, PolicyStatus::Approved),
    ] {
        let mine = h.core.policies.my_pending_signoffs(signer).await.unwrap();
        assert_eq!(mine.len(), 1);
        h.core
            .policies
            .approve_signoff(signer, id, mine[0].id, None)
            .await
            .unwrap();
        let policy = h.core.policies.get_policy(&manager, id).await.unwrap().policy;
        assert_eq!(policy.status, expected);
    }
    let approved = h.core.policies.get_policy(&manager, id).await.unwrap().policy;
    assert_eq!(approved.approved_version, Some(1));

    let published = h.core.policies.publish(&manager, id).await.unwrap();
    assert_eq!(published.status, PolicyStatus::Published);
    assert_eq!(published.published_at, Some(start()));
    assert_eq!(published.next_review_at, Some(date(2027, 3, 2)));
    assert_eq!(published.last_reviewed_at, Some(h.clock_today()));
}

#[tokio::test]
async fn request_submission_needs_evidence_and_rejection_needs_notes() {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let engineer = h.user(Role::SecurityEngineer).await;
    let auditor = h.user(Role::Auditor).await;
    let audit = h.audit(&manager, vec![auditor.user_id]).await;
    let request = h
        .core
        .audits
        .create_request(&auditor, audit.id, new_request("Quarterly access review"))
        .await
        .unwrap();
    assert_eq!(request.status, AuditRequestStatus::Open);

    let empty = h
        .core
        .audits
        .transition_request(&engineer, audit.id, request.id, AuditRequestStatus::Submitted)
        .await;
    assert_eq!(code(empty), "AUDIT_NO_EVIDENCE");

    let artifact = h.artifact(&engineer, "Q1 access review").await;
    h.core
        .audits
        .submit_evidence(
            &engineer,
            audit.id,
            request.id,
            SubmitEvidence {
                artifact_id: artifact.id,
                notes: Some("exported from okta".into()),
            },
        )
        .await
        .unwrap();
    let submitted = h
        .core
        .audits
        .transition_request(&engineer, audit.id, request.id, AuditRequestStatus::Submitted)
        .await
        .unwrap();
    assert_eq!(submitted.status, AuditRequestStatus::Submitted);
    assert!(submitted.submitted_at.is_some());

    let bare = h
        .core
        .audits
        .review_request(
            &auditor,
            audit.id,
            request.id,
            ReviewRequest {
                decision: ReviewDecision::Rejected,
                notes: None,
            },
        )
        .await;
    assert_eq!(code(bare), "AUDIT_REJECTION_REQUIRES_NOTES");

    let rejected = h
        .core
        .audits
        .review_request(
            &auditor,
            audit.id,
            request.id,
            ReviewRequest {
                decision: ReviewDecision::Rejected,
                notes: Some("export is missing terminated users".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, AuditRequestStatus::Rejected);
    assert_eq!(
        rejected.reviewer_notes.as_deref(),
        Some("export is missing terminated users")
    );
}

#[tokio::test]
async fn risk_acceptance_is_reserved_to_the_ciso() {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let ciso = h.user(Role::Ciso).await;
    let audit = h.audit(&manager, vec![]).await;
    let finding = h
        .core
        .audits
        .create_finding(&manager, audit.id, new_finding("Legacy VPN"))
        .await
        .unwrap();
    let before = h.core.audits.get_audit(&manager, audit.id).await.unwrap();
    assert_eq!(before.open_findings, 1);

    let by_manager = h
        .core
        .audits
        .transition_finding(
            &manager,
            audit.id,
            finding.id,
            FindingTransition::to(FindingStatus::RiskAccepted),
        )
        .await;
    assert_eq!(code(by_manager), "FORBIDDEN");

    let no_reason = h
        .core
        .audits
        .transition_finding(
            &ciso,
            audit.id,
            finding.id,
            FindingTransition::to(FindingStatus::RiskAccepted),
        )
        .await;
    assert_eq!(code(no_reason), "AUDIT_RISK_ACCEPT_REQUIRES_REASON");

    let mut accept = FindingTransition::to(FindingStatus::RiskAccepted);
    accept.reason = Some("decommissioned next quarter".into());
    let accepted = h
        .core
        .audits
        .transition_finding(&ciso, audit.id, finding.id, accept)
        .await
        .unwrap();
    assert_eq!(accepted.status, FindingStatus::RiskAccepted);
    assert!(accepted.risk_accepted);
    assert_eq!(accepted.risk_accepted_by, Some(ciso.user_id));

    let after = h.core.audits.get_audit(&manager, audit.id).await.unwrap();
    assert_eq!(after.open_findings, before.open_findings - 1);
    assert_eq!(after.total_findings, 1);
}

#[tokio::test]
async fn auditors_only_see_assigned_audits() {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let auditor = h.user(Role::Auditor).await;
    let a1 = h.audit(&manager, vec![auditor.user_id]).await;
    let a2 = h.audit(&manager, vec![]).await;

    let hidden = h.core.audits.get_audit(&auditor, a2.id).await;
    let err = hidden.expect_err("unassigned audit");
    assert_eq!(err.code(), "AUDIT_NOT_FOUND");
    assert_eq!(err.http_status(), 404);

    let listed = h
        .core
        .audits
        .list_audits(
            &auditor,
            AuditFilter::default(),
            AuditSort::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, a1.id);

    let everything = h
        .core
        .audits
        .list_audits(
            &manager,
            AuditFilter::default(),
            AuditSort::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(everything.total, 2);
}

#[tokio::test]
async fn evaluations_settle_pending_artifacts_only() {
    let h = Harness::new();
    let engineer = h.user(Role::SecurityEngineer).await;
    let manager = h.user(Role::ComplianceManager).await;

    let e = h.pending_artifact(&engineer, "MFA enforcement").await;
    let outcome = h
        .core
        .evidence
        .evaluate(&engineer, e.id, evaluation(Verdict::Sufficient))
        .await
        .unwrap();
    assert_eq!(outcome.status_changed_to, Some(EvidenceStatus::Approved));
    let e = h.core.evidence.get_artifact(&engineer, e.id).await.unwrap();
    assert_eq!(e.artifact.status, EvidenceStatus::Approved);

    let f = h.pending_artifact(&engineer, "Backup logs").await;
    let outcome = h
        .core
        .evidence
        .evaluate(&engineer, f.id, evaluation(Verdict::Insufficient))
        .await
        .unwrap();
    assert_eq!(outcome.status_changed_to, Some(EvidenceStatus::Rejected));

    let g = h.pending_artifact(&engineer, "Firewall config").await;
    h.core
        .evidence
        .transition_status(&manager, g.id, EvidenceStatus::Approved, None)
        .await
        .unwrap();
    for verdict in [Verdict::Insufficient, Verdict::NeedsUpdate, Verdict::Sufficient] {
        let outcome = h
            .core
            .evidence
            .evaluate(&engineer, g.id, evaluation(verdict))
            .await
            .unwrap();
        assert_eq!(outcome.status_changed_to, None);
    }
    let g = h.core.evidence.get_artifact(&engineer, g.id).await.unwrap();
    assert_eq!(g.artifact.status, EvidenceStatus::Approved);
}
