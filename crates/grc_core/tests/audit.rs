//! Audit engine: engagement lifecycle, PBC requests, evidence submissions,
//! findings, threaded comments and counter upkeep.

mod common;

use uuid::Uuid;

use common::*;
use grc_core::audit_log::AuditAction;
use grc_core::audit::types::*;
use grc_core::pagination::PageRequest;
use grc_core::ports::AuditStore;
use grc_core::{Principal, Role};

struct Team {
    h: Harness,
    manager: Principal,
    engineer: Principal,
    auditor: Principal,
    audit: Audit,
}

async fn team() -> Team {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let engineer = h.user(Role::SecurityEngineer).await;
    let auditor = h.user(Role::Auditor).await;
    let audit = h.audit(&manager, vec![auditor.user_id]).await;
    Team {
        h,
        manager,
        engineer,
        auditor,
        audit,
    }
}

fn review(decision: ReviewDecision, notes: Option<&str>) -> ReviewRequest {
    ReviewRequest {
        decision,
        notes: notes.map(str::to_string),
    }
}

fn evidence(artifact_id: Uuid) -> SubmitEvidence {
    SubmitEvidence {
        artifact_id,
        notes: None,
    }
}

// ── Engagements ──────────────────────────────────────────────────

#[tokio::test]
async fn create_audit_checks_roles_and_auditors() {
    let h = Harness::new();
    let manager = h.user(Role::ComplianceManager).await;
    let engineer = h.user(Role::SecurityEngineer).await;
    let auditor = h.user(Role::Auditor).await;

    let denied = h
        .core
        .audits
        .create_audit(&engineer, new_audit("SOC 2", vec![]))
        .await;
    assert_eq!(code(denied), "FORBIDDEN");

    let not_auditor = h
        .core
        .audits
        .create_audit(&manager, new_audit("SOC 2", vec![engineer.user_id]))
        .await;
    assert_eq!(code(not_auditor), "VALIDATION_ERROR");

    let mut backwards = new_audit("SOC 2", vec![]);
    backwards.period_start = Some(date(2025, 12, 31));
    backwards.period_end = Some(date(2025, 1, 1));
    let result = h.core.audits.create_audit(&manager, backwards).await;
    assert_eq!(code(result), "VALIDATION_ERROR");

    let created = h
        .core
        .audits
        .create_audit(
            &manager,
            new_audit("SOC 2", vec![auditor.user_id, auditor.user_id]),
        )
        .await
        .unwrap();
    assert_eq!(created.status, AuditStatus::Planning);
    let audit = h.core.audits.get_audit(&manager, created.id).await.unwrap();
    assert_eq!(audit.auditor_ids, vec![auditor.user_id]);
    assert_eq!(audit.total_requests, 0);
}

#[tokio::test]
async fn lifecycle_follows_registry_and_freezes_when_terminal() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let id = t.audit.id;

    let skip = audits.transition_audit(&t.manager, id, AuditStatus::Reporting).await;
    assert_eq!(code(skip), "AUDIT_INVALID_TRANSITION");

    for to in [
        AuditStatus::Fieldwork,
        AuditStatus::Reporting,
        AuditStatus::Remediation,
        AuditStatus::Completed,
    ] {
        audits.transition_audit(&t.manager, id, to).await.unwrap();
    }
    let done = audits.get_audit(&t.manager, id).await.unwrap();
    assert!(done.actual_start.is_some());
    assert!(done.actual_end.is_some());

    let request = audits.create_request(&t.manager, id, new_request("Access list")).await;
    assert_eq!(code(request), "AUDIT_COMPLETED");
    let cancel = audits.transition_audit(&t.manager, id, AuditStatus::Cancelled).await;
    assert_eq!(code(cancel), "AUDIT_COMPLETED");

    let other = t.h.audit(&t.manager, vec![]).await;
    audits
        .transition_audit(&t.manager, other.id, AuditStatus::Cancelled)
        .await
        .unwrap();
    let finding = audits.create_finding(&t.manager, other.id, new_finding("Gap")).await;
    assert_eq!(code(finding), "AUDIT_CANCELLED");

    // discussion stays open on closed engagements
    assert!(audits
        .create_comment(&t.manager, id, comment("wrap-up notes"))
        .await
        .is_ok());
}

#[tokio::test]
async fn auditor_assignment_controls_visibility() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let second = t.h.user(Role::Auditor).await;

    let not_auditor = audits
        .add_auditor(&t.manager, t.audit.id, t.engineer.user_id)
        .await;
    assert_eq!(code(not_auditor), "VALIDATION_ERROR");

    assert_eq!(code(audits.get_audit(&second, t.audit.id).await), "AUDIT_NOT_FOUND");
    audits
        .add_auditor(&t.manager, t.audit.id, second.user_id)
        .await
        .unwrap();
    assert!(audits.get_audit(&second, t.audit.id).await.is_ok());

    audits
        .remove_auditor(&t.manager, t.audit.id, t.auditor.user_id)
        .await
        .unwrap();
    assert_eq!(code(audits.get_audit(&t.auditor, t.audit.id).await), "AUDIT_NOT_FOUND");
    let again = audits
        .remove_auditor(&t.manager, t.audit.id, t.auditor.user_id)
        .await;
    assert_eq!(code(again), "NOT_FOUND");
}

// ── Requests ─────────────────────────────────────────────────────

#[tokio::test]
async fn assigned_requests_start_in_progress() {
    let t = team().await;
    let audits = &t.h.core.audits;

    let open = audits
        .create_request(&t.auditor, t.audit.id, new_request("Org chart"))
        .await
        .unwrap();
    assert_eq!(open.status, AuditRequestStatus::Open);
    assert_eq!(open.priority, Priority::Medium);

    let mut assigned = new_request("Firewall rules");
    assigned.assigned_to = Some(t.engineer.user_id);
    let assigned = audits.create_request(&t.auditor, t.audit.id, assigned).await.unwrap();
    assert_eq!(assigned.status, AuditRequestStatus::InProgress);

    let denied = audits
        .create_request(&t.engineer, t.audit.id, new_request("Mine"))
        .await;
    assert_eq!(code(denied), "FORBIDDEN");

    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!((audit.total_requests, audit.open_requests), (2, 2));
}

#[tokio::test]
async fn bulk_requests_are_capped_at_one_hundred() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let batch = |n: usize| -> Vec<CreateRequest> {
        (0..n).map(|i| new_request(&format!("Item {i}"))).collect()
    };

    let too_many = audits.create_requests(&t.manager, t.audit.id, batch(101)).await;
    assert_eq!(code(too_many), "VALIDATION_ERROR");
    let empty = audits.create_requests(&t.manager, t.audit.id, vec![]).await;
    assert_eq!(code(empty), "VALIDATION_ERROR");

    let outcome = audits
        .create_requests(&t.manager, t.audit.id, batch(100))
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 100);
    assert!(outcome.errors.is_empty());

    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!(audit.total_requests, 100);
}

#[tokio::test]
async fn bulk_requests_report_bad_rows() {
    let t = team().await;
    let mut bad = new_request("Unknown control");
    bad.control_id = Some(Uuid::new_v4());
    let outcome = t
        .h
        .core
        .audits
        .create_requests(
            &t.manager,
            t.audit.id,
            vec![new_request("Good"), bad, new_request("  ")],
        )
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 1);
    let codes: Vec<(usize, &str)> = outcome
        .errors
        .iter()
        .map(|e| (e.index, e.code.as_str()))
        .collect();
    assert_eq!(codes, vec![(1, "NOT_FOUND"), (2, "VALIDATION_ERROR")]);
}

#[tokio::test]
async fn templates_are_numbered_after_existing_references() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let users = t.h.template("User access listing").await;
    let backups = t.h.template("Backup restore test").await;

    let mut manual = new_request("Manual item");
    manual.reference_number = Some("PBC-007".into());
    audits.create_request(&t.manager, t.audit.id, manual).await.unwrap();

    let created = audits
        .instantiate_templates(
            &t.manager,
            t.audit.id,
            InstantiateTemplates {
                template_ids: vec![users, backups],
                prefix: None,
                due_date: None,
                assigned_to: None,
            },
        )
        .await
        .unwrap();
    let refs: Vec<_> = created
        .iter()
        .map(|r| r.reference_number.clone().unwrap())
        .collect();
    assert_eq!(refs, vec!["PBC-008", "PBC-009"]);
    assert_eq!(created[0].title, "User access listing");
    assert_eq!(created[0].priority, Priority::High);

    let soc = audits
        .instantiate_templates(
            &t.manager,
            t.audit.id,
            InstantiateTemplates {
                template_ids: vec![users],
                prefix: Some("SOC".into()),
                due_date: None,
                assigned_to: Some(t.engineer.user_id),
            },
        )
        .await
        .unwrap();
    assert_eq!(soc[0].reference_number.as_deref(), Some("SOC-001"));
    assert_eq!(soc[0].status, AuditRequestStatus::InProgress);

    let missing = audits
        .instantiate_templates(
            &t.manager,
            t.audit.id,
            InstantiateTemplates {
                template_ids: vec![users, Uuid::new_v4()],
                prefix: None,
                due_date: None,
                assigned_to: None,
            },
        )
        .await;
    assert_eq!(code(missing), "NOT_FOUND");
    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!(audit.total_requests, 4);
}

#[tokio::test]
async fn template_instantiation_writes_nothing_when_any_template_is_invalid() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let good = t.h.template("User access listing").await;
    let bad = Uuid::new_v4();
    t.h.store
        .add_template(AuditRequestTemplate {
            id: bad,
            org_id: t.h.org,
            title: "Firewall rule review".into(),
            description: None,
            priority: Priority::Medium,
            category: None,
            control_id: Some(Uuid::new_v4()),
            requirement_id: None,
            framework_id: None,
            tags: vec![],
            created_at: start(),
            updated_at: start(),
        })
        .await;

    let result = audits
        .instantiate_templates(
            &t.manager,
            t.audit.id,
            InstantiateTemplates {
                template_ids: vec![good, bad],
                prefix: None,
                due_date: None,
                assigned_to: None,
            },
        )
        .await;
    assert_eq!(code(result), "NOT_FOUND");

    let rows = audits
        .list_requests(&t.manager, t.audit.id, RequestFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(rows.total, 0);
    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!((audit.total_requests, audit.open_requests), (0, 0));

    // The same call without the bad template numbers from 001.
    let created = audits
        .instantiate_templates(
            &t.manager,
            t.audit.id,
            InstantiateTemplates {
                template_ids: vec![good],
                prefix: None,
                due_date: None,
                assigned_to: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(created[0].reference_number.as_deref(), Some("PBC-001"));
    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!((audit.total_requests, audit.open_requests), (1, 1));
}

#[tokio::test]
async fn review_decisions_drive_request_status() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let request = audits
        .create_request(&t.auditor, t.audit.id, new_request("Access review"))
        .await
        .unwrap();
    let artifact = t.h.artifact(&t.engineer, "Q1 access review").await;

    let direct = audits
        .transition_request(&t.auditor, t.audit.id, request.id, AuditRequestStatus::Accepted)
        .await;
    assert_eq!(code(direct), "VALIDATION_ERROR");

    audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(artifact.id))
        .await
        .unwrap();
    audits
        .transition_request(&t.engineer, t.audit.id, request.id, AuditRequestStatus::Submitted)
        .await
        .unwrap();

    let bare = audits
        .review_request(&t.auditor, t.audit.id, request.id, review(ReviewDecision::Rejected, Some(" ")))
        .await;
    assert_eq!(code(bare), "AUDIT_REJECTION_REQUIRES_NOTES");
    let rejected = audits
        .review_request(
            &t.auditor,
            t.audit.id,
            request.id,
            review(ReviewDecision::Rejected, Some("covers Q4 instead of Q1")),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, AuditRequestStatus::Rejected);
    assert_eq!(rejected.reviewed_by, Some(t.auditor.user_id));

    audits
        .transition_request(&t.engineer, t.audit.id, request.id, AuditRequestStatus::InProgress)
        .await
        .unwrap();
    audits
        .transition_request(&t.engineer, t.audit.id, request.id, AuditRequestStatus::Submitted)
        .await
        .unwrap();
    let accepted = audits
        .review_request(&t.auditor, t.audit.id, request.id, review(ReviewDecision::Accepted, None))
        .await
        .unwrap();
    assert_eq!(accepted.status, AuditRequestStatus::Accepted);

    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!((audit.total_requests, audit.open_requests), (1, 0));

    let closed = audits
        .transition_request(&t.auditor, t.audit.id, request.id, AuditRequestStatus::Closed)
        .await
        .unwrap();
    assert_eq!(closed.status, AuditRequestStatus::Closed);
    let reopen = audits
        .transition_request(&t.engineer, t.audit.id, request.id, AuditRequestStatus::InProgress)
        .await;
    assert_eq!(code(reopen), "AUDIT_INVALID_TRANSITION");
}

// ── Submissions ──────────────────────────────────────────────────

#[tokio::test]
async fn submissions_reject_duplicates_and_closed_requests() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let request = audits
        .create_request(&t.auditor, t.audit.id, new_request("Access review"))
        .await
        .unwrap();
    let artifact = t.h.artifact(&t.engineer, "Q1 access review").await;

    let by_auditor = audits
        .submit_evidence(&t.auditor, t.audit.id, request.id, evidence(artifact.id))
        .await;
    assert_eq!(code(by_auditor), "FORBIDDEN");

    let missing = audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(Uuid::new_v4()))
        .await;
    assert_eq!(code(missing), "NOT_FOUND");

    let link = audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(artifact.id))
        .await
        .unwrap();
    assert_eq!(link.status, SubmissionStatus::PendingReview);
    let request_now = audits.get_request(&t.engineer, t.audit.id, request.id).await.unwrap();
    assert_eq!(request_now.status, AuditRequestStatus::InProgress);

    let dup = audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(artifact.id))
        .await;
    assert_eq!(code(dup), "AUDIT_DUPLICATE_EVIDENCE");

    audits
        .transition_request(&t.engineer, t.audit.id, request.id, AuditRequestStatus::Submitted)
        .await
        .unwrap();
    audits
        .review_request(&t.auditor, t.audit.id, request.id, review(ReviewDecision::Accepted, None))
        .await
        .unwrap();
    let late = t.h.artifact(&t.engineer, "late export").await;
    let closed = audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(late.id))
        .await;
    assert_eq!(code(closed), "CONFLICT");
}

#[tokio::test]
async fn submission_review_and_removal() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let devops = t.h.user(Role::DevopsEngineer).await;
    let request = audits
        .create_request(&t.auditor, t.audit.id, new_request("Access review"))
        .await
        .unwrap();
    let artifact = t.h.artifact(&t.engineer, "Q1 access review").await;
    let link = audits
        .submit_evidence(&t.engineer, t.audit.id, request.id, evidence(artifact.id))
        .await
        .unwrap();

    let pending = ReviewSubmission {
        status: SubmissionStatus::PendingReview,
        notes: None,
    };
    let result = audits.review_submission(&t.auditor, t.audit.id, link.id, pending).await;
    assert_eq!(code(result), "VALIDATION_ERROR");

    let unclear = ReviewSubmission {
        status: SubmissionStatus::NeedsClarification,
        notes: None,
    };
    let result = audits.review_submission(&t.auditor, t.audit.id, link.id, unclear).await;
    assert_eq!(code(result), "AUDIT_REJECTION_REQUIRES_NOTES");

    let accepted = audits
        .review_submission(
            &t.auditor,
            t.audit.id,
            link.id,
            ReviewSubmission {
                status: SubmissionStatus::Accepted,
                notes: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(accepted.status, SubmissionStatus::Accepted);
    assert_eq!(accepted.reviewed_by, Some(t.auditor.user_id));

    let denied = audits.remove_submission(&devops, t.audit.id, link.id).await;
    assert_eq!(code(denied), "FORBIDDEN");
    audits
        .remove_submission(&t.engineer, t.audit.id, link.id)
        .await
        .unwrap();
    assert!(audits
        .list_submissions(&t.engineer, t.audit.id, request.id)
        .await
        .unwrap()
        .is_empty());
    assert!(t.h.log.actions().contains(&AuditAction::SubmissionRemoved));
}

// ── Findings ─────────────────────────────────────────────────────

#[tokio::test]
async fn finding_remediation_lifecycle() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let finding = audits
        .create_finding(&t.auditor, t.audit.id, new_finding("Stale accounts"))
        .await
        .unwrap();
    assert_eq!(finding.status, FindingStatus::Identified);
    let step = |to| FindingTransition::to(to);

    let skip = audits
        .transition_finding(&t.auditor, t.audit.id, finding.id, step(FindingStatus::Verified))
        .await;
    assert_eq!(code(skip), "AUDIT_INVALID_TRANSITION");

    let no_plan = audits
        .transition_finding(
            &t.engineer,
            t.audit.id,
            finding.id,
            step(FindingStatus::RemediationPlanned),
        )
        .await;
    assert_eq!(code(no_plan), "VALIDATION_ERROR");

    let mut planned = step(FindingStatus::RemediationPlanned);
    planned.remediation_plan = Some("quarterly deprovisioning sweep".into());
    planned.remediation_due_date = Some(date(2026, 6, 30));
    let f = audits
        .transition_finding(&t.engineer, t.audit.id, finding.id, planned)
        .await
        .unwrap();
    assert_eq!(f.remediation_due_date, Some(date(2026, 6, 30)));

    let f = audits
        .transition_finding(
            &t.engineer,
            t.audit.id,
            finding.id,
            step(FindingStatus::RemediationInProgress),
        )
        .await
        .unwrap();
    assert!(f.remediation_started_at.is_some());
    let f = audits
        .transition_finding(
            &t.engineer,
            t.audit.id,
            finding.id,
            step(FindingStatus::RemediationComplete),
        )
        .await
        .unwrap();
    assert!(f.remediation_completed_at.is_some());

    let reopen_bare = audits
        .transition_finding(
            &t.engineer,
            t.audit.id,
            finding.id,
            step(FindingStatus::RemediationInProgress),
        )
        .await;
    assert_eq!(code(reopen_bare), "VALIDATION_ERROR");
    let mut reopen = step(FindingStatus::RemediationInProgress);
    reopen.notes = Some("two accounts missed".into());
    let f = audits
        .transition_finding(&t.engineer, t.audit.id, finding.id, reopen)
        .await
        .unwrap();
    assert!(f.remediation_completed_at.is_none());
    audits
        .transition_finding(
            &t.engineer,
            t.audit.id,
            finding.id,
            step(FindingStatus::RemediationComplete),
        )
        .await
        .unwrap();

    let self_verify = audits
        .transition_finding(&t.engineer, t.audit.id, finding.id, step(FindingStatus::Verified))
        .await;
    assert_eq!(code(self_verify), "FORBIDDEN");
    let f = audits
        .transition_finding(&t.auditor, t.audit.id, finding.id, step(FindingStatus::Verified))
        .await
        .unwrap();
    assert_eq!(f.verified_by, Some(t.auditor.user_id));

    audits
        .transition_finding(&t.auditor, t.audit.id, finding.id, step(FindingStatus::Closed))
        .await
        .unwrap();
    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!((audit.total_findings, audit.open_findings), (1, 0));
}

#[tokio::test]
async fn remediation_owner_may_act_without_contributor_role() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let viewer = t.h.user(Role::Viewer).await;
    let mut input = new_finding("Unpatched hosts");
    input.remediation_owner_id = Some(viewer.user_id);
    let finding = audits.create_finding(&t.auditor, t.audit.id, input).await.unwrap();

    let mut planned = FindingTransition::to(FindingStatus::RemediationPlanned);
    planned.remediation_plan = Some("patch window".into());
    let f = audits
        .transition_finding(&viewer, t.audit.id, finding.id, planned)
        .await
        .unwrap();
    assert_eq!(f.status, FindingStatus::RemediationPlanned);
}

#[tokio::test]
async fn finding_references_must_exist() {
    let t = team().await;
    let mut input = new_finding("Missing control");
    input.control_id = Some(Uuid::new_v4());
    let result = t.h.core.audits.create_finding(&t.auditor, t.audit.id, input).await;
    assert_eq!(code(result), "NOT_FOUND");

    let other = t
        .h
        .core
        .audits
        .get_finding(&t.manager, t.audit.id, Uuid::new_v4())
        .await;
    assert_eq!(code(other), "AUDIT_FINDING_NOT_FOUND");
}

// ── Comments ─────────────────────────────────────────────────────

#[tokio::test]
async fn internal_comments_are_hidden_from_auditors() {
    let t = team().await;
    let audits = &t.h.core.audits;

    let mut internal = comment("auditor seems to want Q4 data");
    internal.is_internal = true;
    let internal = audits.create_comment(&t.manager, t.audit.id, internal).await.unwrap();
    audits
        .create_comment(&t.auditor, t.audit.id, comment("kickoff scheduled"))
        .await
        .unwrap();

    let mut attempt = comment("private");
    attempt.is_internal = true;
    let denied = audits.create_comment(&t.auditor, t.audit.id, attempt).await;
    assert_eq!(code(denied), "AUDIT_INTERNAL_COMMENT_DENIED");

    let seen = audits
        .list_comments(&t.auditor, t.audit.id, CommentFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(seen.total, 1);
    assert!(seen.items.iter().all(|c| !c.is_internal));
    let all = audits
        .list_comments(&t.manager, t.audit.id, CommentFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let mut reply = comment("replying to something I cannot see");
    reply.parent_comment_id = Some(internal.id);
    let hidden = audits.create_comment(&t.auditor, t.audit.id, reply).await;
    assert_eq!(code(hidden), "AUDIT_COMMENT_NOT_FOUND");
}

#[tokio::test]
async fn replies_are_one_level_and_inherit_target() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let request = audits
        .create_request(&t.auditor, t.audit.id, new_request("Access review"))
        .await
        .unwrap();

    let mut on_request = comment("which quarter?");
    on_request.target_type = Some(CommentTarget::Request);
    on_request.target_id = Some(request.id);
    let parent = audits.create_comment(&t.auditor, t.audit.id, on_request).await.unwrap();

    let mut internal_parent = comment("team only");
    internal_parent.is_internal = true;
    let internal_parent = audits
        .create_comment(&t.engineer, t.audit.id, internal_parent)
        .await
        .unwrap();
    let mut reply = comment("agreed");
    reply.parent_comment_id = Some(internal_parent.id);
    let reply = audits.create_comment(&t.manager, t.audit.id, reply).await.unwrap();
    assert!(reply.is_internal);

    let mut answer = comment("Q1");
    answer.parent_comment_id = Some(parent.id);
    let answer = audits.create_comment(&t.engineer, t.audit.id, answer).await.unwrap();
    assert_eq!(answer.target_type, CommentTarget::Request);
    assert_eq!(answer.target_id, request.id);

    let mut nested = comment("too deep");
    nested.parent_comment_id = Some(answer.id);
    let result = audits.create_comment(&t.engineer, t.audit.id, nested).await;
    assert_eq!(code(result), "VALIDATION_ERROR");

    let mut mismatched = comment("wrong target");
    mismatched.parent_comment_id = Some(parent.id);
    mismatched.target_type = Some(CommentTarget::Audit);
    let result = audits.create_comment(&t.engineer, t.audit.id, mismatched).await;
    assert_eq!(code(result), "VALIDATION_ERROR");

    let mut orphan = comment("no such request");
    orphan.target_type = Some(CommentTarget::Request);
    orphan.target_id = Some(Uuid::new_v4());
    let result = audits.create_comment(&t.engineer, t.audit.id, orphan).await;
    assert_eq!(code(result), "AUDIT_REQUEST_NOT_FOUND");

    let on_thread = audits
        .list_comments(
            &t.manager,
            t.audit.id,
            CommentFilter {
                target_type: Some(CommentTarget::Request),
                target_id: Some(request.id),
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        on_thread.items.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![parent.id, answer.id]
    );
}

#[tokio::test]
async fn comment_pages_are_clamped_to_endpoint_limits() {
    let t = team().await;
    let audits = &t.h.core.audits;
    for body in ["one", "two", "three"] {
        audits
            .create_comment(&t.manager, t.audit.id, comment(body))
            .await
            .unwrap();
    }

    let oversized = audits
        .list_comments(
            &t.manager,
            t.audit.id,
            CommentFilter::default(),
            PageRequest {
                page: 1,
                per_page: 10_000,
            },
        )
        .await
        .unwrap();
    assert_eq!(oversized.per_page, 200);
    assert_eq!(oversized.items.len(), 3);

    let zero = audits
        .list_comments(
            &t.manager,
            t.audit.id,
            CommentFilter::default(),
            PageRequest { page: 0, per_page: 0 },
        )
        .await
        .unwrap();
    assert_eq!((zero.page, zero.per_page), (1, 1));
    assert_eq!(zero.items.len(), 1);
    assert_eq!(zero.total_pages, 3);
}

#[tokio::test]
async fn comment_edit_and_delete_permissions() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let viewer = t.h.user(Role::Viewer).await;

    let denied = audits.create_comment(&viewer, t.audit.id, comment("hello")).await;
    assert_eq!(code(denied), "FORBIDDEN");

    let parent = audits
        .create_comment(&t.engineer, t.audit.id, comment("first draft"))
        .await
        .unwrap();
    let mut reply = comment("reply");
    reply.parent_comment_id = Some(parent.id);
    audits.create_comment(&t.auditor, t.audit.id, reply).await.unwrap();

    let not_author = audits
        .edit_comment(&t.manager, t.audit.id, parent.id, "rewritten")
        .await;
    assert_eq!(code(not_author), "FORBIDDEN");
    let edited = audits
        .edit_comment(&t.engineer, t.audit.id, parent.id, " final ")
        .await
        .unwrap();
    assert_eq!(edited.body, "final");

    let by_auditor = audits.delete_comment(&t.auditor, t.audit.id, parent.id).await;
    assert_eq!(code(by_auditor), "FORBIDDEN");
    audits
        .delete_comment(&t.manager, t.audit.id, parent.id)
        .await
        .unwrap();
    let left = audits
        .list_comments(&t.manager, t.audit.id, CommentFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(left.total, 0);
}

// ── Counters, dashboard and the log sink ─────────────────────────

#[tokio::test]
async fn reconciler_repairs_drifted_counters() {
    let t = team().await;
    let audits = &t.h.core.audits;
    audits
        .create_request(&t.manager, t.audit.id, new_request("One"))
        .await
        .unwrap();
    audits
        .create_finding(&t.manager, t.audit.id, new_finding("Gap"))
        .await
        .unwrap();

    t.h.store
        .set_request_counters(t.h.org, t.audit.id, 40, 40, start())
        .await
        .unwrap();
    let counters = t.h.core.counters.reconcile_all(t.h.org, t.audit.id).await.unwrap();
    assert_eq!(
        counters,
        AuditCounters {
            total_requests: 1,
            open_requests: 1,
            total_findings: 1,
            open_findings: 1,
        }
    );
    let audit = audits.get_audit(&t.manager, t.audit.id).await.unwrap();
    assert_eq!(audit.total_requests, 1);

    t.h.audit(&t.manager, vec![]).await;
    assert_eq!(t.h.core.counters.reconcile_org(t.h.org).await.unwrap(), 2);

    let missing = t.h.core.counters.reconcile_all(t.h.org, Uuid::new_v4()).await;
    assert_eq!(code(missing), "AUDIT_NOT_FOUND");
}

#[tokio::test]
async fn dashboard_is_scoped_for_auditors() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let unassigned = t.h.audit(&t.manager, vec![]).await;
    audits
        .create_request(&t.manager, t.audit.id, new_request("One"))
        .await
        .unwrap();
    audits
        .create_finding(&t.manager, unassigned.id, new_finding("Gap"))
        .await
        .unwrap();
    audits
        .transition_audit(&t.manager, unassigned.id, AuditStatus::Fieldwork)
        .await
        .unwrap();

    let full = audits.dashboard(&t.manager).await.unwrap();
    assert_eq!(full.by_status.len(), AuditStatus::ALL.len());
    let count = |d: &AuditDashboard, s: AuditStatus| {
        d.by_status.iter().find(|(status, _)| *status == s).map(|(_, n)| *n)
    };
    assert_eq!(count(&full, AuditStatus::Planning), Some(1));
    assert_eq!(count(&full, AuditStatus::Fieldwork), Some(1));
    assert_eq!(count(&full, AuditStatus::Completed), Some(0));
    assert_eq!((full.open_requests, full.open_findings), (1, 1));

    let scoped = audits.dashboard(&t.auditor).await.unwrap();
    assert_eq!(count(&scoped, AuditStatus::Fieldwork), Some(0));
    assert_eq!((scoped.open_requests, scoped.open_findings), (1, 0));
}

#[tokio::test]
async fn log_sink_failures_do_not_fail_operations() {
    let t = team().await;
    t.h.log.set_failing(true);
    let request = t
        .h
        .core
        .audits
        .create_request(&t.manager, t.audit.id, new_request("Still works"))
        .await
        .unwrap();
    assert_eq!(request.status, AuditRequestStatus::Open);
    assert!(!t.h.log.actions().contains(&AuditAction::RequestCreated));

    t.h.log.set_failing(false);
    t.h.core
        .audits
        .create_request(&t.manager, t.audit.id, new_request("Logged"))
        .await
        .unwrap();
    assert!(t.h.log.actions().contains(&AuditAction::RequestCreated));
}

#[tokio::test]
async fn list_audits_filters_and_searches() {
    let t = team().await;
    let audits = &t.h.core.audits;
    let mut internal = new_audit("ISO 27001 readiness", vec![]);
    internal.audit_type = AuditType::Internal;
    audits.create_audit(&t.manager, internal).await.unwrap();

    let by_type = audits
        .list_audits(
            &t.manager,
            AuditFilter {
                audit_type: Some(AuditType::Internal),
                ..Default::default()
            },
            AuditSort::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_type.total, 1);
    assert_eq!(by_type.items[0].title, "ISO 27001 readiness");

    let by_text = audits
        .list_audits(
            &t.manager,
            AuditFilter {
                q: Some("soc".into()),
                ..Default::default()
            },
            AuditSort::default(),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_text.total, 1);
    assert_eq!(by_text.items[0].id, t.audit.id);
}
