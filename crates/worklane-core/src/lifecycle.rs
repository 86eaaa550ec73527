use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::authz::{self, Actor, ContractorCredential};
use crate::error::LifecycleError;
use crate::models::{WorkItem, WorkItemStatus};

/// Result of an approval request. Re-approving an already approved or
/// completed item is not an error; the caller must not re-trigger payment
/// for `AlreadyApproved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    AlreadyApproved,
}

fn guard_transition(item: &WorkItem, to: WorkItemStatus) -> Result<(), LifecycleError> {
    let allowed: &[WorkItemStatus] = match to {
        WorkItemStatus::Pending => &[WorkItemStatus::Draft],
        WorkItemStatus::Accepted => &[WorkItemStatus::Pending, WorkItemStatus::Submitted],
        WorkItemStatus::Declined => &[WorkItemStatus::Pending],
        WorkItemStatus::Submitted => &[WorkItemStatus::Accepted],
        WorkItemStatus::Approved => &[WorkItemStatus::Submitted],
        WorkItemStatus::Completed => &[WorkItemStatus::Approved],
        WorkItemStatus::Deleted | WorkItemStatus::Draft => &[],
    };

    if allowed.contains(&item.status) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidStateTransition {
            from: item.status,
            to,
        })
    }
}

/// Binds a contractor to a draft item and opens it for acceptance. The
/// capability token is minted by the caller and lets the contractor act
/// without a session until it expires.
pub fn assign(
    item: &mut WorkItem,
    actor: Actor,
    contractor_id: Uuid,
    access_token: String,
    token_expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    authz::ensure_business_owner(item, actor)?;
    guard_transition(item, WorkItemStatus::Pending)?;

    item.contractor_id = Some(contractor_id);
    item.access_token = Some(access_token);
    item.token_expires_at = Some(token_expires_at);
    item.status = WorkItemStatus::Pending;
    item.updated_at = now;
    Ok(())
}

pub fn accept(
    item: &mut WorkItem,
    credential: &ContractorCredential,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    authz::ensure_bound_contractor(item, credential, now)?;
    guard_transition(item, WorkItemStatus::Accepted)?;
    if item.status != WorkItemStatus::Pending {
        return Err(LifecycleError::InvalidStateTransition {
            from: item.status,
            to: WorkItemStatus::Accepted,
        });
    }

    item.status = WorkItemStatus::Accepted;
    // The token is single-use; acting on the item consumes it.
    item.access_token = None;
    item.token_expires_at = None;
    item.updated_at = now;
    Ok(())
}

pub fn decline(
    item: &mut WorkItem,
    credential: &ContractorCredential,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    authz::ensure_bound_contractor(item, credential, now)?;
    guard_transition(item, WorkItemStatus::Declined)?;

    item.status = WorkItemStatus::Declined;
    item.access_token = None;
    item.token_expires_at = None;
    item.updated_at = now;
    Ok(())
}

/// Moves an accepted item to submitted and returns the submission version to
/// record. `latest_version` is the highest existing version for the item
/// (0 when none).
pub fn submit(
    item: &mut WorkItem,
    credential: &ContractorCredential,
    artifact_refs: &[String],
    latest_version: i32,
    now: DateTime<Utc>,
) -> Result<i32, LifecycleError> {
    authz::ensure_bound_contractor(item, credential, now)?;
    guard_transition(item, WorkItemStatus::Submitted)?;
    if artifact_refs.iter().all(|r| r.trim().is_empty()) {
        return Err(LifecycleError::MissingArtifacts);
    }

    item.status = WorkItemStatus::Submitted;
    item.artifact_refs = artifact_refs.to_vec();
    item.submitted_at = Some(now);
    item.updated_at = now;
    Ok(latest_version + 1)
}

/// Business approval. Idempotent: an item already past `Submitted` reports
/// `AlreadyApproved` without touching any timestamp, so a retried approval
/// derives the same payment authorization key.
pub fn approve(
    item: &mut WorkItem,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<ApprovalOutcome, LifecycleError> {
    authz::ensure_business_owner(item, actor)?;

    if matches!(
        item.status,
        WorkItemStatus::Approved | WorkItemStatus::Completed
    ) {
        return Ok(ApprovalOutcome::AlreadyApproved);
    }
    guard_transition(item, WorkItemStatus::Approved)?;

    item.status = WorkItemStatus::Approved;
    item.approved_at = Some(now);
    item.updated_at = now;
    Ok(ApprovalOutcome::Approved)
}

/// Business rejection with notes; the item returns to `Accepted` so the
/// contractor can resubmit as a new submission version.
pub fn request_revision(
    item: &mut WorkItem,
    actor: Actor,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    authz::ensure_business_owner(item, actor)?;
    if item.status != WorkItemStatus::Submitted {
        return Err(LifecycleError::InvalidStateTransition {
            from: item.status,
            to: WorkItemStatus::Accepted,
        });
    }

    item.status = WorkItemStatus::Accepted;
    item.rejection_notes = Some(notes.to_string());
    item.rejected_at = Some(now);
    item.updated_at = now;
    Ok(())
}

/// Applied by the payment orchestrator once a processor-side transfer has
/// been initiated. Not caller-facing.
pub fn complete(item: &mut WorkItem, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    guard_transition(item, WorkItemStatus::Completed)?;
    item.status = WorkItemStatus::Completed;
    item.updated_at = now;
    Ok(())
}

/// Soft delete by the owning business. Only legal while no contractor is
/// bound and the item is not in a terminal state.
pub fn soft_delete(
    item: &mut WorkItem,
    actor: Actor,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    authz::ensure_business_owner(item, actor)?;
    if item.status.is_terminal() {
        return Err(LifecycleError::InvalidStateTransition {
            from: item.status,
            to: WorkItemStatus::Deleted,
        });
    }
    if item.contractor_id.is_some() {
        return Err(LifecycleError::AccessDenied(
            "cannot delete a work item with an assigned contractor".to_string(),
        ));
    }

    item.status = WorkItemStatus::Deleted;
    item.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::Role;
    use crate::models::WorkItemKind;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn item(status: WorkItemStatus) -> (WorkItem, Actor, ContractorCredential) {
        let now = Utc::now();
        let business_id = Uuid::new_v4();
        let contractor_id = Uuid::new_v4();
        let item = WorkItem {
            id: Uuid::new_v4(),
            business_id,
            contractor_id: Some(contractor_id),
            kind: WorkItemKind::Milestone,
            amount: Decimal::new(50000, 2),
            currency: "GBP".to_string(),
            status,
            due_date: None,
            description: "phase one".to_string(),
            artifact_refs: vec![],
            access_token: Some("tok-abc".to_string()),
            token_expires_at: Some(now + Duration::days(7)),
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_notes: None,
            created_at: now,
            updated_at: now,
        };
        let owner = Actor {
            user_id: business_id,
            role: Role::Business,
        };
        let contractor = ContractorCredential::Actor(Actor {
            user_id: contractor_id,
            role: Role::Contractor,
        });
        (item, owner, contractor)
    }

    #[test]
    fn assign_binds_contractor_and_opens_the_item() {
        let (mut wi, owner, _) = item(WorkItemStatus::Draft);
        wi.contractor_id = None;
        wi.access_token = None;
        wi.token_expires_at = None;
        let now = Utc::now();
        let contractor_id = Uuid::new_v4();

        assign(
            &mut wi,
            owner,
            contractor_id,
            "wlt_fresh".to_string(),
            now + Duration::days(14),
            now,
        )
        .unwrap();
        assert_eq!(wi.status, WorkItemStatus::Pending);
        assert_eq!(wi.contractor_id, Some(contractor_id));
        assert_eq!(wi.access_token.as_deref(), Some("wlt_fresh"));

        // Re-assigning an already-opened item is rejected.
        let err = assign(
            &mut wi,
            owner,
            Uuid::new_v4(),
            "wlt_other".to_string(),
            now + Duration::days(14),
            now,
        )
        .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidStateTransition {
                from: WorkItemStatus::Pending,
                to: WorkItemStatus::Pending,
            }
        );
        assert_eq!(wi.contractor_id, Some(contractor_id));
    }

    #[test]
    fn full_happy_path() {
        let (mut wi, owner, contractor) = item(WorkItemStatus::Pending);
        let now = Utc::now();

        accept(&mut wi, &contractor, now).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Accepted);
        assert!(wi.access_token.is_none());

        let version = submit(&mut wi, &contractor, &["s3://proof.zip".to_string()], 0, now).unwrap();
        assert_eq!(version, 1);
        assert_eq!(wi.status, WorkItemStatus::Submitted);

        let outcome = approve(&mut wi, owner, now).unwrap();
        assert_eq!(outcome, ApprovalOutcome::Approved);
        assert_eq!(wi.status, WorkItemStatus::Approved);

        complete(&mut wi, now).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Completed);
    }

    #[test]
    fn approving_a_pending_item_names_both_states() {
        let (mut wi, owner, _) = item(WorkItemStatus::Pending);
        let err = approve(&mut wi, owner, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidStateTransition {
                from: WorkItemStatus::Pending,
                to: WorkItemStatus::Approved,
            }
        );
        assert_eq!(wi.status, WorkItemStatus::Pending);
    }

    #[test]
    fn reapprove_is_idempotent_and_leaves_timestamps_alone() {
        let (mut wi, owner, _) = item(WorkItemStatus::Submitted);
        let first = Utc::now();
        assert_eq!(approve(&mut wi, owner, first).unwrap(), ApprovalOutcome::Approved);
        let stamped = wi.updated_at;

        let later = first + Duration::seconds(30);
        assert_eq!(
            approve(&mut wi, owner, later).unwrap(),
            ApprovalOutcome::AlreadyApproved
        );
        assert_eq!(wi.updated_at, stamped);

        complete(&mut wi, later).unwrap();
        assert_eq!(
            approve(&mut wi, owner, later).unwrap(),
            ApprovalOutcome::AlreadyApproved
        );
        assert_eq!(wi.status, WorkItemStatus::Completed);
    }

    #[test]
    fn completed_never_regresses() {
        let (mut wi, owner, contractor) = item(WorkItemStatus::Completed);
        let now = Utc::now();
        assert!(submit(&mut wi, &contractor, &["x".to_string()], 1, now).is_err());
        assert!(request_revision(&mut wi, owner, "redo", now).is_err());
        assert_eq!(wi.status, WorkItemStatus::Completed);
    }

    #[test]
    fn submit_requires_an_artifact() {
        let (mut wi, _, contractor) = item(WorkItemStatus::Accepted);
        let err = submit(&mut wi, &contractor, &[" ".to_string()], 0, Utc::now()).unwrap_err();
        assert_eq!(err, LifecycleError::MissingArtifacts);
        assert_eq!(wi.status, WorkItemStatus::Accepted);
    }

    #[test]
    fn revision_cycle_increments_version() {
        let (mut wi, owner, contractor) = item(WorkItemStatus::Accepted);
        let now = Utc::now();

        let v1 = submit(&mut wi, &contractor, &["v1.pdf".to_string()], 0, now).unwrap();
        assert_eq!(v1, 1);

        request_revision(&mut wi, owner, "add logo", now).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Accepted);
        assert_eq!(wi.rejection_notes.as_deref(), Some("add logo"));

        let v2 = submit(&mut wi, &contractor, &["v2.pdf".to_string()], v1, now).unwrap();
        assert_eq!(v2, 2);
    }

    #[test]
    fn only_the_assigned_contractor_may_accept() {
        let (mut wi, _, _) = item(WorkItemStatus::Pending);
        let imposter = ContractorCredential::Actor(Actor {
            user_id: Uuid::new_v4(),
            role: Role::Contractor,
        });
        assert!(matches!(
            accept(&mut wi, &imposter, Utc::now()),
            Err(LifecycleError::AccessDenied(_))
        ));
    }

    #[test]
    fn token_holder_can_decline_without_a_session() {
        let (mut wi, _, _) = item(WorkItemStatus::Pending);
        let token = ContractorCredential::Token("tok-abc".to_string());
        decline(&mut wi, &token, Utc::now()).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Declined);
    }

    #[test]
    fn soft_delete_requires_unbound_item() {
        let (mut wi, owner, _) = item(WorkItemStatus::Pending);
        assert!(matches!(
            soft_delete(&mut wi, owner, Utc::now()),
            Err(LifecycleError::AccessDenied(_))
        ));

        wi.contractor_id = None;
        soft_delete(&mut wi, owner, Utc::now()).unwrap();
        assert_eq!(wi.status, WorkItemStatus::Deleted);
    }

    #[test]
    fn soft_delete_never_applies_to_terminal_states() {
        let (mut wi, owner, _) = item(WorkItemStatus::Completed);
        wi.contractor_id = None;
        assert!(soft_delete(&mut wi, owner, Utc::now()).is_err());
    }
}
