use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::WorkItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Business,
    Contractor,
}

/// Verified caller identity supplied by the auth boundary. There is no
/// ambient session; every state-machine call takes one of these explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

/// How a contractor proves they may act on a work item: a verified session
/// actor, or possession of the item's single-use capability token.
#[derive(Debug, Clone)]
pub enum ContractorCredential {
    Actor(Actor),
    Token(String),
}

pub fn ensure_business_owner(item: &WorkItem, actor: Actor) -> Result<(), LifecycleError> {
    if actor.role != Role::Business || actor.user_id != item.business_id {
        return Err(LifecycleError::AccessDenied(
            "caller does not own this work item".to_string(),
        ));
    }
    Ok(())
}

/// Returns the bound contractor id when the credential is valid for the item.
pub fn ensure_bound_contractor(
    item: &WorkItem,
    credential: &ContractorCredential,
    now: DateTime<Utc>,
) -> Result<Uuid, LifecycleError> {
    let contractor_id = item
        .contractor_id
        .ok_or(LifecycleError::ContractorUnbound)?;

    match credential {
        ContractorCredential::Actor(actor) => {
            if actor.role != Role::Contractor || actor.user_id != contractor_id {
                return Err(LifecycleError::AccessDenied(
                    "caller is not the assigned contractor".to_string(),
                ));
            }
        }
        ContractorCredential::Token(token) => {
            let expected = item.access_token.as_deref().ok_or_else(|| {
                LifecycleError::AccessDenied("work item has no active token".to_string())
            })?;
            if expected != token {
                return Err(LifecycleError::AccessDenied(
                    "token does not match work item".to_string(),
                ));
            }
            let expires_at = item.token_expires_at.ok_or_else(|| {
                LifecycleError::AccessDenied("token has no expiry set".to_string())
            })?;
            if now > expires_at {
                return Err(LifecycleError::AccessDenied("token expired".to_string()));
            }
        }
    }

    Ok(contractor_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WorkItemKind, WorkItemStatus};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn item() -> WorkItem {
        let now = Utc::now();
        WorkItem {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            contractor_id: Some(Uuid::new_v4()),
            kind: WorkItemKind::Deliverable,
            amount: Decimal::new(50000, 2),
            currency: "GBP".to_string(),
            status: WorkItemStatus::Pending,
            due_date: None,
            description: "landing page".to_string(),
            artifact_refs: vec![],
            access_token: Some("tok-123".to_string()),
            token_expires_at: Some(now + Duration::days(7)),
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_check_requires_business_role_and_identity() {
        let item = item();
        let owner = Actor {
            user_id: item.business_id,
            role: Role::Business,
        };
        assert!(ensure_business_owner(&item, owner).is_ok());

        let wrong_role = Actor {
            user_id: item.business_id,
            role: Role::Contractor,
        };
        assert!(ensure_business_owner(&item, wrong_role).is_err());

        let stranger = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Business,
        };
        assert!(ensure_business_owner(&item, stranger).is_err());
    }

    #[test]
    fn contractor_by_identity() {
        let item = item();
        let contractor = Actor {
            user_id: item.contractor_id.unwrap(),
            role: Role::Contractor,
        };
        let got = ensure_bound_contractor(
            &item,
            &ContractorCredential::Actor(contractor),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(got, item.contractor_id.unwrap());
    }

    #[test]
    fn contractor_by_token_needs_match_and_expiry() {
        let item = item();
        let now = Utc::now();

        assert!(
            ensure_bound_contractor(
                &item,
                &ContractorCredential::Token("tok-123".to_string()),
                now
            )
            .is_ok()
        );
        assert!(
            ensure_bound_contractor(
                &item,
                &ContractorCredential::Token("tok-999".to_string()),
                now
            )
            .is_err()
        );
        assert!(
            ensure_bound_contractor(
                &item,
                &ContractorCredential::Token("tok-123".to_string()),
                now + Duration::days(30)
            )
            .is_err()
        );
    }

    #[test]
    fn unbound_item_rejects_any_contractor_credential() {
        let mut item = item();
        item.contractor_id = None;
        let err = ensure_bound_contractor(
            &item,
            &ContractorCredential::Token("tok-123".to_string()),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, LifecycleError::ContractorUnbound);
    }
}
