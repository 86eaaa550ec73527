use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic payment authorization key for a work item at a given
/// modification timestamp. A retried approval against unchanged item state
/// derives the same key and therefore resolves to the same processor
/// resource; a resubmit-and-reapprove cycle moves the timestamp and is a
/// new payment.
pub fn authorization_key(work_item_id: Uuid, last_modified: DateTime<Utc>) -> String {
    derive(work_item_id, last_modified, 0)
}

/// Key for an explicit operator retry after a failed payment. The attempt
/// ordinal keeps the retry distinct from the failed row while staying
/// deterministic for the same (item, timestamp, attempt) triple.
pub fn retry_authorization_key(
    work_item_id: Uuid,
    last_modified: DateTime<Utc>,
    attempt: u32,
) -> String {
    derive(work_item_id, last_modified, attempt)
}

fn derive(work_item_id: Uuid, last_modified: DateTime<Utc>, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(work_item_id.as_bytes());
    hasher.update(last_modified.timestamp_micros().to_be_bytes());
    if attempt > 0 {
        hasher.update(attempt.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn same_inputs_same_key() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_eq!(authorization_key(id, at), authorization_key(id, at));
    }

    #[test]
    fn timestamp_change_changes_key() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_ne!(
            authorization_key(id, at),
            authorization_key(id, at + Duration::microseconds(1))
        );
    }

    #[test]
    fn different_items_never_collide() {
        let at = Utc::now();
        assert_ne!(
            authorization_key(Uuid::new_v4(), at),
            authorization_key(Uuid::new_v4(), at)
        );
    }

    #[test]
    fn retry_attempts_are_distinct_but_attempt_zero_matches_base() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_eq!(authorization_key(id, at), retry_authorization_key(id, at, 0));
        assert_ne!(
            retry_authorization_key(id, at, 1),
            retry_authorization_key(id, at, 2)
        );
        assert_ne!(authorization_key(id, at), retry_authorization_key(id, at, 1));
    }
}
