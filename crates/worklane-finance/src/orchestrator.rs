use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use worklane_core::{
    LifecycleError, PaymentStatus, TriggerKind, WorkItemStatus, authorization_key,
    retry_authorization_key,
};
use worklane_platform::PaymentSummary;

use crate::error::FinanceError;
use crate::processor::{ProcessorClient, TransferRequest};
use crate::store::{self, PAYMENT_COLUMNS};

/// Converts an approval into a funds-transfer instruction, exactly once per
/// approval event. Approval is never rolled back here: any payment failure
/// leaves the work item `APPROVED` with a failed payment row for the
/// operator reprocessing list.
pub async fn authorize_payment(
    pool: &PgPool,
    processor: &dyn ProcessorClient,
    work_item_id: Uuid,
    triggered_by: Uuid,
    trigger_kind: TriggerKind,
) -> Result<PaymentSummary, FinanceError> {
    let mut tx = pool.begin().await?;

    let item = store::lock_work_item(&mut tx, work_item_id)
        .await?
        .ok_or(FinanceError::Lifecycle(LifecycleError::NotFound {
            entity: "work item",
            id: work_item_id,
        }))?;

    if !matches!(
        item.status,
        WorkItemStatus::Approved | WorkItemStatus::Completed
    ) {
        return Err(FinanceError::Lifecycle(
            LifecycleError::InvalidStateTransition {
                from: item.status,
                to: WorkItemStatus::Completed,
            },
        ));
    }
    let contractor_id = item
        .contractor_id
        .ok_or(FinanceError::Lifecycle(LifecycleError::ContractorUnbound))?;

    // An existing non-failed payment for this item is the payment for the
    // current approval event; a retried approval resolves to the same
    // processor resource instead of a duplicate charge.
    let existing = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments \
         WHERE work_item_id = $1 AND status <> 'FAILED' \
         ORDER BY scheduled_at DESC LIMIT 1"
    ))
    .bind(work_item_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = existing {
        let payment = store::payment_from_row(&row)?;
        tx.commit().await?;
        info!(
            "payment {} already covers work item {}, returning existing outcome",
            payment.id, work_item_id
        );
        return Ok(store::summarize(&payment));
    }

    let failed_attempts: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE work_item_id = $1 AND status = 'FAILED'",
    )
    .bind(work_item_id)
    .fetch_one(&mut *tx)
    .await?;

    let key = select_authorization_key(work_item_id, item.updated_at, failed_attempts);
    let payment_id = Uuid::new_v4();
    let now = Utc::now();

    // The local record exists before the external call so a failed call is
    // auditable and retryable.
    let inserted = sqlx::query(
        r#"
        INSERT INTO payments (
            id, work_item_id, business_id, contractor_id, amount, currency,
            status, authorization_key, triggered_by, trigger_kind, scheduled_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'PROCESSING', $7, $8, $9, $10)
        ON CONFLICT (authorization_key) DO NOTHING
        "#,
    )
    .bind(payment_id)
    .bind(work_item_id)
    .bind(item.business_id)
    .bind(contractor_id)
    .bind(item.amount)
    .bind(&item.currency)
    .bind(&key)
    .bind(triggered_by)
    .bind(trigger_kind.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        // A concurrent authorization won the race; return its row.
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE authorization_key = $1"
        ))
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?;
        let payment = store::payment_from_row(&row)?;
        tx.commit().await?;
        return Ok(store::summarize(&payment));
    }

    tx.commit().await?;

    let Some(destination_account) = account_ref(pool, contractor_id, "PAYOUT").await? else {
        return mark_failed(
            pool,
            payment_id,
            "contractor has no payout account registered with the processor",
        )
        .await;
    };
    let Some(on_behalf_of_account) = account_ref(pool, item.business_id, "PAYOR").await? else {
        return mark_failed(
            pool,
            payment_id,
            "business has no payor account registered with the processor",
        )
        .await;
    };

    let request = TransferRequest {
        amount: item.amount,
        currency: item.currency.clone(),
        destination_account,
        on_behalf_of_account,
        // The webhook maps events back by this metadata, never by
        // amount/time heuristics.
        metadata: json!({
            "payment_id": payment_id,
            "work_item_id": work_item_id,
            "authorization_key": key,
        }),
        idempotency_key: key.clone(),
    };

    match processor.create_transfer_payment(&request).await {
        Ok(remote) => {
            let mut tx = pool.begin().await?;
            sqlx::query(
                "UPDATE payments SET processor_payment_id = $2, processor_status = $3 WHERE id = $1",
            )
            .bind(payment_id)
            .bind(&remote.id)
            .bind(&remote.status)
            .execute(&mut *tx)
            .await?;

            // Transfer initiated (not necessarily settled) completes the
            // work item.
            sqlx::query(
                "UPDATE work_items SET status = 'COMPLETED', updated_at = $2 \
                 WHERE id = $1 AND status = 'APPROVED'",
            )
            .bind(work_item_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(
                "payment {} initiated as {} for work item {}",
                payment_id, remote.id, work_item_id
            );

            Ok(PaymentSummary {
                payment_id,
                status: PaymentStatus::Processing.as_str().to_string(),
                processor_payment_id: Some(remote.id),
                amount: item.amount,
                currency: item.currency,
                failure_reason: None,
            })
        }
        Err(err) => {
            warn!(
                "transfer creation failed for payment {} (work item {}): {}",
                payment_id, work_item_id, err
            );
            mark_failed(pool, payment_id, &err.to_string()).await
        }
    }
}

/// First attempt for an approval window keys off (item, updated_at) alone;
/// operator retries after failures get a distinct key per attempt ordinal.
pub fn select_authorization_key(
    work_item_id: Uuid,
    last_modified: DateTime<Utc>,
    failed_attempts: i64,
) -> String {
    if failed_attempts <= 0 {
        authorization_key(work_item_id, last_modified)
    } else {
        retry_authorization_key(work_item_id, last_modified, failed_attempts as u32)
    }
}

async fn account_ref(
    pool: &PgPool,
    party_id: Uuid,
    account_kind: &str,
) -> Result<Option<String>, FinanceError> {
    let account: Option<String> = sqlx::query_scalar(
        "SELECT account_ref FROM processor_accounts WHERE party_id = $1 AND account_kind = $2",
    )
    .bind(party_id)
    .bind(account_kind)
    .fetch_optional(pool)
    .await?;

    Ok(account)
}

async fn mark_failed(
    pool: &PgPool,
    payment_id: Uuid,
    reason: &str,
) -> Result<PaymentSummary, FinanceError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;
    let payment = store::payment_from_row(&row)?;

    if !local_failure_applies(payment.status) {
        // The reconciler finalized this payment off a webhook that landed
        // inside the client timeout window; its terminal status stands and
        // this payment must not resurface in the failed list.
        tx.commit().await?;
        info!(
            "payment {} already {} at reconciliation, ignoring late client failure: {}",
            payment_id,
            payment.status.as_str(),
            reason
        );
        return Ok(store::summarize(&payment));
    }

    let row = sqlx::query(&format!(
        "UPDATE payments SET status = 'FAILED', failure_reason = $2 \
         WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;
    let payment = store::payment_from_row(&row)?;
    tx.commit().await?;
    Ok(store::summarize(&payment))
}

/// A client-observed failure (timeout, transport error, rejection) only
/// lands while the payment is still in flight locally. Once the webhook
/// reconciler has recorded a terminal status, the late client result loses.
fn local_failure_applies(current: PaymentStatus) -> bool {
    current == PaymentStatus::Processing
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn first_attempt_key_is_stable_for_an_unchanged_item() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_eq!(
            select_authorization_key(id, at, 0),
            select_authorization_key(id, at, 0)
        );
    }

    #[test]
    fn resubmission_window_changes_the_key() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        assert_ne!(
            select_authorization_key(id, at, 0),
            select_authorization_key(id, at + Duration::seconds(1), 0)
        );
    }

    #[test]
    fn late_client_failure_never_downgrades_a_reconciled_payment() {
        assert!(local_failure_applies(PaymentStatus::Processing));
        assert!(!local_failure_applies(PaymentStatus::Completed));
        assert!(!local_failure_applies(PaymentStatus::Failed));
    }

    #[test]
    fn each_manual_retry_gets_its_own_key() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        let base = select_authorization_key(id, at, 0);
        let first_retry = select_authorization_key(id, at, 1);
        let second_retry = select_authorization_key(id, at, 2);
        assert_ne!(base, first_retry);
        assert_ne!(first_retry, second_retry);
    }
}
