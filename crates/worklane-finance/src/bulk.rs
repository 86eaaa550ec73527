use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;
use worklane_core::{
    Actor, ApprovalOutcome, LifecycleError, PaymentStatus, Role, SubmissionStatus, TriggerKind,
    lifecycle,
};
use worklane_platform::{BulkApproveItemResult, BulkApproveResponse, PaymentSummary};

use crate::error::FinanceError;
use crate::orchestrator;
use crate::processor::ProcessorClient;
use crate::store;

/// Which submissions a bulk approval covers: an explicit set, or everything
/// pending review across the approver's work items.
#[derive(Debug, Clone)]
pub enum BulkSelector {
    Submissions(Vec<Uuid>),
    AllPendingFor(Uuid),
}

/// Approval-first, payment-best-effort. Every selected submission is
/// handled independently: a structural defect or payment failure on one
/// item never blocks the rest of the batch, and an approval once committed
/// is never undone by its payment outcome. The itemized report is the
/// product.
pub async fn bulk_approve(
    pool: &PgPool,
    processor: &dyn ProcessorClient,
    selector: BulkSelector,
    approver_id: Uuid,
    feedback: Option<&str>,
) -> Result<BulkApproveResponse, FinanceError> {
    let submission_ids = match selector {
        BulkSelector::Submissions(ids) => ids,
        BulkSelector::AllPendingFor(business_id) => {
            sqlx::query_scalar(
                "SELECT s.id FROM submissions s \
                 JOIN work_items w ON w.id = s.work_item_id \
                 WHERE w.business_id = $1 \
                   AND s.status = 'SUBMITTED' \
                   AND w.status = 'SUBMITTED' \
                 ORDER BY s.created_at ASC",
            )
            .bind(business_id)
            .fetch_all(pool)
            .await?
        }
    };

    let mut report = BulkApproveResponse::default();
    for submission_id in submission_ids {
        let outcome = approve_one(pool, processor, submission_id, approver_id, feedback).await;
        let item = match outcome {
            Ok(item) => item,
            Err(err) => {
                warn!("bulk approval of submission {submission_id} errored: {err}");
                BulkApproveItemResult {
                    submission_id,
                    work_item_id: None,
                    approved: false,
                    payment_status: None,
                    amount: None,
                    error: Some(err.to_string()),
                }
            }
        };
        absorb(&mut report, item);
    }

    info!(
        "bulk approval processed {} submissions: {} approved, {} errored, {} payments failed",
        report.processed, report.approved, report.errored, report.payments_failed
    );
    Ok(report)
}

/// Folds one per-item result into the running batch counters.
pub fn absorb(report: &mut BulkApproveResponse, item: BulkApproveItemResult) {
    report.processed += 1;
    if item.approved {
        report.approved += 1;
    }
    if item.error.is_some() && !item.approved {
        report.errored += 1;
    }
    match item.payment_status.as_deref() {
        Some(status) if status == PaymentStatus::Failed.as_str() => {
            report.payments_failed += 1;
        }
        Some(_) => {
            report.payments_succeeded += 1;
            report.total_paid_amount += item.amount.unwrap_or(Decimal::ZERO);
        }
        None => {}
    }
    report.items.push(item);
}

async fn approve_one(
    pool: &PgPool,
    processor: &dyn ProcessorClient,
    submission_id: Uuid,
    approver_id: Uuid,
    feedback: Option<&str>,
) -> Result<BulkApproveItemResult, FinanceError> {
    let mut tx = pool.begin().await?;

    let submission_row = sqlx::query(
        "SELECT work_item_id, version, status FROM submissions WHERE id = $1 FOR UPDATE",
    )
    .bind(submission_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(FinanceError::Lifecycle(LifecycleError::NotFound {
        entity: "submission",
        id: submission_id,
    }))?;

    let work_item_id: Uuid = submission_row.try_get("work_item_id")?;
    let version: i32 = submission_row.try_get("version")?;
    let submission_status =
        SubmissionStatus::parse(&submission_row.try_get::<String, _>("status")?)?;

    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await?
        .ok_or(FinanceError::Lifecycle(LifecycleError::NotFound {
            entity: "work item",
            id: work_item_id,
        }))?;

    if item.contractor_id.is_none() {
        return Err(FinanceError::Lifecycle(LifecycleError::ContractorUnbound));
    }

    let latest_version: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM submissions WHERE work_item_id = $1",
    )
    .bind(work_item_id)
    .fetch_one(&mut *tx)
    .await?;
    if version != latest_version {
        return Err(FinanceError::Lifecycle(LifecycleError::StaleSubmission {
            latest: latest_version,
            requested: version,
        }));
    }
    if submission_status == SubmissionStatus::Rejected {
        return Err(FinanceError::Lifecycle(LifecycleError::StaleSubmission {
            latest: latest_version,
            requested: version,
        }));
    }

    let approver = Actor {
        user_id: approver_id,
        role: Role::Business,
    };
    let now = Utc::now();
    let outcome = lifecycle::approve(&mut item, approver, now)?;

    // Approval is idempotent: an item already past review reports its
    // existing payment outcome and never re-enters the orchestrator.
    if outcome == ApprovalOutcome::AlreadyApproved {
        tx.commit().await?;
        let existing = store::latest_payment_summary(pool, work_item_id).await?;
        return Ok(reapproval_result(
            submission_id,
            work_item_id,
            item.amount,
            existing,
        ));
    }

    store::persist_work_item(&mut tx, &item).await?;

    sqlx::query(
        "UPDATE submissions \
         SET status = 'APPROVED', reviewed_by = $2, review_notes = $3, reviewed_at = $4 \
         WHERE id = $1 AND status = 'SUBMITTED'",
    )
    .bind(submission_id)
    .bind(approver_id)
    .bind(feedback)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    // The approval commits here, before any payment attempt.
    tx.commit().await?;

    let payment = orchestrator::authorize_payment(
        pool,
        processor,
        work_item_id,
        approver_id,
        TriggerKind::BulkApproval,
    )
    .await;

    let (payment_status, payment_error) = match payment {
        Ok(summary) => {
            let error = summary.failure_reason.clone();
            (Some(summary.status), error)
        }
        Err(err) => {
            warn!("payment attempt for work item {work_item_id} errored: {err}");
            (Some(PaymentStatus::Failed.as_str().to_string()), Some(err.to_string()))
        }
    };

    Ok(BulkApproveItemResult {
        submission_id,
        work_item_id: Some(work_item_id),
        approved: true,
        payment_status,
        amount: Some(item.amount),
        error: payment_error,
    })
}

fn reapproval_result(
    submission_id: Uuid,
    work_item_id: Uuid,
    amount: Decimal,
    existing: Option<PaymentSummary>,
) -> BulkApproveItemResult {
    let (payment_status, error) = match existing {
        Some(summary) => (Some(summary.status), summary.failure_reason),
        None => (None, None),
    };
    BulkApproveItemResult {
        submission_id,
        work_item_id: Some(work_item_id),
        approved: true,
        payment_status,
        amount: Some(amount),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approved_item(amount: i64, payment_status: &str, error: Option<&str>) -> BulkApproveItemResult {
        BulkApproveItemResult {
            submission_id: Uuid::new_v4(),
            work_item_id: Some(Uuid::new_v4()),
            approved: true,
            payment_status: Some(payment_status.to_string()),
            amount: Some(Decimal::new(amount, 2)),
            error: error.map(str::to_string),
        }
    }

    fn errored_item() -> BulkApproveItemResult {
        BulkApproveItemResult {
            submission_id: Uuid::new_v4(),
            work_item_id: None,
            approved: false,
            payment_status: None,
            amount: None,
            error: Some("work item has no contractor bound".to_string()),
        }
    }

    #[test]
    fn one_bad_item_does_not_taint_the_counters_of_the_rest() {
        let mut report = BulkApproveResponse::default();
        absorb(&mut report, approved_item(10000, "PROCESSING", None));
        absorb(&mut report, approved_item(20000, "PROCESSING", None));
        absorb(&mut report, errored_item());
        absorb(&mut report, approved_item(5000, "PROCESSING", None));
        absorb(&mut report, approved_item(7500, "PROCESSING", None));

        assert_eq!(report.processed, 5);
        assert_eq!(report.approved, 4);
        assert_eq!(report.errored, 1);
        assert_eq!(report.payments_succeeded, 4);
        assert_eq!(report.payments_failed, 0);
        assert_eq!(report.total_paid_amount, Decimal::new(42500, 2));
        assert_eq!(report.items.len(), 5);
    }

    #[test]
    fn reapproval_reports_the_existing_payment_instead_of_a_new_attempt() {
        let completed = PaymentSummary {
            payment_id: Uuid::new_v4(),
            status: "COMPLETED".to_string(),
            processor_payment_id: Some("py_7".to_string()),
            amount: Decimal::new(10000, 2),
            currency: "GBP".to_string(),
            failure_reason: None,
        };
        let result = reapproval_result(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(10000, 2),
            Some(completed),
        );
        assert!(result.approved);
        assert_eq!(result.payment_status.as_deref(), Some("COMPLETED"));
        assert!(result.error.is_none());

        // A previously failed payment is reported as-is; the retry path is
        // the explicit operator one, not a repeated bulk approval.
        let failed = PaymentSummary {
            payment_id: Uuid::new_v4(),
            status: "FAILED".to_string(),
            processor_payment_id: None,
            amount: Decimal::new(10000, 2),
            currency: "GBP".to_string(),
            failure_reason: Some("no payout account".to_string()),
        };
        let result = reapproval_result(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Decimal::new(10000, 2),
            Some(failed),
        );
        assert_eq!(result.payment_status.as_deref(), Some("FAILED"));
        assert_eq!(result.error.as_deref(), Some("no payout account"));

        let bare = reapproval_result(Uuid::new_v4(), Uuid::new_v4(), Decimal::new(10000, 2), None);
        assert!(bare.approved);
        assert!(bare.payment_status.is_none());
        assert!(bare.error.is_none());
    }

    #[test]
    fn payment_failure_still_counts_the_approval() {
        let mut report = BulkApproveResponse::default();
        absorb(
            &mut report,
            approved_item(10000, "FAILED", Some("no payout account")),
        );

        assert_eq!(report.processed, 1);
        assert_eq!(report.approved, 1);
        assert_eq!(report.errored, 0);
        assert_eq!(report.payments_failed, 1);
        assert_eq!(report.payments_succeeded, 0);
        assert_eq!(report.total_paid_amount, Decimal::ZERO);
    }
}
