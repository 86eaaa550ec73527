use anyhow::Result;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;
use worklane_core::{Payment, PaymentStatus, TriggerKind, WorkItem, WorkItemKind, WorkItemStatus};
use worklane_platform::PaymentSummary;

pub const WORK_ITEM_COLUMNS: &str = "\
    id, business_id, contractor_id, kind, amount, currency, status, due_date, \
    description, artifact_refs, access_token, token_expires_at, submitted_at, \
    approved_at, rejected_at, rejection_notes, created_at, updated_at";

pub fn work_item_from_row(row: &PgRow) -> Result<WorkItem> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let artifact_refs: Value = row.try_get("artifact_refs")?;

    Ok(WorkItem {
        id: row.try_get("id")?,
        business_id: row.try_get("business_id")?,
        contractor_id: row.try_get("contractor_id")?,
        kind: WorkItemKind::parse(&kind)?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status: WorkItemStatus::parse(&status)?,
        due_date: row.try_get("due_date")?,
        description: row.try_get("description")?,
        artifact_refs: serde_json::from_value(artifact_refs)?,
        access_token: row.try_get("access_token")?,
        token_expires_at: row.try_get("token_expires_at")?,
        submitted_at: row.try_get("submitted_at")?,
        approved_at: row.try_get("approved_at")?,
        rejected_at: row.try_get("rejected_at")?,
        rejection_notes: row.try_get("rejection_notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Loads a work item under a row lock; every lifecycle transition on one
/// item is serialized through this.
pub async fn lock_work_item(
    tx: &mut Transaction<'_, Postgres>,
    work_item_id: Uuid,
) -> Result<Option<WorkItem>> {
    let row = sqlx::query(&format!(
        "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = $1 FOR UPDATE"
    ))
    .bind(work_item_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.as_ref().map(work_item_from_row).transpose()
}

/// Writes back the mutable fields of a work item after a state-machine
/// transition. The state machine is the only producer of these values.
pub async fn persist_work_item(
    tx: &mut Transaction<'_, Postgres>,
    item: &WorkItem,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE work_items
        SET contractor_id = $2,
            status = $3,
            artifact_refs = $4,
            access_token = $5,
            token_expires_at = $6,
            submitted_at = $7,
            approved_at = $8,
            rejected_at = $9,
            rejection_notes = $10,
            updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(item.id)
    .bind(item.contractor_id)
    .bind(item.status.as_str())
    .bind(serde_json::to_value(&item.artifact_refs)?)
    .bind(item.access_token.as_deref())
    .bind(item.token_expires_at)
    .bind(item.submitted_at)
    .bind(item.approved_at)
    .bind(item.rejected_at)
    .bind(item.rejection_notes.as_deref())
    .bind(item.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub fn payment_from_row(row: &PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    let trigger_kind: String = row.try_get("trigger_kind")?;

    Ok(Payment {
        id: row.try_get("id")?,
        work_item_id: row.try_get("work_item_id")?,
        business_id: row.try_get("business_id")?,
        contractor_id: row.try_get("contractor_id")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status: PaymentStatus::parse(&status)?,
        authorization_key: row.try_get("authorization_key")?,
        processor_payment_id: row.try_get("processor_payment_id")?,
        processor_status: row.try_get("processor_status")?,
        triggered_by: row.try_get("triggered_by")?,
        trigger_kind: TriggerKind::parse(&trigger_kind)?,
        failure_reason: row.try_get("failure_reason")?,
        scheduled_at: row.try_get("scheduled_at")?,
        completed_at: row.try_get("completed_at")?,
        notes: row.try_get("notes")?,
    })
}

pub const PAYMENT_COLUMNS: &str = "\
    id, work_item_id, business_id, contractor_id, amount, currency, status, \
    authorization_key, processor_payment_id, processor_status, triggered_by, \
    trigger_kind, failure_reason, scheduled_at, completed_at, notes";

/// Most relevant payment for a work item: a live (non-failed) payment if
/// one exists, otherwise the newest failed one.
pub async fn latest_payment_summary(
    pool: &PgPool,
    work_item_id: Uuid,
) -> Result<Option<PaymentSummary>> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments \
         WHERE work_item_id = $1 \
         ORDER BY (status <> 'FAILED') DESC, scheduled_at DESC \
         LIMIT 1"
    ))
    .bind(work_item_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let payment = payment_from_row(&row)?;
    Ok(Some(summarize(&payment)))
}

pub fn summarize(payment: &Payment) -> PaymentSummary {
    PaymentSummary {
        payment_id: payment.id,
        status: payment.status.as_str().to_string(),
        processor_payment_id: payment.processor_payment_id.clone(),
        amount: payment.amount,
        currency: payment.currency.clone(),
        failure_reason: payment.failure_reason.clone(),
    }
}
