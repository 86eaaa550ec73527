use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;
use worklane_core::PaymentStatus;
use worklane_platform::{EventBus, PAYMENTS_COMPLETED_CHANNEL, PaymentCompletedEvent};

use crate::error::FinanceError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the processor's HMAC-SHA256 signature over the exact raw body
/// bytes. Constant-time comparison; any mismatch rejects without touching
/// state.
pub fn verify_signature(
    secret: &str,
    raw_body: &[u8],
    signature_hex: &str,
) -> Result<(), FinanceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| FinanceError::InvalidSignature)?;
    mac.update(raw_body);

    let provided = hex::decode(signature_hex.trim()).map_err(|_| FinanceError::InvalidSignature)?;
    mac.verify_slice(&provided)
        .map_err(|_| FinanceError::InvalidSignature)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: ProcessorEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEventData {
    pub object: ProcessorEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorEventObject {
    pub id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: ProcessorEventMetadata,
    pub failure_message: Option<String>,
}

// Metadata values stay raw strings: events for payments created outside
// this flow can carry arbitrary metadata, and a malformed id must read as
// absent rather than failing the whole envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessorEventMetadata {
    pub payment_id: Option<String>,
    pub work_item_id: Option<String>,
    pub authorization_key: Option<String>,
}

impl ProcessorEventMetadata {
    pub fn payment_id(&self) -> Option<Uuid> {
        self.payment_id
            .as_deref()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

pub fn event_payment_status(kind: &str) -> Option<PaymentStatus> {
    match kind {
        "transfer.succeeded" | "payment.succeeded" => Some(PaymentStatus::Completed),
        "transfer.failed" | "payment.failed" => Some(PaymentStatus::Failed),
        "transfer.processing" | "payment.processing" => Some(PaymentStatus::Processing),
        _ => None,
    }
}

/// Monotonic reconciliation rule: a terminal local status is never
/// downgraded by a non-terminal incoming one, so redelivered or
/// out-of-order events converge on the same end state.
pub fn reconcile(current: PaymentStatus, incoming: PaymentStatus) -> Option<PaymentStatus> {
    if current.is_terminal() && !incoming.is_terminal() {
        return None;
    }
    if current == incoming {
        return None;
    }
    Some(incoming)
}

/// Applies one verified processor event to local payment state. Safe to
/// re-invoke with the same event; the processor may redeliver.
pub async fn handle_processor_event(
    pool: &PgPool,
    bus: &EventBus,
    raw_body: &[u8],
    signature: &str,
    secret: &str,
) -> Result<(), FinanceError> {
    verify_signature(secret, raw_body, signature)?;

    let event: ProcessorEvent = serde_json::from_slice(raw_body)
        .map_err(|err| FinanceError::PaymentProcessor(format!("malformed event payload: {err}")))?;

    let Some(incoming) = event_payment_status(&event.kind) else {
        info!("ignoring processor event {} of kind {}", event.id, event.kind);
        return Ok(());
    };

    // Mapping back is strictly by embedded metadata; an event without it
    // (or for a payment created outside this flow) is acknowledged as-is.
    let Some(payment_id) = event.data.object.metadata.payment_id() else {
        info!(
            "processor event {} carries no payment metadata, acknowledging",
            event.id
        );
        return Ok(());
    };

    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT status, work_item_id, business_id, contractor_id, amount, currency \
         FROM payments WHERE id = $1 FOR UPDATE",
    )
    .bind(payment_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        info!(
            "no local payment {} for processor event {}, acknowledging",
            payment_id, event.id
        );
        return Ok(());
    };

    let current = PaymentStatus::parse(&row.try_get::<String, _>("status")?)?;
    let Some(next) = reconcile(current, incoming) else {
        tx.commit().await?;
        info!(
            "processor event {} leaves payment {} at {}",
            event.id,
            payment_id,
            current.as_str()
        );
        return Ok(());
    };

    let now = Utc::now();
    match next {
        PaymentStatus::Completed => {
            sqlx::query(
                "UPDATE payments SET status = 'COMPLETED', \
                 processor_payment_id = COALESCE(processor_payment_id, $2), \
                 processor_status = $3, completed_at = $4 WHERE id = $1",
            )
            .bind(payment_id)
            .bind(&event.data.object.id)
            .bind(event.data.object.status.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            // Downstream invoice generation and the contractor notification
            // both hang off this event; neither can fail the reconciliation.
            let completed = PaymentCompletedEvent {
                payment_id,
                work_item_id: row.try_get("work_item_id")?,
                business_id: row.try_get("business_id")?,
                contractor_id: row.try_get("contractor_id")?,
                amount: row.try_get("amount")?,
                currency: row.try_get("currency")?,
                completed_at: now,
            };
            if let Err(err) = bus.publish_json(PAYMENTS_COMPLETED_CHANNEL, &completed).await {
                warn!(
                    "payment {} completed but event publish failed: {err:#}",
                    payment_id
                );
            }
            info!("payment {} completed via processor event {}", payment_id, event.id);
        }
        PaymentStatus::Failed => {
            sqlx::query(
                "UPDATE payments SET status = 'FAILED', processor_status = $2, \
                 failure_reason = COALESCE($3, failure_reason) WHERE id = $1",
            )
            .bind(payment_id)
            .bind(event.data.object.status.as_deref())
            .bind(event.data.object.failure_message.as_deref())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            // No automatic retry; failed payments surface in the operator
            // reprocessing list.
            warn!(
                "payment {} failed at the processor: {}",
                payment_id,
                event.data.object.failure_message.as_deref().unwrap_or("no detail")
            );
        }
        PaymentStatus::Processing => {
            sqlx::query(
                "UPDATE payments SET status = 'PROCESSING', processor_status = $2 WHERE id = $1",
            )
            .bind(payment_id)
            .bind(event.data.object.status.as_deref())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_payload(secret: &str, raw_body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(raw_body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_round_trip() {
        let secret = "whsec_test";
        let body = br#"{"id":"evt_1","type":"transfer.succeeded"}"#;
        let signature = sign_payload(secret, body);
        assert!(verify_signature(secret, body, &signature).is_ok());
    }

    #[test]
    fn tampered_body_or_wrong_secret_is_rejected() {
        let secret = "whsec_test";
        let body = br#"{"id":"evt_1"}"#;
        let signature = sign_payload(secret, body);

        assert!(matches!(
            verify_signature(secret, br#"{"id":"evt_2"}"#, &signature),
            Err(FinanceError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature("whsec_other", body, &signature),
            Err(FinanceError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature(secret, body, "not-hex"),
            Err(FinanceError::InvalidSignature)
        ));
    }

    #[test]
    fn terminal_status_is_sticky() {
        use PaymentStatus::*;
        assert_eq!(reconcile(Completed, Processing), None);
        assert_eq!(reconcile(Failed, Processing), None);
        assert_eq!(reconcile(Processing, Completed), Some(Completed));
        assert_eq!(reconcile(Processing, Failed), Some(Failed));
    }

    #[test]
    fn redelivery_is_a_no_op() {
        use PaymentStatus::*;
        assert_eq!(reconcile(Completed, Completed), None);
        assert_eq!(reconcile(Processing, Processing), None);
        assert_eq!(reconcile(Failed, Failed), None);
    }

    #[test]
    fn event_kinds_map_to_statuses() {
        assert_eq!(
            event_payment_status("transfer.succeeded"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            event_payment_status("payment.failed"),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            event_payment_status("transfer.processing"),
            Some(PaymentStatus::Processing)
        );
        assert_eq!(event_payment_status("account.updated"), None);
    }

    #[test]
    fn event_payload_parses_with_and_without_metadata() {
        let payment_id = Uuid::new_v4();
        let raw = format!(
            r#"{{
                "id": "evt_42",
                "type": "transfer.succeeded",
                "data": {{
                    "object": {{
                        "id": "py_99",
                        "status": "paid",
                        "metadata": {{ "payment_id": "{payment_id}" }}
                    }}
                }}
            }}"#
        );
        let event: ProcessorEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.kind, "transfer.succeeded");
        assert_eq!(event.data.object.metadata.payment_id(), Some(payment_id));

        let bare = r#"{
            "id": "evt_43",
            "type": "transfer.failed",
            "data": { "object": { "id": "py_100", "status": null, "failure_message": "card declined" } }
        }"#;
        let event: ProcessorEvent = serde_json::from_str(bare).unwrap();
        assert_eq!(event.data.object.metadata.payment_id(), None);
        assert_eq!(event.data.object.failure_message.as_deref(), Some("card declined"));
    }

    #[test]
    fn foreign_metadata_with_a_malformed_id_reads_as_absent() {
        let raw = r#"{
            "id": "evt_44",
            "type": "transfer.succeeded",
            "data": {
                "object": {
                    "id": "py_101",
                    "status": "paid",
                    "metadata": { "payment_id": "ORDER-2291", "work_item_id": "west-2" }
                }
            }
        }"#;
        let event: ProcessorEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.data.object.metadata.payment_id(), None);
    }
}
