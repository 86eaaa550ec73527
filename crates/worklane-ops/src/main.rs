use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use redis::Msg;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;
use worklane_platform::{
    EventBus, PAYMENTS_COMPLETED_CHANNEL, PaymentCompletedEvent, ServiceConfig, connect_database,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "worklane_ops=info".to_string()),
        )
        .init();

    let config = ServiceConfig::worker_from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let bus = EventBus::connect(&config.redis_url)?;

    let mut pubsub = bus.client().get_async_pubsub().await?;
    pubsub.subscribe(PAYMENTS_COMPLETED_CHANNEL).await?;
    let mut messages = pubsub.on_message();

    info!("ops worker subscribed to {}", PAYMENTS_COMPLETED_CHANNEL);

    loop {
        let msg = messages
            .next()
            .await
            .context("payments.completed stream ended unexpectedly")?;
        // Invoice generation and notification delivery are side effects of
        // an already-final payment; a failure here is logged and must never
        // reach back into payment or lifecycle state.
        if let Err(err) = handle_message(&pool, &bus, msg).await {
            error!("failed to process completed payment event: {err:#}");
        }
    }
}

async fn handle_message(pool: &PgPool, bus: &EventBus, msg: Msg) -> Result<()> {
    let payload: String = msg.get_payload()?;
    let event: PaymentCompletedEvent = serde_json::from_str(&payload)?;

    let invoice_id = generate_invoice(pool, &event).await?;
    match invoice_id {
        Some(invoice_id) => info!(
            "invoice {} issued for payment {}",
            invoice_id, event.payment_id
        ),
        None => info!(
            "payment {} already invoiced, skipping",
            event.payment_id
        ),
    }

    bus.notify(
        event.contractor_id,
        "PAYMENT_COMPLETED",
        &format!("Payment of {} {} has completed", event.amount, event.currency),
        event.work_item_id,
    )
    .await;

    Ok(())
}

/// Idempotent under event redelivery: one invoice per payment.
async fn generate_invoice(pool: &PgPool, event: &PaymentCompletedEvent) -> Result<Option<Uuid>> {
    let invoice_id = Uuid::new_v4();
    let inserted = sqlx::query(
        r#"
        INSERT INTO invoices (
            id, payment_id, work_item_id, business_id, contractor_id,
            amount, currency, issued_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (payment_id) DO NOTHING
        "#,
    )
    .bind(invoice_id)
    .bind(event.payment_id)
    .bind(event.work_item_id)
    .bind(event.business_id)
    .bind(event.contractor_id)
    .bind(event.amount)
    .bind(&event.currency)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 0 {
        Ok(None)
    } else {
        Ok(Some(invoice_id))
    }
}
