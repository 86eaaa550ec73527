use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use worklane_platform::{SetBudgetCapRequest, SetBudgetCapResponse};

use crate::error::FinanceError;

/// Sets a business's budget cap, re-validating the commitment floor on
/// every mutation. Commitments move continuously as work items are created
/// and completed, so the floor is always recomputed, never cached.
pub async fn set_budget_cap(
    pool: &PgPool,
    request: &SetBudgetCapRequest,
) -> Result<SetBudgetCapResponse, FinanceError> {
    if request.cap < Decimal::ZERO {
        return Err(FinanceError::Other(anyhow::anyhow!(
            "cap must be non-negative"
        )));
    }

    let mut tx = pool.begin().await?;

    let committed = pending_commitment(&mut tx, request.business_id).await?;
    if request.cap <= committed {
        return Err(FinanceError::BudgetBelowCommitment {
            requested_cap: request.cap,
            committed,
            minimum_cap: committed + Decimal::new(1, 2),
        });
    }

    let used: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments \
         WHERE business_id = $1 AND status = 'COMPLETED'",
    )
    .bind(request.business_id)
    .fetch_one(&mut *tx)
    .await?;

    let reset_period = request
        .reset_period
        .as_deref()
        .map(normalize_reset_period)
        .transpose()?
        .unwrap_or_else(|| "MONTHLY".to_string());
    let enabled = request.enabled.unwrap_or(true);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO budget_policies (business_id, cap, reset_period, enabled, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (business_id)
        DO UPDATE SET
            cap = EXCLUDED.cap,
            reset_period = EXCLUDED.reset_period,
            enabled = EXCLUDED.enabled,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(request.business_id)
    .bind(request.cap)
    .bind(&reset_period)
    .bind(enabled)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "budget cap for {} set to {} (committed {}, used {})",
        request.business_id, request.cap, committed, used
    );

    Ok(SetBudgetCapResponse {
        business_id: request.business_id,
        cap: request.cap,
        committed,
        used,
        updated_at: now,
    })
}

/// Outstanding committed value: open assigned work not yet fully paid, plus
/// the value of unassigned ad-hoc items.
async fn pending_commitment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    business_id: Uuid,
) -> Result<Decimal, FinanceError> {
    let open_assigned: Decimal = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(w.amount), 0)
        FROM work_items w
        WHERE w.business_id = $1
          AND w.contractor_id IS NOT NULL
          AND w.status IN ('PENDING', 'ACCEPTED', 'SUBMITTED', 'APPROVED')
          AND NOT EXISTS (
              SELECT 1 FROM payments p
              WHERE p.work_item_id = w.id AND p.status = 'COMPLETED'
          )
        "#,
    )
    .bind(business_id)
    .fetch_one(&mut **tx)
    .await?;

    let unassigned: Decimal = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM work_items \
         WHERE business_id = $1 AND contractor_id IS NULL \
           AND status IN ('DRAFT', 'PENDING')",
    )
    .bind(business_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(open_assigned + unassigned)
}

fn normalize_reset_period(value: &str) -> Result<String, FinanceError> {
    let normalized = value.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "WEEKLY" | "MONTHLY" | "QUARTERLY" | "ANNUAL" => Ok(normalized),
        _ => Err(FinanceError::Other(anyhow::anyhow!(
            "reset_period must be WEEKLY, MONTHLY, QUARTERLY, or ANNUAL"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_period_normalization() {
        assert_eq!(normalize_reset_period(" monthly ").unwrap(), "MONTHLY");
        assert!(normalize_reset_period("FORTNIGHTLY").is_err());
    }

    #[test]
    fn rejection_carries_the_floor_and_a_usable_minimum() {
        let err = FinanceError::BudgetBelowCommitment {
            requested_cap: Decimal::new(100000, 2),
            committed: Decimal::new(125000, 2),
            minimum_cap: Decimal::new(125001, 2),
        };
        let message = err.to_string();
        assert!(message.contains("1000.00"));
        assert!(message.contains("1250.00"));
        assert!(message.contains("1250.01"));
    }
}
