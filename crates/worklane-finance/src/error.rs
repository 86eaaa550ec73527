use rust_decimal::Decimal;
use thiserror::Error;
use worklane_core::LifecycleError;

#[derive(Debug, Error)]
pub enum FinanceError {
    #[error(
        "budget cap {requested_cap} is at or below outstanding commitment {committed}; \
         minimum acceptable cap is {minimum_cap}"
    )]
    BudgetBelowCommitment {
        requested_cap: Decimal,
        committed: Decimal,
        minimum_cap: Decimal,
    },

    #[error("payment processor error: {0}")]
    PaymentProcessor(String),

    #[error("webhook signature did not verify")]
    InvalidSignature,

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
