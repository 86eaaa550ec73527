use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use worklane_platform::ProcessorConfig;

/// A destination/on-behalf-of transfer instruction: funds route from the
/// business's payor account straight to the contractor's payout account.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub currency: String,
    pub destination_account: String,
    pub on_behalf_of_account: String,
    pub metadata: Value,
    #[serde(skip)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorPayment {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("processor request timed out")]
    Timeout,
    #[error("processor rejected the request: {0}")]
    Rejected(String),
    #[error("processor transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ProcessorClient: Send + Sync {
    async fn create_transfer_payment(
        &self,
        request: &TransferRequest,
    ) -> Result<ProcessorPayment, ProcessorError>;

    async fn retrieve_payment(
        &self,
        processor_payment_id: &str,
    ) -> Result<ProcessorPayment, ProcessorError>;
}

pub struct HttpProcessorClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpProcessorClient {
    pub fn new(config: &ProcessorConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ProcessorClient for HttpProcessorClient {
    async fn create_transfer_payment(
        &self,
        request: &TransferRequest,
    ) -> Result<ProcessorPayment, ProcessorError> {
        let response = self
            .http
            .post(format!("{}/v1/transfer-payments", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Rejected(format!("{status}: {body}")));
        }

        response.json().await.map_err(map_transport_error)
    }

    async fn retrieve_payment(
        &self,
        processor_payment_id: &str,
    ) -> Result<ProcessorPayment, ProcessorError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/payments/{processor_payment_id}",
                self.base_url
            ))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Rejected(format!("{status}: {body}")));
        }

        response.json().await.map_err(map_transport_error)
    }
}

// A timeout is a definitive failure here, not an unknown outcome: the
// idempotency key makes a later retry safe.
fn map_transport_error(err: reqwest::Error) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::Timeout
    } else {
        ProcessorError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn idempotency_key_travels_as_a_header_not_in_the_body() {
        let request = TransferRequest {
            amount: Decimal::new(50000, 2),
            currency: "GBP".to_string(),
            destination_account: "acct_contractor".to_string(),
            on_behalf_of_account: "acct_business".to_string(),
            metadata: json!({ "payment_id": "00000000-0000-0000-0000-000000000000" }),
            idempotency_key: "deadbeef".to_string(),
        };

        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("idempotency_key").is_none());
        assert_eq!(body["destination_account"], "acct_contractor");
        assert_eq!(body["on_behalf_of_account"], "acct_business");
        assert_eq!(body["amount"], "500.00");
    }
}
