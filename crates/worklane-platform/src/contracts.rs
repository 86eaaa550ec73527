use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkItemRequest {
    pub business_id: Uuid,
    #[serde(default = "default_work_item_kind")]
    pub kind: String,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub contractor_id: Option<Uuid>,
    pub token_valid_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkItemResponse {
    pub work_item_id: Uuid,
    pub status: String,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemView {
    pub work_item_id: Uuid,
    pub business_id: Uuid,
    pub contractor_id: Option<Uuid>,
    pub kind: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub description: String,
    pub artifact_refs: Vec<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignContractorRequest {
    pub business_id: Uuid,
    pub contractor_id: Uuid,
    pub token_valid_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignContractorResponse {
    pub work_item_id: Uuid,
    pub status: String,
    pub access_token: String,
    pub token_expires_at: DateTime<Utc>,
}

/// Contractor-side actions authenticate either with a session identity in
/// the body or a capability token in the query string; token holders need
/// no session at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorActionRequest {
    pub contractor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractorActionQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemStatusResponse {
    pub work_item_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitWorkRequest {
    pub contractor_id: Option<Uuid>,
    pub description: String,
    pub artifact_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitWorkResponse {
    pub work_item_id: Uuid,
    pub submission_id: Uuid,
    pub version: i32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approver_id: Uuid,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub payment_id: Uuid,
    pub status: String,
    pub processor_payment_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub failure_reason: Option<String>,
}

/// Approval and payment are separate failure domains; the response always
/// reports both outcomes so a payment failure never masks a committed
/// approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub work_item_id: Uuid,
    pub status: String,
    pub already_approved: bool,
    pub payment: Option<PaymentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRevisionRequest {
    pub reviewer_id: Uuid,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRevisionResponse {
    pub work_item_id: Uuid,
    pub status: String,
    pub rejected_version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteWorkItemRequest {
    pub business_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApproveRequest {
    pub approver_id: Uuid,
    pub submission_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub approve_all_pending: bool,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkApproveItemResult {
    pub submission_id: Uuid,
    pub work_item_id: Option<Uuid>,
    pub approved: bool,
    pub payment_status: Option<String>,
    pub amount: Option<Decimal>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkApproveResponse {
    pub items: Vec<BulkApproveItemResult>,
    pub processed: i64,
    pub approved: i64,
    pub errored: i64,
    pub payments_succeeded: i64,
    pub payments_failed: i64,
    pub total_paid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetBudgetCapRequest {
    pub business_id: Uuid,
    pub cap: Decimal,
    pub reset_period: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetBudgetCapResponse {
    pub business_id: Uuid,
    pub cap: Decimal,
    pub committed: Decimal,
    pub used: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPaymentView {
    pub payment_id: Uuid,
    pub work_item_id: Uuid,
    pub business_id: Uuid,
    pub contractor_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub trigger_kind: String,
    pub failure_reason: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFailedPaymentsResponse {
    pub items: Vec<FailedPaymentView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPaymentRequest {
    pub requested_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub payment_id: Uuid,
    pub work_item_id: Uuid,
    pub business_id: Uuid,
    pub contractor_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub kind: String,
    pub message: String,
    pub related_entity: Uuid,
}

fn default_work_item_kind() -> String {
    "DELIVERABLE".to_string()
}
