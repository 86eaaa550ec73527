use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemKind {
    Contract,
    Milestone,
    Deliverable,
    WorkRequest,
}

impl WorkItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemKind::Contract => "CONTRACT",
            WorkItemKind::Milestone => "MILESTONE",
            WorkItemKind::Deliverable => "DELIVERABLE",
            WorkItemKind::WorkRequest => "WORK_REQUEST",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONTRACT" => Ok(WorkItemKind::Contract),
            "MILESTONE" => Ok(WorkItemKind::Milestone),
            "DELIVERABLE" => Ok(WorkItemKind::Deliverable),
            "WORK_REQUEST" => Ok(WorkItemKind::WorkRequest),
            other => anyhow::bail!(
                "kind must be CONTRACT, MILESTONE, DELIVERABLE, or WORK_REQUEST, got {other}"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemStatus {
    Draft,
    Pending,
    Accepted,
    Submitted,
    Approved,
    Completed,
    Declined,
    Deleted,
}

impl WorkItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Draft => "DRAFT",
            WorkItemStatus::Pending => "PENDING",
            WorkItemStatus::Accepted => "ACCEPTED",
            WorkItemStatus::Submitted => "SUBMITTED",
            WorkItemStatus::Approved => "APPROVED",
            WorkItemStatus::Completed => "COMPLETED",
            WorkItemStatus::Declined => "DECLINED",
            WorkItemStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(WorkItemStatus::Draft),
            "PENDING" => Ok(WorkItemStatus::Pending),
            "ACCEPTED" => Ok(WorkItemStatus::Accepted),
            "SUBMITTED" => Ok(WorkItemStatus::Submitted),
            "APPROVED" => Ok(WorkItemStatus::Approved),
            "COMPLETED" => Ok(WorkItemStatus::Completed),
            "DECLINED" => Ok(WorkItemStatus::Declined),
            "DELETED" => Ok(WorkItemStatus::Deleted),
            other => anyhow::bail!("unknown work item status: {other}"),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Completed | WorkItemStatus::Declined | WorkItemStatus::Deleted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Submitted,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::Approved => "APPROVED",
            SubmissionStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SUBMITTED" => Ok(SubmissionStatus::Submitted),
            "APPROVED" => Ok(SubmissionStatus::Approved),
            "REJECTED" => Ok(SubmissionStatus::Rejected),
            other => anyhow::bail!("unknown submission status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PROCESSING" => Ok(PaymentStatus::Processing),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => anyhow::bail!("unknown payment status: {other}"),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerKind {
    Approval,
    BulkApproval,
    ManualRetry,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Approval => "APPROVAL",
            TriggerKind::BulkApproval => "BULK_APPROVAL",
            TriggerKind::ManualRetry => "MANUAL_RETRY",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "APPROVAL" => Ok(TriggerKind::Approval),
            "BULK_APPROVAL" => Ok(TriggerKind::BulkApproval),
            "MANUAL_RETRY" => Ok(TriggerKind::ManualRetry),
            other => anyhow::bail!("unknown trigger kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub business_id: Uuid,
    pub contractor_id: Option<Uuid>,
    pub kind: WorkItemKind,
    pub amount: Decimal,
    pub currency: String,
    pub status: WorkItemStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub description: String,
    pub artifact_refs: Vec<String>,
    pub access_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub version: i32,
    pub submitted_by: Uuid,
    pub description: String,
    pub artifact_refs: Vec<String>,
    pub status: SubmissionStatus,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub work_item_id: Uuid,
    pub business_id: Uuid,
    pub contractor_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub authorization_key: String,
    pub processor_payment_id: Option<String>,
    pub processor_status: Option<String>,
    pub triggered_by: Uuid,
    pub trigger_kind: TriggerKind,
    pub failure_reason: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_db_representation() {
        for status in [
            WorkItemStatus::Draft,
            WorkItemStatus::Pending,
            WorkItemStatus::Accepted,
            WorkItemStatus::Submitted,
            WorkItemStatus::Approved,
            WorkItemStatus::Completed,
            WorkItemStatus::Declined,
            WorkItemStatus::Deleted,
        ] {
            assert_eq!(WorkItemStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn parse_is_case_and_whitespace_tolerant() {
        assert_eq!(
            WorkItemKind::parse(" deliverable ").unwrap(),
            WorkItemKind::Deliverable
        );
        assert_eq!(
            PaymentStatus::parse("completed").unwrap(),
            PaymentStatus::Completed
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(WorkItemStatus::parse("PAUSED").is_err());
        assert!(PaymentStatus::parse("").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(WorkItemStatus::Deleted.is_terminal());
        assert!(!WorkItemStatus::Approved.is_terminal());
    }
}
