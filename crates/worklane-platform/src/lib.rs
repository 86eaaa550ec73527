pub mod bus;
pub mod config;
pub mod contracts;
pub mod db;

pub use bus::{EventBus, NOTIFICATIONS_CHANNEL, PAYMENTS_COMPLETED_CHANNEL};
pub use config::{ProcessorConfig, ServiceConfig};
pub use contracts::{
    ApproveRequest, ApproveResponse, AssignContractorRequest, AssignContractorResponse,
    BulkApproveItemResult, BulkApproveRequest,
    BulkApproveResponse, ContractorActionQuery, ContractorActionRequest, CreateWorkItemRequest,
    CreateWorkItemResponse, DeleteWorkItemRequest, FailedPaymentView, ListFailedPaymentsResponse,
    NotificationEvent, PaymentCompletedEvent, PaymentSummary, RequestRevisionRequest,
    RequestRevisionResponse, RetryPaymentRequest, SetBudgetCapRequest, SetBudgetCapResponse,
    SubmitWorkRequest, SubmitWorkResponse, WorkItemStatusResponse, WorkItemView,
};
pub use db::connect_database;
