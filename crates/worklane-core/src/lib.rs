pub mod authorization_key;
pub mod authz;
pub mod error;
pub mod lifecycle;
pub mod models;

pub use authorization_key::{authorization_key, retry_authorization_key};
pub use authz::{Actor, ContractorCredential, Role};
pub use error::LifecycleError;
pub use lifecycle::ApprovalOutcome;
pub use models::{
    Payment, PaymentStatus, Submission, SubmissionStatus, TriggerKind, WorkItem, WorkItemKind,
    WorkItemStatus,
};
