use thiserror::Error;
use uuid::Uuid;

use crate::models::WorkItemStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot move work item from {} to {}", from.as_str(), to.as_str())]
    InvalidStateTransition {
        from: WorkItemStatus,
        to: WorkItemStatus,
    },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("a submission requires at least one artifact")]
    MissingArtifacts,

    #[error("work item has no contractor bound")]
    ContractorUnbound,

    #[error("only submission version {latest} is reviewable, version {requested} is stale")]
    StaleSubmission { latest: i32, requested: i32 },
}
