pub mod budget;
pub mod bulk;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod store;
pub mod webhook;

pub use budget::set_budget_cap;
pub use bulk::{BulkSelector, bulk_approve};
pub use error::FinanceError;
pub use orchestrator::authorize_payment;
pub use processor::{
    HttpProcessorClient, ProcessorClient, ProcessorError, ProcessorPayment, TransferRequest,
};
pub use webhook::{handle_processor_event, reconcile, verify_signature};
