//! Notification and job error types.

use fulfillment::FulfillmentError;
use store::StoreError;
use thiserror::Error;

/// Errors from sending an email.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("mail provider refused the message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),
}

/// Errors that stop a batch job before it finishes.
///
/// Failures for single records are counted in the job summary instead.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fulfillment error: {0}")]
    Fulfillment(#[from] FulfillmentError),
}

/// Convenience type alias for job results.
pub type Result<T> = std::result::Result<T, JobError>;
