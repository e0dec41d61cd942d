//! Outbound email transports.

mod memory;
mod resend;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::MailError;

pub use memory::InMemoryMailer;
pub use resend::ResendMailer;

/// A rendered email ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        }
    }
}

/// Something that can deliver an email.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Cheap sanity check before a message leaves the process.
pub(crate) fn check_recipient(to: &str) -> Result<(), MailError> {
    let to = to.trim();
    match to.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(MailError::InvalidRecipient(to.to_string())),
    }
}
