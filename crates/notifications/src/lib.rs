//! Customer, vendor and ops notifications.
//!
//! - [`Mailer`] is the transport seam: [`ResendMailer`] in production,
//!   [`InMemoryMailer`] in tests.
//! - [`Notifier`] renders a [`Notification`] and sends it without ever
//!   failing the caller.
//! - [`jobs`] holds the scheduled batch jobs (abandoned carts, review
//!   requests, SLA alerts, vendor statements, dispatch retries).

pub mod error;
pub mod jobs;
pub mod mailer;
pub mod notifier;
pub mod templates;

pub use error::{JobError, MailError, Result};
pub use jobs::{InvoiceMonth, Job, JobConfig, JobRunner, JobSummary, VendorInvoice};
pub use mailer::{InMemoryMailer, Mailer, OutgoingEmail, ResendMailer};
pub use notifier::Notifier;
pub use templates::{Notification, Recipient, Rendered};
