//! Fire-and-forget notification delivery.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::mailer::{Mailer, OutgoingEmail};
use crate::templates::{Notification, Recipient};

/// Renders notifications and hands them to a [`Mailer`].
///
/// Delivery failures are logged and counted, never returned: a lost email
/// must not fail the request or job that triggered it.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    ops_email: Option<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, ops_email: Option<String>) -> Self {
        Self {
            mailer,
            ops_email: ops_email.filter(|e| !e.trim().is_empty()),
        }
    }

    /// True when ops notifications are emailed rather than only logged.
    pub fn has_ops_address(&self) -> bool {
        self.ops_email.is_some()
    }

    /// Sends the notification. Returns true when the mailer accepted it.
    #[tracing::instrument(skip(self, notification), fields(kind = notification.kind()))]
    pub async fn notify(&self, notification: Notification) -> bool {
        let kind = notification.kind();
        let rendered = notification.render();

        let to = match rendered.recipient {
            Recipient::Customer(to) | Recipient::Vendor(to) => to,
            Recipient::Ops => match &self.ops_email {
                Some(to) => to.clone(),
                None => {
                    tracing::warn!(
                        subject = %rendered.subject,
                        body = %rendered.html,
                        "no ops address configured, alert logged only"
                    );
                    return false;
                }
            },
        };

        let email = OutgoingEmail::new(to, rendered.subject, rendered.html);
        match self.mailer.send(&email).await {
            Ok(()) => {
                metrics::counter!("notifications_sent_total", "kind" => kind).increment(1);
                tracing::info!(to = %email.to, mailer = self.mailer.name(), "notification sent");
                true
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total", "kind" => kind).increment(1);
                tracing::error!(to = %email.to, error = %e, "notification failed");
                false
            }
        }
    }

    /// Sends the notification on a background task so the caller never waits.
    pub fn notify_detached(&self, notification: Notification) -> JoinHandle<bool> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.notify(notification).await })
    }
}
