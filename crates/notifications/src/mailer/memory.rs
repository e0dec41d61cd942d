use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Mailer, OutgoingEmail, check_recipient};
use crate::error::MailError;

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<OutgoingEmail>,
    fail_for: Vec<String>,
    fail_all: bool,
}

/// Mailer that keeps every message in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<Mutex<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every message addressed to `to`.
    pub async fn fail_for(&self, to: impl Into<String>) {
        self.state.lock().await.fail_for.push(to.into());
    }

    pub async fn fail_all(&self, fail: bool) {
        self.state.lock().await.fail_all = fail;
    }

    /// Messages delivered so far; failed ones are not included.
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.state.lock().await.sent.clone()
    }

    pub async fn sent_to(&self, to: &str) -> Vec<OutgoingEmail> {
        self.state
            .lock()
            .await
            .sent
            .iter()
            .filter(|email| email.to == to)
            .cloned()
            .collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.state.lock().await.sent.len()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        check_recipient(&email.to)?;

        let mut state = self.state.lock().await;
        if state.fail_all || state.fail_for.contains(&email.to) {
            return Err(MailError::Rejected {
                status: 503,
                body: "scripted failure".to_string(),
            });
        }
        state.sent.push(email.clone());
        Ok(())
    }
}
