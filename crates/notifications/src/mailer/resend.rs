use async_trait::async_trait;
use serde::Serialize;

use super::{Mailer, OutgoingEmail, check_recipient};
use crate::error::MailError;

const SEND_PATH: &str = "/emails";

/// Resend HTTP API client.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl ResendMailer {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.resend.com";

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key, from)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn name(&self) -> &str {
        "resend"
    }

    #[tracing::instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        check_recipient(&email.to)?;

        let body = SendEmailBody {
            from: &self.from,
            to: [email.to.trim()],
            subject: &email.subject,
            html: &email.html,
        };

        let resp = self
            .http
            .post(format!("{}{SEND_PATH}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("email accepted by Resend");
        Ok(())
    }
}
