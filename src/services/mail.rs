//! Outbound email collaborator.

use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// JSON mail API: `POST {url}` with a bearer key and the [`Email`] body.
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<SecretString>,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: Option<SecretString>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let mut req = self.client.post(&self.url).json(email);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }
}

/// Logs instead of sending. Used when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        info!(to = %email.to, subject = %email.subject, "mail api not configured, email logged only");
        Ok(())
    }
}

/// Records every message. Handy for asserting on outgoing mail.
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<Email>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| Error::Other("outbox lock poisoned".to_string()))?
            .push(email.clone());
        Ok(())
    }
}
