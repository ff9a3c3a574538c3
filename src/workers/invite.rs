//! Send a user invitation email.
//!
//! Delivery cannot be verified locally; a transport error is retried and
//! everything else is only logged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::model::job::InvitePayload;
use crate::queue::{HandlerError, JobHandler};
use crate::services::{Email, Mailer};

pub struct InviteHandler {
    mailer: Arc<dyn Mailer>,
    from: String,
}

impl InviteHandler {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
        }
    }

    pub fn render(&self, invite: &InvitePayload) -> Email {
        let greeting = match invite.name.as_deref() {
            Some(name) if !name.trim().is_empty() => format!("Hi {name},"),
            _ => "Hi,".to_string(),
        };
        let text = format!(
            "{greeting}\n\n{} has invited you to join the dealership team as {}.\n\n\
             Accept your invitation here:\n{}\n\n\
             If you were not expecting this email you can ignore it.\n",
            invite.invited_by, invite.role, invite.accept_url
        );
        Email {
            from: self.from.clone(),
            to: invite.email.clone(),
            subject: "You're invited to join the team".to_string(),
            text,
        }
    }
}

#[async_trait]
impl JobHandler for InviteHandler {
    type Payload = InvitePayload;

    async fn handle(&self, invite: InvitePayload) -> Result<(), HandlerError> {
        if !invite.email.contains('@') {
            return Err(HandlerError::Malformed(format!(
                "invalid email address: {}",
                invite.email
            )));
        }

        let email = self.render(&invite);
        match self.mailer.send(&email).await {
            Ok(()) => {
                info!(to = %invite.email, role = %invite.role, "invite sent");
                Ok(())
            }
            Err(e) => {
                warn!(to = %invite.email, error = %e, "invite send failed");
                Err(HandlerError::transient(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::LogMailer;

    #[test]
    fn renders_greeting_and_link() {
        let handler = InviteHandler::new(Arc::new(LogMailer), "team@dealer.test");
        let email = handler.render(&InvitePayload {
            email: "sam@example.com".into(),
            name: Some("Sam".into()),
            role: "SALES".into(),
            invited_by: "Pat".into(),
            accept_url: "https://dealer.test/invite/abc".into(),
        });
        assert_eq!(email.to, "sam@example.com");
        assert_eq!(email.from, "team@dealer.test");
        assert!(email.text.starts_with("Hi Sam,"));
        assert!(email.text.contains("Pat has invited you"));
        assert!(email.text.contains("https://dealer.test/invite/abc"));
    }
}
