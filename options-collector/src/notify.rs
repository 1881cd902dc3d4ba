//! Completion email, sent as a post-batch hook.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::info;

use crate::collector::{BatchHook, BatchReport};
use crate::config::EmailCredentials;

pub const DEFAULT_SMTP_RELAY: &str = "smtp.gmail.com";
pub const SUBJECT: &str = "Options collection complete";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Emails the batch results to the sender's own address.
pub struct EmailNotifier {
    credentials: EmailCredentials,
    relay: String,
}

impl EmailNotifier {
    pub fn new(credentials: EmailCredentials) -> Self {
        Self {
            credentials,
            relay: DEFAULT_SMTP_RELAY.to_string(),
        }
    }

    pub fn with_relay(mut self, relay: impl Into<String>) -> Self {
        self.relay = relay.into();
        self
    }

    pub fn build_message(&self, report: &BatchReport) -> Result<Message, NotifyError> {
        let mailbox: Mailbox = self.credentials.user.parse()?;
        let message = Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(report.to_string())?;
        Ok(message)
    }
}

#[async_trait]
impl BatchHook for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn after_batch(&self, report: &BatchReport) -> Result<(), NotifyError> {
        let message = self.build_message(report)?;
        let mailer = SmtpTransport::relay(&self.relay)?
            .credentials(Credentials::new(
                self.credentials.user.clone(),
                self.credentials.password.clone(),
            ))
            .build();

        // The SMTP transport blocks
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))??;

        info!(to = %self.credentials.user, "Sent completion email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ObservationDate;

    fn notifier(user: &str) -> EmailNotifier {
        EmailNotifier::new(EmailCredentials {
            user: user.to_string(),
            password: "secret".to_string(),
        })
    }

    fn report() -> BatchReport {
        BatchReport {
            date: ObservationDate::parse("2024-06-03").unwrap(),
            results: vec![("SPY".to_string(), 1200)],
        }
    }

    #[test]
    fn test_message_goes_to_sender() {
        let message = notifier("collector@example.com").build_message(&report()).unwrap();
        let text = String::from_utf8(message.formatted()).unwrap();

        assert!(text.contains("Subject: Options collection complete"));
        assert!(text.contains("From: collector@example.com"));
        assert!(text.contains("To: collector@example.com"));
        assert!(text.contains("SPY: 1200"));
    }

    #[test]
    fn test_invalid_sender_is_error() {
        let err = notifier("not an address").build_message(&report()).unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }
}
