//! Outbound mail for contact submissions.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::models::ContactMessage;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, msg: &ContactMessage) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", config.from)))?;
        let to = config
            .to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("{}: {e}", config.to)))?;
        let transport = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| MailError::Delivery(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        info!(host = %config.host, port = config.port, "smtp delivery enabled");
        Ok(Self { transport, from, to })
    }

    fn build(&self, msg: &ContactMessage) -> Result<Message, MailError> {
        // the display name goes in unparsed so commas and parentheses get quoted
        let address = msg
            .email
            .trim()
            .parse::<Address>()
            .map_err(|e| MailError::Address(format!("{}: {e}", msg.email)))?;
        let reply_to = Mailbox::new(Some(msg.name.trim().to_string()), address);
        Message::builder()
            .from(self.from.clone())
            .reply_to(reply_to)
            .to(self.to.clone())
            .subject(format!("Contact form: {}", msg.name.trim()))
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "From: {} <{}>\n\n{}",
                msg.name.trim(),
                msg.email.trim(),
                msg.message.trim()
            ))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, msg: &ContactMessage) -> Result<(), MailError> {
        let email = self.build(msg)?;
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Delivery(format!("mail task failed: {e}")))?
            .map_err(|e| {
                warn!(error = %e, "smtp delivery failed");
                MailError::Delivery(e.to_string())
            })?;
        Ok(())
    }
}

/// Used when no SMTP server is configured: logs the message and reports
/// success, so submissions are still stored.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, msg: &ContactMessage) -> Result<(), MailError> {
        info!(
            name = %msg.name,
            email = %msg.email,
            chars = msg.message.len(),
            "contact message received (smtp delivery disabled)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "robot@example.com".into(),
            password: "secret".into(),
            from: "Job Tracker <robot@example.com>".into(),
            to: "owner@example.com".into(),
        }
    }

    #[test]
    fn rejects_bad_recipient() {
        let mut cfg = config();
        cfg.to = "not an address".into();
        assert!(matches!(SmtpMailer::new(&cfg), Err(MailError::Address(_))));
    }

    #[test]
    fn builds_reply_to_from_sender() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let msg = ContactMessage {
            name: "Ann Lee".into(),
            email: "ann@example.com".into(),
            message: "Hello there".into(),
        };
        let built = mailer.build(&msg).unwrap();
        let raw = String::from_utf8(built.formatted()).unwrap();
        assert!(raw.contains("Reply-To:"));
        assert!(raw.contains("ann@example.com"));
        assert!(raw.contains("Subject: Contact form: Ann Lee"));
        assert!(raw.contains("Hello there"));
    }

    #[test]
    fn reply_to_accepts_names_with_punctuation() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        for name in ["Lee, Ann", "O'Brien (Pat)"] {
            let msg = ContactMessage {
                name: name.into(),
                email: "ann@example.com".into(),
                message: "Hello there".into(),
            };
            let built = mailer.build(&msg).unwrap();
            let raw = String::from_utf8(built.formatted()).unwrap();
            assert!(raw.contains("Reply-To:"), "{name}");
            assert!(raw.contains("ann@example.com"), "{name}");
        }
    }

    #[test]
    fn bad_sender_address_is_an_address_error() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let msg = ContactMessage {
            name: "Ann".into(),
            email: "not an address".into(),
            message: "hi".into(),
        };
        assert!(matches!(mailer.build(&msg), Err(MailError::Address(_))));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let msg = ContactMessage {
            name: "Ann".into(),
            email: "ann@example.com".into(),
            message: "hi".into(),
        };
        assert!(LogMailer.send(&msg).await.is_ok());
    }
}
