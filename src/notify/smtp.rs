//! Notifier implementations: SMTP delivery and a log-only fallback

use super::{Notification, Notifier};
use crate::config::{MailSecurity, MailSettings};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Sends plain-text mail through an SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(settings: &MailSettings) -> Result<Self> {
        let host = settings.smtp_host.as_str();
        let builder = match settings.security {
            MailSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| BridgeError::Config(format!("SMTP relay {}: {}", host, e)))?,
            MailSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| BridgeError::Config(format!("SMTP relay {}: {}", host, e)))?,
            MailSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        let mut builder = builder.port(settings.smtp_port);

        if let Some(ref username) = settings.username {
            let password = settings.resolve_password().unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        let from = settings
            .from
            .parse::<Mailbox>()
            .map_err(|e| BridgeError::Config(format!("Invalid sender '{}': {}", settings.from, e)))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, recipients: &BTreeSet<String>, notification: &Notification) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject())
            .header(ContentType::TEXT_PLAIN);

        let mut addressed = 0;
        for recipient in recipients {
            match recipient.parse::<Mailbox>() {
                Ok(mailbox) => {
                    builder = builder.to(mailbox);
                    addressed += 1;
                }
                Err(e) => warn!(recipient = %recipient, error = %e, "Skipping invalid recipient"),
            }
        }
        if addressed == 0 {
            return Err(BridgeError::Notify("no valid recipients".to_string()));
        }

        builder
            .body(notification.body())
            .map_err(|e| BridgeError::Notify(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        recipients: &BTreeSet<String>,
        notification: &Notification,
    ) -> Result<()> {
        if recipients.is_empty() {
            warn!(issue = %notification.issue_key(), "No notification recipients configured");
            return Ok(());
        }

        let message = self.message(recipients, notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| BridgeError::Notify(e.to_string()))?;

        info!(
            issue = %notification.issue_key(),
            recipients = recipients.len(),
            subject = %notification.subject(),
            "Notification sent"
        );
        Ok(())
    }
}

/// Writes notifications to the log instead of mailing them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipients: &BTreeSet<String>,
        notification: &Notification,
    ) -> Result<()> {
        let to: Vec<&str> = recipients.iter().map(String::as_str).collect();
        warn!(
            issue = %notification.issue_key(),
            to = %to.join(", "),
            subject = %notification.subject(),
            body = %notification.body(),
            "Notification (mail not configured)"
        );
        Ok(())
    }
}
