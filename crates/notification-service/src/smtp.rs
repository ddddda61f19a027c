use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::templates::EmailTemplate;
use crate::{Alert, NotificationChannel, NotificationConfig, NotificationError, SmtpTls};

/// Email channel. One multipart message (plain text and HTML) per alert,
/// addressed to every configured recipient.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_HOST not set".into()))?;
        let from: Mailbox = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotificationError::Config("SMTP_FROM_ADDRESS not set".into()))?
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid from address: {}", e)))?;

        let mut to = Vec::with_capacity(config.smtp_to.len());
        for addr in &config.smtp_to {
            match addr.parse::<Mailbox>() {
                Ok(mailbox) => to.push(mailbox),
                Err(e) => tracing::warn!("Skipping recipient {}: {}", addr, e),
            }
        }
        if to.is_empty() {
            return Err(NotificationError::Config(
                "No valid NOTIFICATION_EMAIL_TO addresses".into(),
            ));
        }

        let builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .map_err(|e| NotificationError::Smtp(format!("SMTP transport error: {}", e)))?
        .port(config.smtp_port)
        .timeout(Some(crate::DELIVERY_TIMEOUT));

        let builder = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, alert: &Alert) -> Result<Message, NotificationError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(alert.title.clone());
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                EmailTemplate::render_text(alert),
                EmailTemplate::render(alert),
            ))
            .map_err(|e| NotificationError::Smtp(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let email = self.build_message(alert)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Smtp(format!("Failed to send email: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertType;

    fn config(to: &[&str]) -> NotificationConfig {
        NotificationConfig {
            smtp_host: Some("smtp.example.com".into()),
            smtp_port: 587,
            smtp_from: Some("agent@example.com".into()),
            smtp_to: to.iter().map(|s| s.to_string()).collect(),
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_rejects_when_no_recipient_parses() {
        let result = SmtpNotifier::new(&config(&["not an address"]));
        assert!(matches!(result, Err(NotificationError::Config(_))));
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let mut cfg = config(&["trader@example.com"]);
        cfg.smtp_host = None;
        assert!(matches!(
            SmtpNotifier::new(&cfg),
            Err(NotificationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_message_addresses_all_recipients() {
        let notifier =
            SmtpNotifier::new(&config(&["a@example.com", "bogus", "b@example.com"])).unwrap();
        assert_eq!(notifier.to.len(), 2);

        let alert = Alert::new(
            AlertType::RiskLimitReached {
                reason: "daily plan cap".into(),
            },
            "Risk limit reached",
            "Cycle skipped",
        );
        let formatted = String::from_utf8(notifier.build_message(&alert).unwrap().formatted())
            .unwrap();
        assert!(formatted.contains("a@example.com"));
        assert!(formatted.contains("b@example.com"));
        assert!(formatted.contains("Subject: Risk limit reached"));
    }
}
