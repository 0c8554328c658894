//! SMTP email delivery

use crate::config::EmailConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

/// Sends a rendered HTML email
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_html(&self, to: &str, subject: &str, html: String) -> Result<()>;
}

pub struct SmtpEmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

fn email_error(message: impl ToString) -> AppError {
    AppError::external("smtp", message)
}

impl SmtpEmailTransport {
    /// Build the transport; `None` when SMTP credentials are not configured
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>> {
        let (Some(user), Some(password)) = (&config.user, &config.password) else {
            return Ok(None);
        };

        // Parsed before the pooled mailer exists; dropping that pool needs a runtime
        let from = config.from.parse::<Mailbox>().map_err(|e| AppError::Configuration {
            message: format!("Invalid from address {}: {}", config.from, e),
        })?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| AppError::Configuration {
            message: format!("Invalid SMTP host {}: {}", config.host, e),
        })?;

        let mailer = builder
            .port(config.port)
            .credentials(Credentials::new(user.clone(), password.clone()))
            .build();

        Ok(Some(Self { mailer, from }))
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send_html(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| AppError::validation(format!("Invalid email address {}: {}", to, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(email_error)?;

        let response = self.mailer.send(message).await.map_err(email_error)?;
        info!(to = %to, code = %response.code(), "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_disable_transport() {
        assert!(SmtpEmailTransport::from_config(&EmailConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_configured_transport_builds() {
        let config = EmailConfig {
            user: Some("bot@example.com".to_string()),
            password: Some("pw".to_string()),
            ..Default::default()
        };
        assert!(SmtpEmailTransport::from_config(&config).unwrap().is_some());
    }

    // Plain #[test]: no runtime is around to drop a pooled mailer
    #[test]
    fn test_bad_from_address_is_config_error() {
        let config = EmailConfig {
            user: Some("u".to_string()),
            password: Some("p".to_string()),
            from: "not an address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SmtpEmailTransport::from_config(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
