//! Outbound email.
//!
//! Only the Reminder Dispatcher sends mail. Production uses SMTP via
//! `lettre`; without an SMTP host configured, messages are logged instead.

mod smtp;
mod templates;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

pub use smtp::SmtpMailer;
pub use templates::ReminderEmailContent;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message to every address in `to`.
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        tracing::info!(recipients = to.len(), %subject, body_len = body.len(), "mail (log only)");
        Ok(())
    }
}

/// SMTP when configured, otherwise the log-only mailer.
pub fn create_mailer(config: &Config) -> Result<Box<dyn Mailer>, MailError> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp, &config.mail_from)?;
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
            Ok(Box::new(mailer))
        }
        None => {
            tracing::info!("SMTP_HOST not set, reminder mail will only be logged");
            Ok(Box::new(LogMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer
            .send(&["a@example.com".to_string()], "Hi", "Body")
            .await
            .unwrap();
    }

    #[test]
    fn falls_back_to_log_mailer_without_smtp() {
        assert!(create_mailer(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_malformed_sender() {
        let config = Config {
            smtp: Some(SmtpConfig {
                host: "localhost".to_string(),
                port: 25,
                username: None,
                password: None,
                use_tls: false,
            }),
            mail_from: "not an address".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            create_mailer(&config),
            Err(MailError::InvalidConfig(_))
        ));
    }
}
