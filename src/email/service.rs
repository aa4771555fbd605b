use log::info;

use crate::email::config::RelayConfig;
use crate::email::message::Message;
use crate::email::smtp;
use crate::email::template::{DEFAULT_APP_NAME, VerificationEmail};
use crate::email::transport::{self, RelayMode};
use crate::utils::error::MailError;

/// Email service delivering HTML mail through one configured relay.
///
/// Every send opens its own connection and closes it before returning, so a
/// service can be shared across tasks without coordination.
#[derive(Debug, Clone)]
pub struct EmailService {
    config: RelayConfig,
    app_name: String,
}

impl EmailService {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }

    /// Set the product name shown in verification emails
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn mode(&self) -> RelayMode {
        RelayMode::for_port(self.config.relay_port)
    }

    /// Deliver one message. No retries are attempted.
    pub async fn send(&self, message: &Message) -> Result<(), MailError> {
        let payload = message.compose(&self.config.sender_address);

        match self.mode() {
            RelayMode::ImplicitTls => {
                self.send_implicit_tls(&message.recipient, payload.as_bytes())
                    .await?
            }
            RelayMode::StartTls => {
                transport::send_starttls(&self.config, &message.recipient, payload.as_bytes())
                    .await?
            }
        }

        info!(
            "Email sent to {} via {} ({:?})",
            message.recipient,
            self.config.relay_addr(),
            self.mode()
        );
        Ok(())
    }

    async fn send_implicit_tls(&self, recipient: &str, payload: &[u8]) -> Result<(), MailError> {
        let stream =
            transport::connect_implicit_tls(&self.config.relay_host, self.config.relay_port)
                .await
                .map_err(MailError::Connect)?;

        smtp::deliver(stream, &self.config, recipient, payload).await
    }

    /// Send a verification email with the given code
    pub async fn send_verification_email(
        &self,
        to_email: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        let email = VerificationEmail::new(&self.app_name, username, code);
        let message = Message::new(to_email, email.subject(), email.render_html());

        self.send(&message).await
    }
}
