//! Outbound replies via SMTP (lettre).

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::channels::session::{OutgoingReply, ReplySender};
use crate::config::PollConfig;
use crate::error::DeliveryError;

/// Port that expects TLS from the first byte; everything else upgrades with STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP sender authenticated as the mailbox owner.
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
}

impl SmtpMailer {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(
            config.smtp_address.clone(),
            config.smtp_port,
            config.username.clone(),
            SecretString::from(config.password.expose_secret().to_string()),
        )
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&self.host)
        } else {
            SmtpTransport::starttls_relay(&self.host)
        }
        .map_err(|e| DeliveryError::Relay(e.to_string()))?;

        let creds = Credentials::new(
            self.username.clone(),
            self.password.expose_secret().to_string(),
        );
        Ok(builder.port(self.port).credentials(creds).build())
    }
}

/// Build the multipart/alternative message for `reply`.
pub fn build_message(from: &str, reply: &OutgoingReply) -> Result<Message, DeliveryError> {
    let parse = |address: &str| {
        address
            .parse::<Mailbox>()
            .map_err(|e| DeliveryError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    };

    let mut body = MultiPart::alternative().singlepart(SinglePart::plain(reply.plain.clone()));
    if let Some(html) = &reply.html {
        body = body.singlepart(SinglePart::html(html.clone()));
    }

    Message::builder()
        .from(parse(from)?)
        .to(parse(&reply.to)?)
        .subject(reply.subject.clone())
        .multipart(body)
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

impl ReplySender for SmtpMailer {
    fn send(&self, reply: &OutgoingReply) -> Result<(), DeliveryError> {
        let email = build_message(&self.username, reply)?;
        self.transport()?
            .send(&email)
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;
        info!(to = %reply.to, "Reply sent");
        Ok(())
    }
}
