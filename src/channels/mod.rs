//! Mail transport: IMAP for the inbound session, SMTP for replies.

pub mod imap;
pub mod session;
pub mod smtp;

pub use imap::ImapSession;
pub use session::{MailSession, MailTransport, OutgoingReply, ReplySender};
pub use smtp::SmtpMailer;

use crate::config::PollConfig;
use crate::error::SessionError;

/// Production transport: IMAP over TLS plus SMTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapSmtpTransport;

impl MailTransport for ImapSmtpTransport {
    fn open_session(&self, config: &PollConfig) -> Result<Box<dyn MailSession>, SessionError> {
        let mut session = ImapSession::connect(&config.imap_address, config.imap_port)?;
        session.login(&config.username, &config.password)?;
        Ok(Box::new(session))
    }

    fn reply_sender(&self, config: &PollConfig) -> Box<dyn ReplySender> {
        Box::new(SmtpMailer::from_config(config))
    }
}
