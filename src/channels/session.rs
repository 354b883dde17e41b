//! Capabilities the poll cycle calls into.
//!
//! The cycle never talks to a socket directly. It drives an inbound
//! [`MailSession`] and hands replies to a [`ReplySender`], so tests can
//! substitute in-memory fakes.

use crate::config::PollConfig;
use crate::error::{DeliveryError, SessionError};

/// An authenticated inbound mailbox session.
pub trait MailSession: Send {
    /// Select `folder`. A missing folder is `SessionError::FolderNotFound`.
    fn select(&mut self, folder: &str) -> Result<(), SessionError>;

    /// Run a search expression against the selected folder, oldest id first.
    fn search(&mut self, query: &str) -> Result<Vec<String>, SessionError>;

    /// Raw header block for one field, e.g. `"From: a@b.com\r\n\r\n"`.
    fn fetch_header(&mut self, id: &str, field: &str) -> Result<String, SessionError>;

    /// Raw text of the first body part.
    fn fetch_body(&mut self, id: &str) -> Result<String, SessionError>;

    /// Flag a message for removal.
    fn mark_deleted(&mut self, id: &str) -> Result<(), SessionError>;

    /// Remove every flagged message now.
    fn expunge(&mut self) -> Result<(), SessionError>;

    /// Leave the selected folder.
    fn close(&mut self) -> Result<(), SessionError>;

    fn logout(&mut self) -> Result<(), SessionError>;
}

/// A reply ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReply {
    pub to: String,
    pub subject: String,
    /// Always sent.
    pub plain: String,
    /// Styled alternative part.
    pub html: Option<String>,
}

/// Outbound delivery.
pub trait ReplySender: Send {
    fn send(&self, reply: &OutgoingReply) -> Result<(), DeliveryError>;
}

/// Opens fresh sessions and senders from a config snapshot, once per cycle.
pub trait MailTransport: Send + Sync {
    /// Connect and log in.
    fn open_session(&self, config: &PollConfig) -> Result<Box<dyn MailSession>, SessionError>;

    fn reply_sender(&self, config: &PollConfig) -> Box<dyn ReplySender>;
}
