//! Archive / reply / delete for a matched message.
//!
//! Each step is toggled independently and fails independently: a failed
//! archive write does not stop the reply, and a failed reply does not stop
//! the delete. The returned [`ActionOutcome`] records what happened to each.

use tracing::debug;

use crate::archive::{Archive, ArchivedEmailRecord};
use crate::channels::session::{MailSession, OutgoingReply, ReplySender};
use crate::config::{PollConfig, ReplyTemplates};
use crate::error::SessionError;
use crate::pipeline::types::{ActionOutcome, FetchedMessage, StepOutcome};
use crate::report::Reporter;

/// Which actions run for a matched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionToggles {
    pub archive: bool,
    pub reply: bool,
    pub delete: bool,
}

impl From<&PollConfig> for ActionToggles {
    fn from(config: &PollConfig) -> Self {
        Self {
            archive: config.save_archive,
            reply: config.also_reply_to_email,
            delete: config.block_emails,
        }
    }
}

/// Applies the configured actions to matched messages.
pub struct ActionDispatcher<'a> {
    toggles: ActionToggles,
    archive: &'a Archive,
    sender: &'a dyn ReplySender,
    templates: &'a ReplyTemplates,
    reporter: &'a dyn Reporter,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(
        toggles: ActionToggles,
        archive: &'a Archive,
        sender: &'a dyn ReplySender,
        templates: &'a ReplyTemplates,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            toggles,
            archive,
            sender,
            templates,
            reporter,
        }
    }

    /// Run every enabled action on `message`, in order archive, reply, delete.
    pub fn dispatch(&self, session: &mut dyn MailSession, message: &FetchedMessage) -> ActionOutcome {
        let archive = if self.toggles.archive {
            self.archive_message(message)
        } else {
            StepOutcome::Skipped
        };

        let reply = if self.toggles.reply {
            self.send_reply(message)
        } else {
            StepOutcome::Skipped
        };

        let delete = if self.toggles.delete {
            self.delete_message(session, message)
        } else {
            StepOutcome::Skipped
        };

        ActionOutcome {
            archive,
            reply,
            delete,
        }
    }

    fn archive_message(&self, message: &FetchedMessage) -> StepOutcome {
        let record = ArchivedEmailRecord::from_message(message);
        match self.archive.write(&record) {
            Ok(path) => {
                self.reporter
                    .action_done(&message.id, "archive", &format!("Archived to {}", path.display()));
                StepOutcome::Done
            }
            Err(e) => self.failed(&message.id, "archive", e),
        }
    }

    fn send_reply(&self, message: &FetchedMessage) -> StepOutcome {
        let reply = build_reply(self.templates, message);
        match self.sender.send(&reply) {
            Ok(()) => {
                self.reporter
                    .action_done(&message.id, "reply", &format!("Email replied to: {}", reply.to));
                StepOutcome::Done
            }
            Err(e) => self.failed(&message.id, "reply", e),
        }
    }

    fn delete_message(&self, session: &mut dyn MailSession, message: &FetchedMessage) -> StepOutcome {
        // Expunge right away so no flagged-but-present message outlives the cycle.
        let result: Result<(), SessionError> = session
            .mark_deleted(&message.id)
            .and_then(|()| session.expunge());
        match result {
            Ok(()) => {
                self.reporter
                    .action_done(&message.id, "delete", "Original email deleted");
                StepOutcome::Done
            }
            Err(e) => self.failed(&message.id, "delete", e),
        }
    }

    fn failed(&self, id: &str, step: &str, error: impl std::fmt::Display) -> StepOutcome {
        let reason = error.to_string();
        debug!(id, step, "Dispatch step failed");
        self.reporter.action_failed(id, step, &reason);
        StepOutcome::Failed(reason)
    }
}

/// Attribution plus the original body, each line prefixed with `> `.
pub fn quote_original(message: &FetchedMessage) -> String {
    let attribution = format!(
        "On {}, {} wrote:",
        message.date.format("%b %d, %Y, at %I:%M %p"),
        message.sender
    );
    let mut quoted = format!("> {attribution}\n> \n");
    for line in message.body.lines() {
        quoted.push_str("> ");
        quoted.push_str(line);
        quoted.push('\n');
    }
    quoted
}

/// The reply for `message`: template text, then the quoted original.
pub fn build_reply(templates: &ReplyTemplates, message: &FetchedMessage) -> OutgoingReply {
    OutgoingReply {
        to: message.reply_address.clone(),
        subject: format!("Re: {}", message.subject),
        plain: format!("{}\n\n\n{}", templates.plain, quote_original(message)),
        html: templates.html.clone(),
    }
}
