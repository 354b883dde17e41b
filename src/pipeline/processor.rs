//! One poll cycle over an open mail session.
//!
//! 1. Select the configured folder
//! 2. Search with the `OR FROM` expression built from the blocklist
//! 3. Walk the hits newest first, capped at `max_search_results`
//! 4. Fetch each sender header and check it against the blocklist
//! 5. Fetch subject/date/body for matches only and dispatch actions
//! 6. Close the folder and log out, whatever happened above

use chrono::Local;
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::channels::session::{MailSession, ReplySender};
use crate::config::{PollConfig, ReplyTemplates};
use crate::error::{Error, SessionError};
use crate::pipeline::decode::decode;
use crate::pipeline::dispatch::{ActionDispatcher, ActionToggles};
use crate::pipeline::query::sender_query;
use crate::pipeline::rules::matching_entry;
use crate::pipeline::types::{
    CandidateMessage, FetchedMessage, MatchReport, PollResult, header_value, parse_date,
    reply_address,
};
use crate::report::Reporter;

/// A single pass over the mailbox with one config snapshot.
pub struct PollCycle<'a> {
    config: &'a PollConfig,
    templates: &'a ReplyTemplates,
    sender: &'a dyn ReplySender,
    reporter: &'a dyn Reporter,
}

impl<'a> PollCycle<'a> {
    pub fn new(
        config: &'a PollConfig,
        templates: &'a ReplyTemplates,
        sender: &'a dyn ReplySender,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            config,
            templates,
            sender,
            reporter,
        }
    }

    /// Run the cycle, then close and log out of `session`.
    pub fn run(&self, session: &mut dyn MailSession) -> Result<PollResult, Error> {
        self.reporter.cycle_started(&self.config.search_mail_folder);

        let result = self.process(session);

        let selected = !matches!(result, Err(Error::Session(SessionError::FolderNotFound(_))));
        if selected && let Err(e) = session.close() {
            warn!(error = %e, "Failed to close mailbox");
        }
        if let Err(e) = session.logout() {
            warn!(error = %e, "Failed to log out");
        }

        result
    }

    fn process(&self, session: &mut dyn MailSession) -> Result<PollResult, Error> {
        session.select(&self.config.search_mail_folder)?;

        let query = sender_query(&self.config.blacklist)?;
        debug!(query = %query, "Searching");
        let mut ids = session.search(&query)?;

        let mut result = PollResult {
            found: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            self.reporter.no_candidates();
            return Ok(result);
        }

        // Newest first. Expunging a message only renumbers higher ids, so the
        // ids still queued stay valid.
        ids.reverse();
        ids.truncate(self.config.max_search_results);

        let archive = Archive::new(&self.config.archive_dir);
        let dispatcher = ActionDispatcher::new(
            ActionToggles::from(self.config),
            &archive,
            self.sender,
            self.templates,
            self.reporter,
        );

        for id in ids {
            let raw_from = session.fetch_header(&id, "From")?;
            let candidate = CandidateMessage {
                sender: header_value(&raw_from, "From"),
                id,
            };
            result.evaluated += 1;
            self.reporter.candidate(&candidate.id, &candidate.sender);

            let Some(entry) = matching_entry(&candidate.sender, &self.config.blacklist) else {
                continue;
            };
            self.reporter.blocked(&candidate.id, &candidate.sender, entry);

            let message = fetch_message(session, candidate, &raw_from)?;
            let outcome = dispatcher.dispatch(session, &message);
            result.matched.push(MatchReport {
                id: message.id,
                sender: message.sender,
                outcome,
            });
        }

        Ok(result)
    }
}

/// Fetch and decode the fields the dispatcher needs.
fn fetch_message(
    session: &mut dyn MailSession,
    candidate: CandidateMessage,
    raw_from: &str,
) -> Result<FetchedMessage, SessionError> {
    let id = candidate.id.as_str();
    let body = decode(&session.fetch_body(id)?);
    let subject = decode(&header_value(&session.fetch_header(id, "Subject")?, "Subject"));
    let raw_date = header_value(&session.fetch_header(id, "Date")?, "Date");

    let date = parse_date(&raw_date).unwrap_or_else(|| {
        warn!(id, date = %raw_date, "Unparseable Date header, using current time");
        Local::now().fixed_offset()
    });

    Ok(FetchedMessage {
        reply_address: reply_address(raw_from),
        id: candidate.id,
        sender: candidate.sender,
        subject,
        date,
        body,
    })
}
