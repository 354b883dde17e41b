//! Operator-facing status reporting.
//!
//! The poll cycle and scheduler report through [`Reporter`] instead of
//! printing, so the core has no terminal dependency.

use std::io::{self, BufRead, Write};

use chrono::Local;
use tracing::{error, info, warn};

/// Status sink for the poll loop.
pub trait Reporter: Send + Sync {
    fn cycle_started(&self, folder: &str);

    fn no_candidates(&self);

    /// A candidate's sender was fetched.
    fn candidate(&self, id: &str, sender: &str);

    /// `entry` is the blocklist fragment that matched.
    fn blocked(&self, id: &str, sender: &str, entry: &str);

    fn action_done(&self, id: &str, step: &str, detail: &str);

    fn action_failed(&self, id: &str, step: &str, reason: &str);

    /// A cycle was abandoned; the loop keeps going.
    fn cycle_skipped(&self, reason: &str);

    fn sleeping(&self, secs: u64);

    /// Ask for a replacement folder name. `None` skips the cycle.
    fn prompt_folder(&self, missing: &str) -> Option<String>;
}

/// Reports through tracing and prompts on stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn cycle_started(&self, folder: &str) {
        info!("-> {} Checking emails in \"{folder}\"", Local::now().format("%H:%M"));
    }

    fn no_candidates(&self) {
        info!("No new emails");
    }

    fn candidate(&self, id: &str, sender: &str) {
        info!("{id}: {sender}");
    }

    fn blocked(&self, id: &str, sender: &str, entry: &str) {
        warn!(id, entry, "-> Blocked email found from {sender}");
    }

    fn action_done(&self, id: &str, step: &str, detail: &str) {
        info!(id, step, "{detail}");
    }

    fn action_failed(&self, id: &str, step: &str, reason: &str) {
        error!(id, step, "Action failed: {reason}");
    }

    fn cycle_skipped(&self, reason: &str) {
        error!("Cycle skipped: {reason}");
    }

    fn sleeping(&self, secs: u64) {
        info!("Sleeping for {} minutes and {} seconds", secs / 60, secs % 60);
    }

    fn prompt_folder(&self, missing: &str) -> Option<String> {
        error!("The mailbox \"{missing}\" does not exist.");
        eprint!("Please enter a valid mailbox: ");
        io::stderr().flush().ok()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let folder = line.trim();
        (!folder.is_empty()).then(|| folder.to_string())
    }
}
