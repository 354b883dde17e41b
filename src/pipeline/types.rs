//! Shared pipeline types: candidate and fetched messages, per-action outcomes.

use chrono::{DateTime, FixedOffset};
use mail_parser::MessageParser;

/// A search hit: server-side id plus the sender header, nothing else fetched.
///
/// Ids are only meaningful within the cycle that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMessage {
    pub id: String,
    /// `From` header value as sent, display name included.
    pub sender: String,
}

/// A matched message with every field the dispatcher needs.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub id: String,
    /// `From` header value as sent.
    pub sender: String,
    /// Bare address replies go to.
    pub reply_address: String,
    /// Decoded subject.
    pub subject: String,
    pub date: DateTime<FixedOffset>,
    /// Decoded first body part.
    pub body: String,
}

/// What happened to one configured action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Disabled in config.
    Skipped,
    Done,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Per-step results of dispatching one matched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub archive: StepOutcome,
    pub reply: StepOutcome,
    pub delete: StepOutcome,
}

impl ActionOutcome {
    /// `(step, reason)` for every step that failed.
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        [
            ("archive", &self.archive),
            ("reply", &self.reply),
            ("delete", &self.delete),
        ]
        .into_iter()
        .filter_map(|(step, outcome)| match outcome {
            StepOutcome::Failed(reason) => Some((step, reason.as_str())),
            _ => None,
        })
        .collect()
    }

    pub fn is_clean(&self) -> bool {
        !(self.archive.is_failed() || self.reply.is_failed() || self.delete.is_failed())
    }
}

/// A matched message and what was done with it.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub id: String,
    pub sender: String,
    pub outcome: ActionOutcome,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct PollResult {
    /// Ids returned by the search.
    pub found: usize,
    /// Candidates whose sender was fetched and checked.
    pub evaluated: usize,
    pub matched: Vec<MatchReport>,
}

// ── Header helpers ──────────────────────────────────────────────────

/// Value of header `name` in a raw header block, with folded lines joined.
///
/// Falls back to the whole block, trimmed, when the header line is absent.
pub fn header_value(raw: &str, name: &str) -> String {
    let mut unfolded: Vec<String> = Vec::new();
    for line in raw.lines() {
        if line.starts_with([' ', '\t'])
            && let Some(last) = unfolded.last_mut()
        {
            last.push(' ');
            last.push_str(line.trim());
            continue;
        }
        unfolded.push(line.to_string());
    }

    unfolded
        .iter()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim().to_string())
        })
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Parse a `Date` header value, ignoring a trailing comment like ` (UTC)`.
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let mut value = value.trim();
    if value.ends_with(')')
        && let Some(pos) = value.rfind(" (")
    {
        value = value[..pos].trim_end();
    }
    DateTime::parse_from_rfc2822(value).ok()
}

/// Bare address from a raw `From` header block, or the header text itself.
pub fn reply_address(raw_from_block: &str) -> String {
    let mut block = raw_from_block.trim_end().to_string();
    block.push_str("\r\n\r\n");
    MessageParser::default()
        .parse(block.as_bytes())
        .and_then(|parsed| {
            parsed
                .from()
                .and_then(|addr| addr.first())
                .and_then(|a| a.address())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| header_value(raw_from_block, "From"))
}
