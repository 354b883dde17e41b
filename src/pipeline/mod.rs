//! Poll pipeline: query → match → fetch → dispatch.

pub mod decode;
pub mod dispatch;
pub mod processor;
pub mod query;
pub mod rules;
pub mod types;

pub use dispatch::{ActionDispatcher, ActionToggles};
pub use processor::PollCycle;
pub use types::{ActionOutcome, CandidateMessage, FetchedMessage, PollResult, StepOutcome};
