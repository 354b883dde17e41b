//! blockbot: polls a mailbox and deals with mail from blocked senders.

pub mod archive;
pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod scheduler;
