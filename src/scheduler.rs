//! Checkpoint-aligned poll loop.
//!
//! Every iteration re-reads the config store, runs one [`PollCycle`] on a
//! blocking thread, then sleeps until the next wall-clock checkpoint. With
//! `update_interval = 10` cycles land on :00, :10, :20 and so on. Intervals
//! that do not divide 60 fall back to the top of the next hour.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channels::session::MailTransport;
use crate::config::{ConfigStore, ReplyTemplates};
use crate::error::{Error, SessionError};
use crate::pipeline::processor::PollCycle;
use crate::pipeline::types::PollResult;
use crate::report::Reporter;

/// Seconds from `minute:second` until the next checkpoint for `interval` minutes.
pub fn checkpoint_sleep_secs(interval: u32, minute: u32, second: u32) -> u64 {
    let (minute, second) = (u64::from(minute), u64::from(second));
    let interval = u64::from(interval);

    if interval == 0 || 60 % interval != 0 {
        return (60 - minute) * 60 - second;
    }
    let next = (minute / interval + 1) * interval;
    (next - minute) * 60 - second
}

/// Sleep length from now until the next checkpoint.
pub fn sleep_until_checkpoint(interval: u32) -> Duration {
    let now = Local::now();
    Duration::from_secs(checkpoint_sleep_secs(interval, now.minute(), now.second()))
}

/// Drives poll cycles until shutdown.
pub struct Scheduler {
    store: ConfigStore,
    transport: Arc<dyn MailTransport>,
    reporter: Arc<dyn Reporter>,
}

impl Scheduler {
    pub fn new(store: ConfigStore, transport: Arc<dyn MailTransport>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            store,
            transport,
            reporter,
        }
    }

    /// Loop until `shutdown` turns true (or its sender is dropped).
    ///
    /// Returns `Err` only for fatal errors: bad config, unresolvable host,
    /// rejected credentials. Everything else skips the cycle.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        info!("Scheduler started, config at {}", self.store.path().display());

        loop {
            if *shutdown.borrow() {
                info!("Scheduler shutting down");
                return Ok(());
            }

            let config = self.store.load()?;
            let templates = ReplyTemplates::load(&config.templates_dir)?;
            let interval = config.update_interval;

            let transport = Arc::clone(&self.transport);
            let reporter = Arc::clone(&self.reporter);
            let cycle = tokio::task::spawn_blocking(move || -> Result<PollResult, Error> {
                let mut session = transport.open_session(&config)?;
                let sender = transport.reply_sender(&config);
                PollCycle::new(&config, &templates, sender.as_ref(), reporter.as_ref())
                    .run(session.as_mut())
            })
            .await;

            match cycle {
                Ok(Ok(result)) => log_result(&result),
                Ok(Err(Error::Session(SessionError::FolderNotFound(missing)))) => {
                    if self.correct_folder(&missing, &mut shutdown).await? {
                        continue;
                    }
                    if *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        return Ok(());
                    }
                }
                Ok(Err(e)) if e.is_fatal() => return Err(e),
                Ok(Err(e)) => self.reporter.cycle_skipped(&e.to_string()),
                Err(e) => self.reporter.cycle_skipped(&format!("poll task panicked: {e}")),
            }

            let sleep = sleep_until_checkpoint(interval);
            self.reporter.sleeping(sleep.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.changed() => {
                    info!("Scheduler shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Ask for a replacement folder and persist it. `true` means retry now.
    async fn correct_folder(
        &self,
        missing: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool, Error> {
        let reporter = Arc::clone(&self.reporter);
        let missing_owned = missing.to_string();
        let prompt = tokio::task::spawn_blocking(move || reporter.prompt_folder(&missing_owned));

        let answer = tokio::select! {
            answer = prompt => answer.unwrap_or_default(),
            _ = shutdown.changed() => return Ok(false),
        };

        let Some(folder) = answer else {
            self.reporter
                .cycle_skipped(&format!("Mailbox \"{missing}\" does not exist"));
            return Ok(false);
        };

        match self.store.set_search_folder(&folder) {
            Ok(()) => {
                info!(folder = %folder, "Saved corrected mailbox");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Could not save corrected mailbox");
                self.reporter.cycle_skipped(&e.to_string());
                Ok(false)
            }
        }
    }
}

fn log_result(result: &PollResult) {
    let failed = result
        .matched
        .iter()
        .filter(|m| !m.outcome.is_clean())
        .count();
    debug!(
        found = result.found,
        evaluated = result.evaluated,
        matched = result.matched.len(),
        failed,
        "Poll cycle complete"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::channels::session::{MailSession, OutgoingReply, ReplySender};
    use crate::config::PollConfig;
    use crate::error::DeliveryError;

    // ── Checkpoint alignment ────────────────────────────────────────

    #[test]
    fn ten_minute_interval_aligns_to_next_mark() {
        assert_eq!(checkpoint_sleep_secs(10, 7, 30), 150);
    }

    #[test]
    fn exactly_on_checkpoint_waits_full_interval() {
        assert_eq!(checkpoint_sleep_secs(10, 10, 0), 600);
        assert_eq!(checkpoint_sleep_secs(15, 0, 0), 900);
    }

    #[test]
    fn last_slot_rolls_to_top_of_hour() {
        assert_eq!(checkpoint_sleep_secs(10, 55, 0), 300);
        assert_eq!(checkpoint_sleep_secs(60, 42, 15), (60 - 42) * 60 - 15);
    }

    #[test]
    fn non_divisor_falls_back_to_next_hour() {
        assert_eq!(checkpoint_sleep_secs(7, 12, 30), (60 - 12) * 60 - 30);
        assert_eq!(checkpoint_sleep_secs(7, 0, 0), 3600);
    }

    #[test]
    fn one_minute_interval() {
        assert_eq!(checkpoint_sleep_secs(1, 59, 59), 1);
    }

    #[test]
    fn sleep_is_never_longer_than_an_hour() {
        for interval in 1..=60 {
            for minute in 0..60 {
                let secs = checkpoint_sleep_secs(interval, minute, 30);
                assert!(secs > 0 && secs <= 3600, "interval {interval} minute {minute}: {secs}");
            }
        }
    }

    // ── Loop behavior ───────────────────────────────────────────────

    struct FailingTransport {
        error: fn() -> SessionError,
        opens: AtomicUsize,
    }

    struct NullSender;

    impl ReplySender for NullSender {
        fn send(&self, _reply: &OutgoingReply) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    impl MailTransport for FailingTransport {
        fn open_session(&self, _config: &PollConfig) -> Result<Box<dyn MailSession>, SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }

        fn reply_sender(&self, _config: &PollConfig) -> Box<dyn ReplySender> {
            Box::new(NullSender)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Reporter for Recorder {
        fn cycle_started(&self, _folder: &str) {}
        fn no_candidates(&self) {}
        fn candidate(&self, _id: &str, _sender: &str) {}
        fn blocked(&self, _id: &str, _sender: &str, _entry: &str) {}
        fn action_done(&self, _id: &str, _step: &str, _detail: &str) {}
        fn action_failed(&self, _id: &str, _step: &str, _reason: &str) {}
        fn cycle_skipped(&self, reason: &str) {
            self.0.lock().unwrap().push(format!("skipped: {reason}"));
        }
        fn sleeping(&self, _secs: u64) {
            self.0.lock().unwrap().push("sleeping".into());
        }
        fn prompt_folder(&self, _missing: &str) -> Option<String> {
            None
        }
    }

    fn store_in(dir: &std::path::Path) -> ConfigStore {
        let path = dir.join("config.json");
        let doc = serde_json::json!({
            "username": "me@example.com",
            "password": "pw",
            "imap_address": "imap.example.com",
            "smtp_address": "smtp.example.com",
            "blacklist": ["spam.com"],
            "templates_dir": dir.join("templates"),
            "archive_dir": dir.join("emails"),
        });
        std::fs::write(&path, doc.to_string()).unwrap();
        ConfigStore::new(path)
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FailingTransport {
            error: || SessionError::AuthFailed {
                username: "me".into(),
            },
            opens: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(store_in(tmp.path()), transport, Arc::new(Recorder::default()));
        let (_tx, rx) = watch::channel(false);

        let err = scheduler.run_forever(rx).await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AuthFailed { .. })));
    }

    #[tokio::test]
    async fn timeout_skips_cycle_then_sleeps_until_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FailingTransport {
            error: || SessionError::Timeout("connect".into()),
            opens: AtomicUsize::new(0),
        });
        let reporter = Arc::new(Recorder::default());
        let scheduler = Scheduler::new(store_in(tmp.path()), transport.clone(), reporter.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run_forever(rx).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        let events = reporter.0.lock().unwrap();
        assert!(events[0].starts_with("skipped: ") && events[0].contains("Network timeout"));
        assert_eq!(events[1], "sleeping");
    }

    // ── Folder correction ───────────────────────────────────────────

    /// Sessions that only have an "Archive" folder, which is empty.
    struct ArchiveOnlyTransport {
        opens: AtomicUsize,
        selects: Arc<Mutex<Vec<String>>>,
    }

    struct ArchiveOnlySession {
        selects: Arc<Mutex<Vec<String>>>,
    }

    impl MailSession for ArchiveOnlySession {
        fn select(&mut self, folder: &str) -> Result<(), SessionError> {
            self.selects.lock().unwrap().push(folder.to_string());
            if folder == "Archive" {
                Ok(())
            } else {
                Err(SessionError::FolderNotFound(folder.to_string()))
            }
        }
        fn search(&mut self, _query: &str) -> Result<Vec<String>, SessionError> {
            Ok(Vec::new())
        }
        fn fetch_header(&mut self, _id: &str, _field: &str) -> Result<String, SessionError> {
            unreachable!("empty folder")
        }
        fn fetch_body(&mut self, _id: &str) -> Result<String, SessionError> {
            unreachable!("empty folder")
        }
        fn mark_deleted(&mut self, _id: &str) -> Result<(), SessionError> {
            Ok(())
        }
        fn expunge(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn logout(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    impl MailTransport for ArchiveOnlyTransport {
        fn open_session(&self, _config: &PollConfig) -> Result<Box<dyn MailSession>, SessionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ArchiveOnlySession {
                selects: Arc::clone(&self.selects),
            }))
        }

        fn reply_sender(&self, _config: &PollConfig) -> Box<dyn ReplySender> {
            Box::new(NullSender)
        }
    }

    /// Answers every folder prompt with "Archive".
    #[derive(Default)]
    struct AnswersArchive {
        prompts: Mutex<Vec<String>>,
        sleeps: AtomicUsize,
    }

    impl Reporter for AnswersArchive {
        fn cycle_started(&self, _folder: &str) {}
        fn no_candidates(&self) {}
        fn candidate(&self, _id: &str, _sender: &str) {}
        fn blocked(&self, _id: &str, _sender: &str, _entry: &str) {}
        fn action_done(&self, _id: &str, _step: &str, _detail: &str) {}
        fn action_failed(&self, _id: &str, _step: &str, _reason: &str) {}
        fn cycle_skipped(&self, _reason: &str) {}
        fn sleeping(&self, _secs: u64) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
        fn prompt_folder(&self, missing: &str) -> Option<String> {
            self.prompts.lock().unwrap().push(missing.to_string());
            Some("Archive".into())
        }
    }

    #[tokio::test]
    async fn missing_folder_is_corrected_saved_and_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path());
        let transport = Arc::new(ArchiveOnlyTransport {
            opens: AtomicUsize::new(0),
            selects: Arc::default(),
        });
        let reporter = Arc::new(AnswersArchive::default());
        let scheduler = Scheduler::new(store.clone(), transport.clone(), reporter.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run_forever(rx).await });
        // Wait for the retried cycle to finish and the loop to go to sleep
        for _ in 0..100 {
            if reporter.sleeps.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        assert_eq!(*reporter.prompts.lock().unwrap(), ["inbox"]);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert_eq!(*transport.selects.lock().unwrap(), ["inbox", "Archive"]);
        // Only one sleep: the retry happened within the same iteration
        assert_eq!(reporter.sleeps.load(Ordering::SeqCst), 1);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(saved["search_mail_folder"], "Archive");
        assert_eq!(saved["username"], "me@example.com");
        assert_eq!(store.load().unwrap().search_mail_folder, "Archive");
    }

    #[tokio::test]
    async fn missing_config_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FailingTransport {
            error: || SessionError::Timeout("unused".into()),
            opens: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(
            ConfigStore::new(tmp.path().join("absent.json")),
            transport,
            Arc::new(Recorder::default()),
        );
        let (_tx, rx) = watch::channel(false);

        let err = scheduler.run_forever(rx).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn shutdown_before_first_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FailingTransport {
            error: || SessionError::Timeout("unused".into()),
            opens: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(store_in(tmp.path()), transport.clone(), Arc::new(Recorder::default()));
        let (_tx, rx) = watch::channel(true);

        scheduler.run_forever(rx).await.unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 0);
    }
}
