//! Plain-text archive of blocked messages.
//!
//! One file per archived message, named after the message date with second
//! resolution: `<dir>/email-YYYY-MM-DD HH.MM.SS.txt`. Records are written
//! once and never updated. A second message from the same second gets
//! `email-YYYY-MM-DD HH.MM.SS-1.txt`, and so on.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};

use crate::error::ArchiveError;
use crate::pipeline::types::FetchedMessage;

/// One archived message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedEmailRecord {
    pub date: DateTime<FixedOffset>,
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl ArchivedEmailRecord {
    pub fn from_message(message: &FetchedMessage) -> Self {
        Self {
            date: message.date,
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        self.numbered_file_name(0)
    }

    /// `file_name` with a `-N` suffix for the N-th record sharing a timestamp.
    fn numbered_file_name(&self, n: u32) -> String {
        let stamp = self.date.format("%Y-%m-%d %H.%M.%S");
        if n == 0 {
            format!("email-{stamp}.txt")
        } else {
            format!("email-{stamp}-{n}.txt")
        }
    }

    /// Date line, `From:`, `Subject:`, blank line, body.
    pub fn render(&self) -> String {
        format!(
            "{}\nFrom: {}\nSubject: {}\n\n{}",
            self.date.format("%Y-%m-%d %H:%M:%S"),
            self.sender,
            self.subject,
            self.body
        )
    }
}

/// Directory-backed archive.
#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `record` to a fresh file, creating the directory if needed.
    ///
    /// Existing records are never overwritten. Returns the file path.
    pub fn write(&self, record: &ArchivedEmailRecord) -> Result<PathBuf, ArchiveError> {
        fs::create_dir_all(&self.dir).map_err(|source| ArchiveError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut n = 0;
        loop {
            let path = self.dir.join(record.numbered_file_name(n));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    n += 1;
                    continue;
                }
                Err(source) => return Err(ArchiveError::Write { path, source }),
            };
            return match file.write_all(record.render().as_bytes()) {
                Ok(()) => Ok(path),
                Err(source) => Err(ArchiveError::Write { path, source }),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ArchivedEmailRecord {
        ArchivedEmailRecord {
            date: DateTime::parse_from_rfc2822("Tue, 03 Jun 2025 14:05:09 +0000").unwrap(),
            sender: "Spam King <king@spam.com>".into(),
            subject: "Buy now".into(),
            body: "Cheap stuff\nToday only".into(),
        }
    }

    #[test]
    fn file_name_has_second_resolution() {
        assert_eq!(record().file_name(), "email-2025-06-03 14.05.09.txt");
    }

    #[test]
    fn render_layout() {
        assert_eq!(
            record().render(),
            "2025-06-03 14:05:09\nFrom: Spam King <king@spam.com>\nSubject: Buy now\n\nCheap stuff\nToday only"
        );
    }

    #[test]
    fn write_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = Archive::new(tmp.path().join("emails"));
        let path = archive.write(&record()).unwrap();
        assert_eq!(path, tmp.path().join("emails").join("email-2025-06-03 14.05.09.txt"));
        assert!(fs::read_to_string(path).unwrap().ends_with("Today only"));
    }

    #[test]
    fn same_second_records_are_kept_side_by_side() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = Archive::new(tmp.path());
        let first = record();
        let second = ArchivedEmailRecord {
            body: "A different message".into(),
            ..record()
        };

        let first_path = archive.write(&first).unwrap();
        let second_path = archive.write(&second).unwrap();
        let third_path = archive.write(&second).unwrap();

        assert_ne!(first_path, second_path);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 3);
        assert_eq!(fs::read_to_string(&first_path).unwrap(), first.render());
        assert_eq!(fs::read_to_string(&second_path).unwrap(), second.render());
        assert!(second_path.ends_with("email-2025-06-03 14.05.09-1.txt"));
        assert!(third_path.ends_with("email-2025-06-03 14.05.09-2.txt"));
    }

    #[test]
    fn write_fails_when_directory_cannot_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();
        let archive = Archive::new(blocker.join("emails"));
        assert!(matches!(archive.write(&record()), Err(ArchiveError::CreateDir { .. })));
    }
}
