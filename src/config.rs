//! Configuration types.
//!
//! The persisted record is a JSON document edited by the operator (or the
//! setup flow). It is re-read at the start of every poll cycle, so each cycle
//! works on a fresh, immutable [`PollConfig`] snapshot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Environment variable overriding the config document location.
pub const CONFIG_PATH_ENV: &str = "BLOCKBOT_CONFIG";

/// Default config document location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Reply text used when no plain template exists yet.
pub const DEFAULT_PLAIN_TEMPLATE: &str = "Email could not be delivered.";

const PLAIN_TEMPLATE_FILE: &str = "plain_template.txt";
const HTML_TEMPLATE_FILE: &str = "fancy_template.html";

/// Settings snapshot for one poll cycle.
#[derive(Debug, Deserialize)]
pub struct PollConfig {
    /// Mailbox folder searched for blocked senders.
    #[serde(default = "default_folder")]
    pub search_mail_folder: String,
    /// How many of the most recent matches are examined per cycle.
    #[serde(default = "default_max_results")]
    pub max_search_results: usize,
    /// Minutes between cycles. Divisors of 60 align to wall-clock marks.
    #[serde(default = "default_interval")]
    pub update_interval: u32,
    #[serde(default = "default_true")]
    pub also_reply_to_email: bool,
    #[serde(default = "default_true")]
    pub save_archive: bool,
    /// Permanently delete matched messages.
    #[serde(default = "default_true")]
    pub block_emails: bool,
    #[serde(default)]
    pub username: String,
    #[serde(deserialize_with = "secret_from_str")]
    pub password: SecretString,
    #[serde(default)]
    pub imap_address: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default)]
    pub smtp_address: String,
    /// Accepts `587` or `"587"`.
    #[serde(default = "default_smtp_port", deserialize_with = "port_from_int_or_str")]
    pub smtp_port: u16,
    /// Sender fragments to block, matched by case-insensitive containment.
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

fn default_folder() -> String {
    "inbox".to_string()
}

fn default_max_results() -> usize {
    20
}

fn default_interval() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_imap_port() -> u16 {
    993
}

fn default_smtp_port() -> u16 {
    587
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("emails")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn secret_from_str<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn port_from_int_or_str<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Str(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Int(p) => Ok(p),
        Port::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("smtp_port must be a number, got {s:?}"))),
    }
}

impl PollConfig {
    /// Parse and validate a config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: PollConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the poll cycle cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blacklist.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "blacklist".into(),
                hint: "There's nothing in the blacklist. Add full addresses (johnny@gmail.com) \
                       or address fragments (@gmail, johnny)."
                    .into(),
            });
        }
        if let Some(position) = self.blacklist.iter().position(|b| b.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "blacklist".into(),
                message: format!("entry {position} is blank; remove it or fill it in"),
            });
        }
        for (key, value) in [
            ("username", &self.username),
            ("imap_address", &self.imap_address),
            ("smtp_address", &self.smtp_address),
            ("search_mail_folder", &self.search_mail_folder),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: key.into(),
                    hint: "Set it in the config file.".into(),
                });
            }
        }
        if !(1..=60).contains(&self.update_interval) {
            return Err(ConfigError::InvalidValue {
                key: "update_interval".into(),
                message: format!("must be between 1 and 60 minutes, got {}", self.update_interval),
            });
        }
        if self.max_search_results == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_search_results".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// The persisted config document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use `BLOCKBOT_CONFIG` if set, else `config/config.json`.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a fresh snapshot.
    pub fn load(&self) -> Result<PollConfig, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        PollConfig::from_json(&raw)
    }

    /// Persist a corrected folder name, leaving every other key as it was.
    pub fn set_search_folder(&self, folder: &str) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(&self.path)?;
        let mut doc: serde_json::Value = serde_json::from_str(&raw)?;
        let Some(map) = doc.as_object_mut() else {
            return Err(ConfigError::InvalidValue {
                key: "<root>".into(),
                message: "config document must be a JSON object".into(),
            });
        };
        map.insert("search_mail_folder".into(), serde_json::Value::String(folder.to_string()));
        fs::write(&self.path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }

    /// Write a starter document with defaults and placeholder credentials.
    pub fn write_template(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = serde_json::json!({
            "search_mail_folder": default_folder(),
            "max_search_results": default_max_results(),
            "update_interval": default_interval(),
            "also_reply_to_email": true,
            "save_archive": true,
            "block_emails": true,
            "username": "",
            "password": "",
            "imap_address": "",
            "imap_port": default_imap_port(),
            "smtp_address": "",
            "smtp_port": default_smtp_port(),
            "blacklist": [],
        });
        fs::write(&self.path, serde_json::to_string_pretty(&doc)?)?;
        Ok(())
    }
}

// ── Reply templates ─────────────────────────────────────────────────

/// Operator-editable reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTemplates {
    /// Prepended to the quoted original in the plain-text part.
    pub plain: String,
    /// Sent as the styled alternative part when present.
    pub html: Option<String>,
}

impl Default for ReplyTemplates {
    fn default() -> Self {
        Self {
            plain: DEFAULT_PLAIN_TEMPLATE.to_string(),
            html: None,
        }
    }
}

impl ReplyTemplates {
    /// Load templates from `dir`, creating the plain one with default text if missing.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let plain_path = dir.join(PLAIN_TEMPLATE_FILE);
        let plain = match fs::read_to_string(&plain_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(dir)?;
                fs::write(&plain_path, DEFAULT_PLAIN_TEMPLATE)?;
                DEFAULT_PLAIN_TEMPLATE.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        let html = match fs::read_to_string(dir.join(HTML_TEMPLATE_FILE)) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self { plain, html })
    }
}
