//! Configuration types.
//!
//! Everything is read once at startup into a [`RelayConfig`] and shared
//! read-only afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use lettre::message::Mailbox;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::types::Recipient;

/// Subject line used for every outbound message.
pub const DEFAULT_SUBJECT: &str = "New book for your Kindle";

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain connect, then upgrade with STARTTLS (port 587).
    StartTls,
    /// TLS from the first byte (port 465).
    Implicit,
    /// No encryption. Only for local test relays.
    Plain,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(Self::StartTls),
            "tls" => Ok(Self::Implicit),
            "none" => Ok(Self::Plain),
            other => Err(format!("expected starttls, tls or none, got {other:?}")),
        }
    }
}

/// Mail relay connection settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    /// Socket timeout applied to every command of the session.
    pub timeout: Duration,
    pub username: String,
    pub password: SecretString,
}

/// External conversion tool settings.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub program: String,
    pub output_profile: String,
    pub prefer_metadata_cover: bool,
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "ebook-convert".to_string(),
            output_profile: "kindle".to_string(),
            prefer_metadata_cover: true,
            timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Process-wide relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub smtp: SmtpConfig,
    pub sender: Mailbox,
    pub subject: String,
    /// Delivery order is the order given here.
    pub recipients: Vec<Recipient>,
    pub converter: ConverterConfig,
    /// Root under which each job gets its own staging directory.
    pub work_dir: PathBuf,
}

impl RelayConfig {
    /// Build config from `KINDLE_RELAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (environment, fixture map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let sender_raw = require("KINDLE_RELAY_SENDER")?;
        let sender: Mailbox = sender_raw
            .parse()
            .map_err(|e| invalid("KINDLE_RELAY_SENDER", format!("{e}")))?;

        let smtp = SmtpConfig {
            host: get("KINDLE_RELAY_SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: parse_or("KINDLE_RELAY_SMTP_PORT", get("KINDLE_RELAY_SMTP_PORT"), 587)?,
            tls: parse_or(
                "KINDLE_RELAY_SMTP_TLS",
                get("KINDLE_RELAY_SMTP_TLS"),
                TlsMode::StartTls,
            )?,
            timeout: Duration::from_secs(parse_or(
                "KINDLE_RELAY_SMTP_TIMEOUT_SECS",
                get("KINDLE_RELAY_SMTP_TIMEOUT_SECS"),
                30,
            )?),
            username: get("KINDLE_RELAY_SMTP_USERNAME").unwrap_or_else(|| sender.email.to_string()),
            password: SecretString::from(require("KINDLE_RELAY_SMTP_PASSWORD")?),
        };

        let recipients = parse_recipients(&require("KINDLE_RELAY_RECIPIENTS")?);
        if recipients.is_empty() {
            return Err(invalid(
                "KINDLE_RELAY_RECIPIENTS",
                "at least one recipient address is required",
            ));
        }

        let defaults = ConverterConfig::default();
        let converter = ConverterConfig {
            program: get("KINDLE_RELAY_CONVERTER").unwrap_or(defaults.program),
            output_profile: get("KINDLE_RELAY_OUTPUT_PROFILE").unwrap_or(defaults.output_profile),
            prefer_metadata_cover: defaults.prefer_metadata_cover,
            timeout: Duration::from_secs(parse_or(
                "KINDLE_RELAY_CONVERT_TIMEOUT_SECS",
                get("KINDLE_RELAY_CONVERT_TIMEOUT_SECS"),
                defaults.timeout.as_secs(),
            )?),
        };

        let work_dir = get("KINDLE_RELAY_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("kindle-relay"));

        Ok(Self {
            smtp,
            sender,
            subject: get("KINDLE_RELAY_SUBJECT").unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            recipients,
            converter,
            work_dir,
        })
    }
}

/// Split a comma-separated address list, keeping order and dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<Recipient> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Recipient::new)
        .collect()
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
