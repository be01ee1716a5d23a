//! Error types for Kindle Relay.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::classifier::supported_extensions;
use crate::pipeline::types::DeliveryOutcome;

/// Error returned for one upload.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Ingestion / reply channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send reply on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to stage upload {file_name}: {source}")]
    Staging {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid upload file name: {0:?}")]
    InvalidFileName(String),
}

/// Failures of the external conversion tool.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion failed ({status}){}", fmt_detail(.detail))]
    Failed { status: String, detail: String },

    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),
}

fn fmt_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// Failures of the delivery engine as a whole.
///
/// Per-recipient send failures are not errors here; they are recorded in
/// [`DeliveryOutcome`] and only surface as [`DeliveryError::AllFailed`] when no
/// recipient received the document.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mail relay connection failed: {0}")]
    Connection(String),

    #[error("Failed to send to all recipients")]
    AllFailed { outcomes: Vec<DeliveryOutcome> },
}

/// Terminal failure of one job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unsupported file format: {file_name}")]
    UnsupportedFormat { file_name: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Mail relay connection failed: {0}")]
    DeliveryConnection(String),

    #[error("Failed to send to all recipients")]
    AllDeliveriesFailed { outcomes: Vec<DeliveryOutcome> },

    #[error("Failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<DeliveryError> for JobError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Attachment { path, source } => Self::Attachment { path, source },
            DeliveryError::Connection(reason) => Self::DeliveryConnection(reason),
            DeliveryError::AllFailed { outcomes } => Self::AllDeliveriesFailed { outcomes },
        }
    }
}

impl JobError {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Conversion(_) => "conversion",
            Self::DeliveryConnection(_) => "delivery_connection",
            Self::AllDeliveriesFailed { .. } => "all_deliveries_failed",
            Self::Attachment { .. } => "attachment",
        }
    }

    /// Final text shown to the submitter of `file_name`.
    pub fn user_message(&self, file_name: &str) -> String {
        match self {
            Self::UnsupportedFormat { .. } => format!(
                "❌ Unsupported file format. Please send an ebook file ({})",
                supported_extensions()
            ),
            Self::AllDeliveriesFailed { outcomes } => std::iter::once(format!("📚 '{file_name}'"))
                .chain(outcomes.iter().map(|o| o.render()))
                .chain(std::iter::once(format!("❌ Failed to process: {self}")))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => format!("❌ Failed to process: {self}"),
        }
    }

    /// Per-recipient outcomes carried by the error, if delivery got that far.
    pub fn outcomes(&self) -> Option<&[DeliveryOutcome]> {
        match self {
            Self::AllDeliveriesFailed { outcomes } => Some(outcomes),
            _ => None,
        }
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
