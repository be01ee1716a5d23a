//! Shared types for the ingestion → conversion → delivery pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Formats ─────────────────────────────────────────────────────────

/// Document formats the relay accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Epub,
    Mobi,
    Pdf,
    Txt,
    Doc,
    Docx,
}

impl DocumentFormat {
    /// Every accepted format, target first.
    pub const ALL: [DocumentFormat; 6] = [
        Self::Epub,
        Self::Mobi,
        Self::Pdf,
        Self::Txt,
        Self::Doc,
        Self::Docx,
    ];

    /// The format every delivered document is in.
    pub const TARGET: DocumentFormat = Self::Epub;

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Doc => "doc",
            Self::Docx => "docx",
        }
    }

    /// Match an extension (no dot), ignoring case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

// ── Artifacts ───────────────────────────────────────────────────────

/// An uploaded document staged on local storage.
///
/// Owned by the orchestrator for one job; its file is deleted when the job
/// ends, whatever the outcome.
#[derive(Debug, Clone)]
pub struct IncomingDocument {
    pub file_name: String,
    pub local_path: PathBuf,
}

impl IncomingDocument {
    pub fn new(file_name: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.into(),
            local_path: local_path.into(),
        }
    }
}

/// Output of a successful conversion. Always in [`DocumentFormat::TARGET`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionArtifact {
    pub path: PathBuf,
    pub format: DocumentFormat,
}

// ── Recipients & outcomes ───────────────────────────────────────────

/// A configured downstream mail address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient {
    pub address: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Result of handing the document to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub recipient: Recipient,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(recipient: Recipient) -> Self {
        Self {
            recipient,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(recipient: Recipient, detail: impl Into<String>) -> Self {
        Self {
            recipient,
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }

    /// One status line for the submitter.
    pub fn render(&self) -> String {
        match (&self.succeeded, &self.error_detail) {
            (true, _) => format!("✅ Sent to {}", self.recipient),
            (false, Some(detail)) => format!("❌ Failed to send to {}: {detail}", self.recipient),
            (false, None) => format!("❌ Failed to send to {}", self.recipient),
        }
    }
}

// ── Job state & report ──────────────────────────────────────────────

/// Lifecycle of one job. `CleanedUp` is terminal and reached on every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Classified,
    Converting,
    Converted,
    Delivering,
    Delivered,
    PartiallyDelivered,
    Failed,
    CleanedUp,
}

impl JobState {
    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Converting => "converting",
            Self::Converted => "converted",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::PartiallyDelivered => "partially_delivered",
            Self::Failed => "failed",
            Self::CleanedUp => "cleaned_up",
        }
    }
}

/// Per-recipient outcomes of a job that delivered to at least one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub file_name: String,
    /// One entry per configured recipient, in configured order.
    pub outcomes: Vec<DeliveryOutcome>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// `Delivered` when every recipient succeeded, else `PartiallyDelivered`.
    pub fn state(&self) -> JobState {
        if self.outcomes.iter().all(|o| o.succeeded) {
            JobState::Delivered
        } else {
            JobState::PartiallyDelivered
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    /// Human-readable summary: a header line plus one line per recipient.
    pub fn render(&self) -> String {
        std::iter::once(format!("📚 '{}'", self.file_name))
            .chain(self.outcomes.iter().map(DeliveryOutcome::render))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
