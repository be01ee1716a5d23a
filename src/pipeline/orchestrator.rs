//! Job orchestrator — runs one uploaded document through the pipeline.
//!
//! Flow:
//! 1. Classify by extension → reject unsupported uploads
//! 2. Convert to EPUB unless already native
//! 3. Deliver to every configured recipient over one relay session
//! 4. Delete every artifact the job created, on every path

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::ReplyChannel;
use crate::config::RelayConfig;
use crate::error::JobError;
use crate::pipeline::classifier::{FormatClass, classify};
use crate::pipeline::converter::{Converter, EbookConvert};
use crate::pipeline::delivery::{DeliveryEngine, SmtpRelay};
use crate::pipeline::types::{IncomingDocument, JobReport, JobState, Recipient};

/// Progress line sent before conversion starts.
pub const CONVERTING_MESSAGE: &str = "📚 Converting your book to EPUB format...";

/// Progress line sent before delivery starts.
pub const SENDING_MESSAGE: &str = "📧 Sending to your Kindles...";

/// Sequences classifier → converter → delivery engine for one job at a time.
///
/// Holds no per-job state; one instance is shared by all concurrent jobs.
pub struct JobOrchestrator {
    converter: Arc<dyn Converter>,
    delivery: DeliveryEngine,
    recipients: Arc<[Recipient]>,
}

impl JobOrchestrator {
    pub fn new(
        converter: Arc<dyn Converter>,
        delivery: DeliveryEngine,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            converter,
            delivery,
            recipients: recipients.into(),
        }
    }

    /// Wire the production collaborators: `ebook-convert` and SMTP.
    pub fn from_config(config: &RelayConfig) -> Self {
        let converter = Arc::new(EbookConvert::new(&config.converter));
        let relay = Arc::new(SmtpRelay::new(config.smtp.clone()));
        let delivery = DeliveryEngine::new(relay, config.sender.clone(), config.subject.clone());
        Self::new(converter, delivery, config.recipients.clone())
    }

    /// Run one job to completion.
    ///
    /// Progress lines go to `reply`; reply failures are logged and ignored.
    /// The incoming file and any converted file are deleted before returning.
    pub async fn run_job(
        &self,
        document: IncomingDocument,
        reply: &dyn ReplyChannel,
    ) -> Result<JobReport, JobError> {
        let mut run = JobRun::new(&document);
        let mut artifacts = JobArtifacts::new(run.id);
        artifacts.track(document.local_path.clone());

        let result = self.execute(&mut run, &document, &mut artifacts, reply).await;

        match &result {
            Ok(report) => {
                run.advance(report.state());
                info!(
                    job_id = %run.id,
                    file = %document.file_name,
                    succeeded = report.succeeded(),
                    total = report.outcomes.len(),
                    "Job delivered"
                );
            }
            Err(e) => {
                run.advance(JobState::Failed);
                error!(job_id = %run.id, file = %document.file_name, kind = e.kind(), error = %e, "Job failed");
            }
        }

        artifacts.remove_all().await;
        run.advance(JobState::CleanedUp);
        result
    }

    async fn execute(
        &self,
        run: &mut JobRun,
        document: &IncomingDocument,
        artifacts: &mut JobArtifacts,
        reply: &dyn ReplyChannel,
    ) -> Result<JobReport, JobError> {
        let class = classify(&document.file_name);
        run.advance(JobState::Classified);

        let deliverable: PathBuf = match class {
            FormatClass::Unsupported => {
                return Err(JobError::UnsupportedFormat {
                    file_name: document.file_name.clone(),
                });
            }
            FormatClass::SupportedNative => document.local_path.clone(),
            FormatClass::SupportedConvertible(format) => {
                run.advance(JobState::Converting);
                debug!(job_id = %run.id, %format, "Conversion required");
                send_progress(reply, CONVERTING_MESSAGE).await;

                // Tracked up front so partial output is removed on failure too.
                artifacts.track(self.converter.output_path_for(&document.local_path));
                let artifact = self.converter.convert(&document.local_path).await?;
                artifacts.track(artifact.path.clone());
                run.advance(JobState::Converted);
                artifact.path
            }
        };

        run.advance(JobState::Delivering);
        send_progress(reply, SENDING_MESSAGE).await;
        let outcomes = self.delivery.deliver(&deliverable, &self.recipients).await?;

        Ok(JobReport {
            job_id: run.id,
            file_name: document.file_name.clone(),
            outcomes,
            finished_at: Utc::now(),
        })
    }
}

async fn send_progress(reply: &dyn ReplyChannel, text: &str) {
    if let Err(e) = reply.reply(text).await {
        warn!(channel = reply.name(), error = %e, "Failed to send progress reply");
    }
}

// ── Job bookkeeping ─────────────────────────────────────────────────

/// Current state of one job, logged on every transition.
struct JobRun {
    id: Uuid,
    state: JobState,
}

impl JobRun {
    fn new(document: &IncomingDocument) -> Self {
        let id = Uuid::new_v4();
        debug!(job_id = %id, file = %document.file_name, "Job received");
        Self {
            id,
            state: JobState::Received,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug!(
            job_id = %self.id,
            from = self.state.label(),
            to = next.label(),
            "Job state transition"
        );
        self.state = next;
    }
}

/// Files a job has put on local storage. Removed on `remove_all` or drop.
struct JobArtifacts {
    job_id: Uuid,
    paths: Vec<PathBuf>,
}

impl JobArtifacts {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            paths: Vec::with_capacity(2),
        }
    }

    fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Best-effort removal. Failures are logged, never returned.
    async fn remove_all(&mut self) {
        // Popped only after the await so a cancelled job still cleans up on drop.
        while let Some(path) = self.paths.last().cloned() {
            let result = tokio::fs::remove_file(&path).await;
            self.paths.pop();
            log_removal(self.job_id, &path, result);
        }
    }
}

impl Drop for JobArtifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let result = std::fs::remove_file(&path);
            log_removal(self.job_id, &path, result);
        }
    }
}

fn log_removal(job_id: Uuid, path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => debug!(job_id = %job_id, path = %path.display(), "Removed artifact"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %job_id,
            path = %path.display(),
            error = %e,
            "Failed to remove artifact"
        ),
    }
}
