//! Upload handling — stages the received bytes, runs the job, replies.
//!
//! Every upload is staged in its own `<work_dir>/<uuid>/` directory so two
//! concurrent uploads with the same file name never share a path. The
//! directory is removed after the job, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::{ReplyChannel, send_reply};
use crate::error::{ChannelError, Error, Result};
use crate::pipeline::orchestrator::JobOrchestrator;
use crate::pipeline::types::{IncomingDocument, JobReport};

/// Receives uploads from any channel and drives them through the pipeline.
pub struct UploadHandler {
    orchestrator: Arc<JobOrchestrator>,
    work_dir: PathBuf,
}

impl UploadHandler {
    pub fn new(orchestrator: Arc<JobOrchestrator>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            work_dir: work_dir.into(),
        }
    }

    /// Stage `bytes` as `file_name`, run the job, and reply with the result.
    ///
    /// The final reply is always sent (best-effort) before returning.
    pub async fn handle<R>(
        &self,
        file_name: &str,
        mut bytes: R,
        reply: &dyn ReplyChannel,
    ) -> Result<JobReport>
    where
        R: AsyncRead + Unpin + Send,
    {
        let Some(name) = sanitize_file_name(file_name) else {
            let err = ChannelError::InvalidFileName(file_name.to_string());
            send_reply(reply, &format!("❌ Failed to process: {err}")).await;
            return Err(err.into());
        };

        let job_dir = self.work_dir.join(Uuid::new_v4().to_string());
        let local_path = job_dir.join(&name);
        info!(file = %name, dir = %job_dir.display(), channel = reply.name(), "Upload received");

        if let Err(e) = stage(&job_dir, &local_path, &mut bytes).await {
            remove_job_dir(&job_dir).await;
            let err = ChannelError::Staging {
                file_name: name,
                source: e,
            };
            send_reply(reply, &format!("❌ Failed to process: {err}")).await;
            return Err(err.into());
        }

        let result = self
            .orchestrator
            .run_job(IncomingDocument::new(name.clone(), local_path), reply)
            .await;
        remove_job_dir(&job_dir).await;

        let text = match &result {
            Ok(report) => report.render(),
            Err(e) => e.user_message(&name),
        };
        send_reply(reply, &text).await;

        result.map_err(Error::from)
    }
}

/// Reduce an uploaded name to its final path component.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = Path::new(raw.trim()).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

async fn stage<R>(job_dir: &Path, local_path: &Path, bytes: &mut R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    tokio::fs::create_dir_all(job_dir).await?;
    let mut file = tokio::fs::File::create(local_path).await?;
    let written = tokio::io::copy(bytes, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

async fn remove_job_dir(job_dir: &Path) {
    match tokio::fs::remove_dir_all(job_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %job_dir.display(), error = %e, "Failed to remove job directory"),
    }
}
