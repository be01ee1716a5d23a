//! CLI channel — uploads local files given on the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::channels::{ReplyChannel, UploadHandler, send_reply};
use crate::error::ChannelError;
use crate::pipeline::types::JobReport;

/// Prints replies to stdout, prefixed with the upload they belong to.
pub struct StdoutReply {
    label: String,
}

impl StdoutReply {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl ReplyChannel for StdoutReply {
    fn name(&self) -> &str {
        "cli"
    }

    async fn reply(&self, text: &str) -> Result<(), ChannelError> {
        for line in text.lines() {
            println!("[{}] {}", self.label, line);
        }
        Ok(())
    }
}

/// Result of one file submitted from the command line.
#[derive(Debug)]
pub struct FileResult {
    pub path: PathBuf,
    pub report: Option<JobReport>,
}

/// Submit every path as its own job, concurrently. The source files are
/// copied into the handler's work dir, never moved or deleted.
pub async fn submit_files(handler: Arc<UploadHandler>, paths: Vec<PathBuf>) -> Vec<FileResult> {
    let tasks = paths.into_iter().map(|path| {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let report = submit_file(&handler, &path).await;
            FileResult { path, report }
        })
    });

    let mut results = Vec::new();
    for joined in futures::future::join_all(tasks).await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => tracing::error!("Upload task panicked: {e}"),
        }
    }
    results
}

async fn submit_file(handler: &UploadHandler, path: &Path) -> Option<JobReport> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reply = StdoutReply::new(&file_name);

    let file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) => {
            send_reply(&reply, &format!("❌ Cannot open {}: {e}", path.display())).await;
            return None;
        }
    };

    handler.handle(&file_name, file, &reply).await.ok()
}
