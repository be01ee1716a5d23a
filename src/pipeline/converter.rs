//! Conversion to the delivery format via an external tool.
//!
//! The tool runs as a child process with:
//! - input path and derived output path as positional arguments
//! - a fixed output profile and metadata-cover preference
//! - a timeout, after which the child is killed
//!
//! Success is the tool's exit status, nothing else.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ConverterConfig;
use crate::error::ConversionError;
use crate::pipeline::types::{ConversionArtifact, DocumentFormat};

/// Maximum stderr captured into a conversion error (4KB).
const MAX_DETAIL_SIZE: usize = 4 * 1024;

/// Output path for a conversion: same directory, target extension.
pub fn derive_output_path(input: &Path) -> PathBuf {
    input.with_extension(DocumentFormat::TARGET.extension())
}

/// Converts a staged document into [`DocumentFormat::TARGET`].
#[async_trait]
pub trait Converter: Send + Sync {
    /// Where `convert` will write its output for `input`.
    ///
    /// Callers use this to clean up partial output after a failed conversion.
    fn output_path_for(&self, input: &Path) -> PathBuf {
        derive_output_path(input)
    }

    async fn convert(&self, input: &Path) -> Result<ConversionArtifact, ConversionError>;
}

/// Calibre-style `ebook-convert` invocation.
#[derive(Debug, Clone)]
pub struct EbookConvert {
    program: String,
    output_profile: String,
    prefer_metadata_cover: bool,
    timeout: Duration,
}

impl EbookConvert {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            program: config.program.clone(),
            output_profile: config.output_profile.clone(),
            prefer_metadata_cover: config.prefer_metadata_cover,
            timeout: config.timeout,
        }
    }

    /// Set the conversion timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn arguments(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args = vec![
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
            format!("--output-profile={}", self.output_profile).into(),
        ];
        if self.prefer_metadata_cover {
            args.push("--prefer-metadata-cover".into());
        }
        args
    }
}

#[async_trait]
impl Converter for EbookConvert {
    async fn convert(&self, input: &Path) -> Result<ConversionArtifact, ConversionError> {
        let output = self.output_path_for(input);
        info!(
            program = %self.program,
            input = %input.display(),
            output = %output.display(),
            "Converting document"
        );

        let mut child = Command::new(&self.program)
            .args(self.arguments(input, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConversionError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stderr_pipe = child.stderr.take();
        let result = tokio::time::timeout(self.timeout, async {
            let mut stderr = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                // Read to EOF so a chatty tool never blocks on a full pipe.
                pipe.read_to_end(&mut stderr).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, stderr))
        })
        .await;

        let (status, stderr) = match result {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                return Err(ConversionError::Failed {
                    status: "wait failed".into(),
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(ConversionError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            let detail = truncate_detail(String::from_utf8_lossy(&stderr).trim());
            return Err(ConversionError::Failed {
                status: status.to_string(),
                detail,
            });
        }

        debug!(output = %output.display(), "Conversion finished");
        Ok(ConversionArtifact {
            path: output,
            format: DocumentFormat::TARGET,
        })
    }
}

/// Keep the tail of the tool's stderr, where the actual error usually is.
fn truncate_detail(s: &str) -> String {
    if s.len() <= MAX_DETAIL_SIZE {
        return s.to_string();
    }
    let mut start = s.len() - MAX_DETAIL_SIZE;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}
