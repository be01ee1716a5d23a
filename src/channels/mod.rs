//! Ingestion boundary: uploads in, human-readable replies out.

pub mod cli;
pub mod upload;

use async_trait::async_trait;
use tracing::warn;

use crate::error::ChannelError;

pub use cli::StdoutReply;
pub use upload::UploadHandler;

/// Where progress and result text for one upload is sent.
///
/// The transport behind it (chat bot, terminal) is not the pipeline's concern.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Send one text message back to the submitter.
    async fn reply(&self, text: &str) -> Result<(), ChannelError>;
}

/// Send `text`, logging instead of failing when the channel is down.
pub(crate) async fn send_reply(reply: &dyn ReplyChannel, text: &str) {
    if let Err(e) = reply.reply(text).await {
        warn!(channel = reply.name(), error = %e, "Failed to send reply");
    }
}
