use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Capabilities / limits of a notifier implementation.
#[derive(Clone, Copy, Debug)]
pub struct NotifierCapabilities {
    pub max_text_len: usize,
    pub max_caption_len: usize,
}

/// Outbound notification port.
///
/// Rich (media + caption) and plain text delivery are independent
/// capabilities: the scan engine uses `send_text` as the fallback path when
/// `send_media` fails, so a `send_media` failure must surface as `Err`.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn capabilities(&self) -> NotifierCapabilities;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn send_media(&self, path: &Path, caption: &str) -> Result<()>;
}
