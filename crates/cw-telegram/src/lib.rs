//! Telegram adapter (teloxide).
//!
//! Implements the `cw-core` [`Notifier`] port over the Bot API: videos go out
//! with `sendVideo`, everything else with `sendMessage`. A single `429 Retry
//! After` is honoured before the error is surfaced.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{InputFile, Recipient},
};
use tokio::time::sleep;

use cw_core::{
    errors::Error,
    notify::port::{Notifier, NotifierCapabilities},
    Result,
};

pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_CAPTION_LEN: usize = 1024;

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat: Recipient,
    max_upload_bytes: u64,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat: &str, max_upload_bytes: u64, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("telegram client build error: {e}")))?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            chat: parse_recipient(chat)?,
            max_upload_bytes,
        })
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::warn!(retry_after_secs = d.as_secs(), "telegram rate limited");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Numeric ids (including `-100…` channel ids) become chat ids; anything else
/// is treated as a public `@username`.
pub fn parse_recipient(raw: &str) -> Result<Recipient> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Config("telegram chat id is empty".to_string()));
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    let name = raw.trim_start_matches('@');
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(Error::Config(format!("invalid telegram chat id: {raw:?}")));
    }
    Ok(Recipient::ChannelUsername(format!("@{name}")))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn capabilities(&self) -> NotifierCapabilities {
        NotifierCapabilities {
            max_text_len: MAX_TEXT_LEN,
            max_caption_len: MAX_CAPTION_LEN,
        }
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.with_retry(|| self.bot.send_message(self.chat.clone(), text.to_string()))
            .await?;
        Ok(())
    }

    async fn send_media(&self, path: &Path, caption: &str) -> Result<()> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.max_upload_bytes {
            return Err(Error::Delivery(format!(
                "{} is {size} bytes, over the {} byte upload limit",
                path.display(),
                self.max_upload_bytes
            )));
        }

        self.with_retry(|| {
            self.bot
                .send_video(self.chat.clone(), InputFile::file(path.to_path_buf()))
                .caption(caption.to_string())
                .supports_streaming(true)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_parsing() {
        assert_eq!(
            parse_recipient("-1001234567890").unwrap(),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            parse_recipient(" 42 ").unwrap(),
            Recipient::Id(ChatId(42))
        );
        assert_eq!(
            parse_recipient("@my_channel").unwrap(),
            Recipient::ChannelUsername("@my_channel".to_string())
        );
        assert_eq!(
            parse_recipient("my_channel").unwrap(),
            Recipient::ChannelUsername("@my_channel".to_string())
        );
        assert!(parse_recipient("").is_err());
        assert!(parse_recipient("@").is_err());
        assert!(parse_recipient("two words").is_err());
    }

    #[tokio::test]
    async fn oversized_media_is_rejected_before_upload() {
        let n = TelegramNotifier::new("123:abc", "42", 4, Duration::from_secs(1)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.mp4");
        std::fs::write(&path, b"0123456789").unwrap();

        let err = n.send_media(&path, "caption").await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_media_file_is_an_error() {
        let n = TelegramNotifier::new("123:abc", "42", 1024, Duration::from_secs(1)).unwrap();
        assert!(n
            .send_media(Path::new("/nonexistent/1.mp4"), "caption")
            .await
            .is_err());
    }

    #[test]
    fn capabilities_match_bot_api_limits() {
        let n = TelegramNotifier::new("123:abc", "@ch", 1024, Duration::from_secs(1)).unwrap();
        let caps = n.capabilities();
        assert_eq!(caps.max_text_len, 4096);
        assert_eq!(caps.max_caption_len, 1024);
    }
}
