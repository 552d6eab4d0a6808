//! One detect-and-deliver pass.
//!
//! Flow: list latest items -> derive identities -> drop known ones -> cold-start
//! guard -> deliver oldest-first (media, else text) -> record each identity as
//! soon as its delivery attempt is over.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    config::Config,
    domain::{ItemDescriptor, ItemId, ScanResult},
    errors::Error,
    formatting::item_caption,
    identity,
    notify::port::Notifier,
    ports::{MediaFetcher, SourceAdapter},
    store::DeliveryStore,
    Result,
};

/// Settings the engine needs out of [`Config`].
#[derive(Clone, Debug)]
pub struct ScanSettings {
    pub handle: String,
    pub batch_size: usize,
    pub source_timeout: Duration,
    pub media_timeout: Duration,
    pub delivery_timeout: Duration,
}

impl From<&Config> for ScanSettings {
    fn from(cfg: &Config) -> Self {
        // The chain bounds each strategy; the outer bound covers the whole chain.
        let strategies = cfg.source_strategies.len().max(1) as u32;
        Self {
            handle: cfg.watch_handle.clone(),
            batch_size: cfg.batch_size,
            source_timeout: cfg.source_timeout * strategies,
            media_timeout: cfg.media_timeout,
            delivery_timeout: cfg.delivery_timeout,
        }
    }
}

/// How a single item went out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    Rich,
    Text,
    Failed,
}

pub struct ScanEngine {
    settings: ScanSettings,
    source: Arc<dyn SourceAdapter>,
    fetcher: Arc<dyn MediaFetcher>,
    notifier: Arc<dyn Notifier>,
    store: DeliveryStore,
}

impl ScanEngine {
    pub fn new(
        settings: ScanSettings,
        source: Arc<dyn SourceAdapter>,
        fetcher: Arc<dyn MediaFetcher>,
        notifier: Arc<dyn Notifier>,
        store: DeliveryStore,
    ) -> Self {
        Self {
            settings,
            source,
            fetcher,
            notifier,
            store,
        }
    }

    pub fn store(&self) -> &DeliveryStore {
        &self.store
    }

    /// Run one pass. Every per-item failure is handled here; nothing escapes.
    pub async fn scan(&mut self) -> ScanResult {
        let cold_start = self.store.is_empty();
        let handle = self.settings.handle.clone();

        let listed = match self.list_latest().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(handle = %handle, "source listing failed, skipping pass: {e}");
                return ScanResult::default();
            }
        };

        let candidates = identify(listed);
        let mut result = ScanResult {
            found: candidates.len(),
            ..ScanResult::default()
        };

        let mut fresh: Vec<(ItemId, ItemDescriptor)> = candidates
            .into_iter()
            .filter(|(id, _)| !self.store.contains(id))
            .collect();

        if cold_start && fresh.len() > 1 {
            tracing::info!(
                handle = %handle,
                skipped = fresh.len() - 1,
                "cold start: delivering only the newest item"
            );
            fresh.truncate(1);
        }
        result.new = fresh.len();

        if fresh.is_empty() {
            tracing::debug!(handle = %handle, found = result.found, "no new items");
            return result;
        }

        // Oldest first so the channel order matches publication order.
        for (id, item) in fresh.into_iter().rev() {
            let outcome = self.deliver(&item).await;
            match outcome {
                Delivery::Rich => result.sent += 1,
                Delivery::Text => {
                    result.sent += 1;
                    result.fallbacks += 1;
                }
                Delivery::Failed => result.failed += 1,
            }
            tracing::info!(item = %id, url = %item.url, ?outcome, "item handled");
            self.store.record(id);
        }

        tracing::info!(
            handle = %handle,
            found = result.found,
            new = result.new,
            sent = result.sent,
            fallbacks = result.fallbacks,
            failed = result.failed,
            "scan pass complete"
        );
        result
    }

    async fn list_latest(&self) -> Result<Vec<ItemDescriptor>> {
        let s = &self.settings;
        timeout(s.source_timeout, self.source.list_latest(&s.handle, s.batch_size))
            .await
            .unwrap_or_else(|_| Err(Error::timeout("source listing", s.source_timeout)))
    }

    async fn deliver(&self, item: &ItemDescriptor) -> Delivery {
        let caps = self.notifier.capabilities();
        let s = &self.settings;

        let media = timeout(s.media_timeout, self.fetcher.fetch(&item.url))
            .await
            .unwrap_or_else(|_| Err(Error::timeout("media download", s.media_timeout)));

        match media {
            Ok(media) => {
                let caption = item_caption(&s.handle, item, caps.max_caption_len);
                let sent = timeout(
                    s.delivery_timeout,
                    self.notifier.send_media(media.path(), &caption),
                )
                .await
                .unwrap_or_else(|_| Err(Error::timeout("media upload", s.delivery_timeout)));
                match sent {
                    Ok(()) => return Delivery::Rich,
                    Err(e) => {
                        tracing::warn!(url = %item.url, "media delivery failed, falling back to text: {e}");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %item.url, "media fetch failed, sending text only: {e}");
            }
        }

        let text = item_caption(&s.handle, item, caps.max_text_len);
        let sent = timeout(s.delivery_timeout, self.notifier.send_text(&text))
            .await
            .unwrap_or_else(|_| Err(Error::timeout("text delivery", s.delivery_timeout)));
        match sent {
            Ok(()) => Delivery::Text,
            Err(e) => {
                tracing::error!(url = %item.url, "text delivery failed: {e}");
                Delivery::Failed
            }
        }
    }
}

/// Attach identities, dropping invalid urls and repeats (first occurrence wins).
fn identify(items: Vec<ItemDescriptor>) -> Vec<(ItemId, ItemDescriptor)> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !identity::is_web_url(&item.url) {
            tracing::warn!(url = %item.url, "discarding item with a non-http url");
            continue;
        }
        let Some(id) = identity::extract(&item.url) else {
            tracing::debug!(url = %item.url, "discarding item without a valid identity");
            continue;
        };
        if seen.insert(id.clone()) {
            out.push((id, item));
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake ports shared by the engine and scheduler tests.

    use std::{
        path::{Path, PathBuf},
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{domain::MediaFile, notify::port::NotifierCapabilities};

    pub struct FakeSource {
        pub items: Mutex<Option<Vec<ItemDescriptor>>>,
        pub delay: Duration,
    }

    impl FakeSource {
        pub fn with(items: Vec<ItemDescriptor>) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(Some(items)),
                delay: Duration::ZERO,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(None),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn list_latest(&self, _handle: &str, limit: usize) -> Result<Vec<ItemDescriptor>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let items = self.items.lock().unwrap().clone();
            match items {
                Some(mut v) => {
                    v.truncate(limit);
                    Ok(v)
                }
                None => Err(Error::External("feed unavailable".to_string())),
            }
        }
    }

    /// Succeeds for urls not listed in `fail_urls`.
    #[derive(Default)]
    pub struct FakeFetcher {
        pub fail_all: bool,
        pub fail_urls: Vec<String>,
        pub fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<MediaFile> {
            self.fetched.lock().unwrap().push(url.to_string());
            if self.fail_all || self.fail_urls.iter().any(|u| u == url) {
                return Err(Error::Media(format!("no media for {url}")));
            }
            let name = url.rsplit('/').next().unwrap_or("media");
            Ok(MediaFile::borrowed(PathBuf::from(format!("/tmp/{name}.mp4"))))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Sent {
        Media { path: PathBuf, caption: String },
        Text(String),
    }

    #[derive(Default)]
    pub struct FakeNotifier {
        pub fail_media: bool,
        pub fail_text: bool,
        pub sent: Mutex<Vec<Sent>>,
    }

    impl FakeNotifier {
        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text(t) => Some(t),
                    Sent::Media { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        fn capabilities(&self) -> NotifierCapabilities {
            NotifierCapabilities {
                max_text_len: 4096,
                max_caption_len: 1024,
            }
        }

        async fn send_text(&self, text: &str) -> Result<()> {
            if self.fail_text {
                return Err(Error::Delivery("text rejected".to_string()));
            }
            self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
            Ok(())
        }

        async fn send_media(&self, path: &Path, caption: &str) -> Result<()> {
            if self.fail_media {
                return Err(Error::Delivery("file too large".to_string()));
            }
            self.sent.lock().unwrap().push(Sent::Media {
                path: path.to_path_buf(),
                caption: caption.to_string(),
            });
            Ok(())
        }
    }

    pub fn item(id: u64) -> ItemDescriptor {
        ItemDescriptor::new(
            format!("https://www.tiktok.com/@creator/video/{id}"),
            format!("title {id}"),
        )
    }

    pub fn settings() -> ScanSettings {
        ScanSettings::from(&crate::config::test_config())
    }

    pub fn store_with(dir: &Path, ids: &[u64]) -> DeliveryStore {
        let mut store = DeliveryStore::new(dir.join("delivered.json"), 400);
        for id in ids {
            store.append(ItemId(id.to_string()));
        }
        store
    }
}
