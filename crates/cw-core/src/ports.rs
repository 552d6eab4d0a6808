use async_trait::async_trait;

use crate::{
    domain::{ItemDescriptor, MediaFile},
    Result,
};

/// Hexagonal port for listing an account's latest items.
///
/// Implementations return at most `limit` descriptors, newest first. An empty
/// feed is `Ok(vec![])`; transport or parse problems are errors.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs (`rss`, `ytdlp`, ...).
    fn name(&self) -> &str;

    async fn list_latest(&self, handle: &str, limit: usize) -> Result<Vec<ItemDescriptor>>;
}

/// Hexagonal port for downloading an item's media to local disk.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<MediaFile>;
}
