use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::{
    domain::ItemDescriptor,
    errors::Error,
    ports::SourceAdapter,
    Result,
};

/// Ordered list of listing strategies. First non-empty success wins.
///
/// Each strategy gets its own timeout, so a hung extractor only costs
/// `per_strategy_timeout` before the next strategy is tried.
pub struct SourceChain {
    strategies: Vec<Arc<dyn SourceAdapter>>,
    per_strategy_timeout: Duration,
}

impl SourceChain {
    pub fn new(strategies: Vec<Arc<dyn SourceAdapter>>, per_strategy_timeout: Duration) -> Self {
        Self {
            strategies,
            per_strategy_timeout,
        }
    }
}

#[async_trait]
impl SourceAdapter for SourceChain {
    fn name(&self) -> &str {
        "chain"
    }

    /// Returns the first non-empty listing. If every strategy came back empty
    /// (and at least one succeeded), the feed is empty; if none succeeded, the
    /// last error is returned.
    async fn list_latest(&self, handle: &str, limit: usize) -> Result<Vec<ItemDescriptor>> {
        let mut any_ok = false;
        let mut last_err: Option<Error> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            let res = timeout(self.per_strategy_timeout, strategy.list_latest(handle, limit))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::timeout(
                        format!("source {name}"),
                        self.per_strategy_timeout,
                    ))
                });

            match res {
                Ok(items) if !items.is_empty() => {
                    tracing::debug!(source = name, items = items.len(), "source listing ok");
                    let mut items = items;
                    items.truncate(limit);
                    return Ok(items);
                }
                Ok(_) => {
                    tracing::info!(source = name, "source returned no items, trying next");
                    any_ok = true;
                }
                Err(e) => {
                    tracing::warn!(source = name, "source failed, trying next: {e}");
                    last_err = Some(e);
                }
            }
        }

        if any_ok {
            return Ok(Vec::new());
        }
        Err(last_err.unwrap_or_else(|| Error::Config("no source strategies configured".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Items(Vec<ItemDescriptor>),
        Fail,
        Hang,
    }

    struct FakeSource {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn list_latest(&self, _handle: &str, _limit: usize) -> Result<Vec<ItemDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Items(v) => Ok(v.clone()),
                Behavior::Fail => Err(Error::External("boom".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn items(n: usize) -> Vec<ItemDescriptor> {
        (0..n)
            .map(|i| ItemDescriptor::new(format!("https://x/video/{i}"), format!("t{i}")))
            .collect()
    }

    #[tokio::test]
    async fn first_success_wins() {
        let a = FakeSource::new("a", Behavior::Items(items(2)));
        let b = FakeSource::new("b", Behavior::Items(items(3)));
        let chain = SourceChain::new(vec![a.clone(), b.clone()], Duration::from_secs(1));

        let out = chain.list_latest("h", 5).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn falls_through_errors_and_empty_results() {
        let a = FakeSource::new("a", Behavior::Fail);
        let b = FakeSource::new("b", Behavior::Items(Vec::new()));
        let c = FakeSource::new("c", Behavior::Items(items(4)));
        let chain = SourceChain::new(vec![a.clone(), b.clone(), c.clone()], Duration::from_secs(1));

        let out = chain.list_latest("h", 3).await.unwrap();
        assert_eq!(out.len(), 3, "result is capped at the requested limit");
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn all_empty_is_an_empty_feed_and_all_failed_is_an_error() {
        let chain = SourceChain::new(
            vec![
                FakeSource::new("a", Behavior::Fail),
                FakeSource::new("b", Behavior::Items(Vec::new())),
            ],
            Duration::from_secs(1),
        );
        assert!(chain.list_latest("h", 3).await.unwrap().is_empty());

        let chain = SourceChain::new(
            vec![
                FakeSource::new("a", Behavior::Fail),
                FakeSource::new("b", Behavior::Fail),
            ],
            Duration::from_secs(1),
        );
        assert!(chain.list_latest("h", 3).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_strategy_times_out_and_next_is_used() {
        let a = FakeSource::new("a", Behavior::Hang);
        let b = FakeSource::new("b", Behavior::Items(items(1)));
        let chain = SourceChain::new(vec![a, b.clone()], Duration::from_secs(30));

        let out = chain.list_latest("h", 3).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(b.calls(), 1);
    }
}
