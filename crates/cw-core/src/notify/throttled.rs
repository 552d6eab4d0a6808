use std::{path::Path, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    notify::port::{Notifier, NotifierCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between outbound calls to the single target chat.
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1050), // ~0.95/sec per chat
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// Notifier decorator that spaces outbound calls.
///
/// Best-effort defense against Telegram 429s when a pass delivers a burst of
/// items (media + fallback text back to back).
pub struct ThrottledNotifier {
    inner: Arc<dyn Notifier>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledNotifier {
    pub fn new(inner: Arc<dyn Notifier>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            limiter: Mutex::new(IntervalLimiter::new(cfg.min_interval)),
        }
    }

    async fn throttle(&self) {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl Notifier for ThrottledNotifier {
    fn capabilities(&self) -> NotifierCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.throttle().await;
        self.inner.send_text(text).await
    }

    async fn send_media(&self, path: &Path, caption: &str) -> Result<()> {
        self.throttle().await;
        self.inner.send_media(path, caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(String, Instant)>>,
    }

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        fn capabilities(&self) -> NotifierCapabilities {
            NotifierCapabilities {
                max_text_len: 4096,
                max_caption_len: 1024,
            }
        }

        async fn send_text(&self, text: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), Instant::now()));
            Ok(())
        }

        async fn send_media(&self, _path: &Path, caption: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((caption.to_string(), Instant::now()));
            Ok(())
        }
    }

    #[test]
    fn limiter_reserves_consecutive_slots() {
        let mut lim = IntervalLimiter::new(Duration::from_secs(10));
        assert_eq!(lim.reserve(), Duration::from_millis(0));
        let second = lim.reserve();
        assert!(second > Duration::from_secs(9));
        let third = lim.reserve();
        assert!(third > Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_calls_by_min_interval() {
        let rec = Arc::new(Recorder::default());
        let throttled = ThrottledNotifier::new(
            rec.clone(),
            ThrottleConfig {
                min_interval: Duration::from_millis(500),
            },
        );

        throttled.send_text("a").await.unwrap();
        throttled
            .send_media(Path::new("/tmp/x.mp4"), "b")
            .await
            .unwrap();
        throttled.send_text("c").await.unwrap();

        let calls = rec.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].0, "b");
        assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(500));
        assert!(calls[2].1 - calls[1].1 >= Duration::from_millis(500));
    }
}
