//! Shared image load state with request deduplication.
//!
//! Every distinct URL has one entry. At most one load per URL is in flight; later
//! requesters wait on the same load instead of starting another fetch.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace, warn};

use crate::domain::entities::LoadState;
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::ImageFetcher;

const EVENT_CAPACITY: usize = 256;

type Outcome = Option<LoadResult<()>>;

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Known URLs.
    pub entries: usize,
    /// URLs loaded successfully.
    pub loaded: usize,
    /// URLs with a load in flight.
    pub loading: usize,
    /// URLs whose last load failed.
    pub failed: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Preload cache: {} urls ({} loaded, {} loading, {} failed)",
            self.entries, self.loaded, self.loading, self.failed
        )
    }
}

struct Slot {
    state: LoadState,
    pending: Option<watch::Receiver<Outcome>>,
}

#[derive(Default)]
struct Slots {
    /// Bumped by `clear` so loads started before it never write back.
    epoch: u64,
    map: HashMap<String, Slot>,
}

struct CacheInner {
    fetcher: Arc<dyn ImageFetcher>,
    slots: Mutex<Slots>,
    events: broadcast::Sender<LoadState>,
}

enum Begin {
    Loaded,
    Wait(watch::Receiver<Outcome>),
}

/// URL-keyed load state shared by every image consumer.
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct PreloadCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for PreloadCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl PreloadCache {
    /// Creates an empty cache that loads through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                slots: Mutex::new(Slots::default()),
                events,
            }),
        }
    }

    /// Current state of `url`; an untouched state if it was never requested.
    #[must_use]
    pub fn get(&self, url: &str) -> LoadState {
        self.inner
            .slots
            .lock()
            .map
            .get(url)
            .map_or_else(|| LoadState::untouched(url), |slot| slot.state.clone())
    }

    /// Receives every state transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LoadState> {
        self.inner.events.subscribe()
    }

    /// Loads `url`, or waits for the load already in flight.
    ///
    /// Resolves immediately for URLs already loaded. A failed URL is not retried
    /// automatically; calling this again starts a fresh attempt.
    ///
    /// # Errors
    /// Returns the `LoadError` of the underlying fetch.
    pub async fn request(&self, url: &str, priority: bool) -> LoadResult<()> {
        let mut rx = match self.begin(url, priority) {
            Begin::Loaded => {
                trace!(url = %url, "Preload cache hit");
                return Ok(());
            }
            Begin::Wait(rx) => rx,
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome
            .unwrap_or_else(|| Err(LoadError::network(url, "load ended without a result")))
    }

    /// Loads several URLs.
    ///
    /// With `priority` the loads run one after another in order, each finishing before
    /// the next starts. Without it they run concurrently. Either way every URL gets its
    /// own result and one failure does not affect the others.
    pub async fn request_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        priority: bool,
    ) -> Vec<LoadResult<()>> {
        if priority {
            let mut results = Vec::with_capacity(urls.len());
            for url in urls {
                results.push(self.request(url.as_ref(), true).await);
            }
            results
        } else {
            join_all(urls.iter().map(|url| self.request(url.as_ref(), false))).await
        }
    }

    /// Drops every entry. The only way to make a loaded URL load again.
    ///
    /// Loads already in flight still resolve for their waiters but leave no state behind.
    pub fn clear(&self) {
        let mut slots = self.inner.slots.lock();
        let count = slots.map.len();
        slots.epoch += 1;
        slots.map.clear();
        debug!(count = count, "Cleared preload cache");
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let slots = self.inner.slots.lock();
        slots
            .map
            .values()
            .fold(CacheStats::default(), |mut stats, slot| {
                stats.entries += 1;
                if slot.state.is_loaded {
                    stats.loaded += 1;
                } else if slot.state.is_loading {
                    stats.loading += 1;
                } else if slot.state.is_failed() {
                    stats.failed += 1;
                }
                stats
            })
    }

    fn begin(&self, url: &str, priority: bool) -> Begin {
        let (tx, rx, epoch) = {
            let mut slots = self.inner.slots.lock();
            let epoch = slots.epoch;
            let slot = slots.map.entry(url.to_string()).or_insert_with(|| Slot {
                state: LoadState::untouched(url),
                pending: None,
            });

            if slot.state.is_loaded {
                return Begin::Loaded;
            }
            if let Some(pending) = &slot.pending {
                trace!(url = %url, "Joining in-flight load");
                return Begin::Wait(pending.clone());
            }

            let (tx, rx) = watch::channel(None);
            slot.pending = Some(rx.clone());
            slot.state = LoadState::loading(url);
            (tx, rx, epoch)
        };

        self.notify(LoadState::loading(url));
        debug!(url = %url, priority = priority, "Starting image load");

        let mut pending = PendingLoad {
            cache: self.clone(),
            url: url.to_string(),
            epoch,
            tx: Some(tx),
        };
        tokio::spawn(async move {
            let result = pending
                .cache
                .inner
                .fetcher
                .fetch(&pending.url, priority)
                .await
                .map(|_| ());
            pending.settle(result);
        });

        Begin::Wait(rx)
    }

    fn finish(&self, url: &str, epoch: u64, result: &LoadResult<()>) {
        let state = match result {
            Ok(()) => LoadState::loaded(url),
            Err(e) => {
                warn!(url = %url, error = %e, "Image load failed");
                LoadState::failed(url, e.to_string())
            }
        };

        {
            let mut slots = self.inner.slots.lock();
            if slots.epoch != epoch {
                trace!(url = %url, "Discarding result of load started before clear");
                return;
            }
            if let Some(slot) = slots.map.get_mut(url) {
                slot.pending = None;
                slot.state = state.clone();
            }
        }

        self.notify(state);
    }

    fn notify(&self, state: LoadState) {
        // No subscribers is fine.
        let _ = self.inner.events.send(state);
    }
}

/// Settles one in-flight load exactly once, even if its task unwinds or is aborted.
struct PendingLoad {
    cache: PreloadCache,
    url: String,
    epoch: u64,
    tx: Option<watch::Sender<Outcome>>,
}

impl PendingLoad {
    fn settle(&mut self, result: LoadResult<()>) {
        if let Some(tx) = self.tx.take() {
            self.cache.finish(&self.url, self.epoch, &result);
            tx.send_replace(Some(result));
        }
    }
}

impl Drop for PendingLoad {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let error = LoadError::network(&self.url, "load task ended without a result");
            self.settle(Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::ports::mocks::MockFetcher;

    fn cache_with(fetcher: &Arc<MockFetcher>) -> PreloadCache {
        PreloadCache::new(fetcher.clone())
    }

    /// Panics on the first fetch, succeeds afterwards.
    struct PanicOnce(std::sync::atomic::AtomicBool);

    #[async_trait::async_trait]
    impl ImageFetcher for PanicOnce {
        async fn fetch(
            &self,
            url: &str,
            _priority: bool,
        ) -> LoadResult<crate::domain::ports::FetchedImage> {
            if !self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("decoder crashed");
            }
            Ok(crate::domain::ports::FetchedImage {
                url: url.to_string(),
                format: crate::domain::entities::ImageFormat::from_url(url),
                dimensions: None,
                byte_len: 0,
            })
        }
    }

    #[test]
    fn test_get_unseen_url_is_untouched() {
        let cache = cache_with(&Arc::new(MockFetcher::instant()));
        let state = cache.get("https://cdn.example.com/a.jpg");
        assert_eq!(state, LoadState::untouched("https://cdn.example.com/a.jpg"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(30)));
        let cache = cache_with(&fetcher);
        let url = "https://cdn.example.com/a.jpg";

        let results = join_all((0..10).map(|_| cache.request(url, false))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fetcher.count(url), 1);
        assert!(cache.get(url).is_loaded);
    }

    #[tokio::test]
    async fn test_second_requester_observes_pending_state() -> Result<(), Box<dyn std::error::Error>>
    {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(30)));
        let cache = cache_with(&fetcher);
        let url = "https://cdn.example.com/a.jpg";

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.request(url, false).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cache.get(url).is_loading);
        cache.request(url, false).await?;
        first.await??;
        assert_eq!(fetcher.count(url), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_loaded_url_is_not_fetched_again() -> LoadResult<()> {
        let fetcher = Arc::new(MockFetcher::instant());
        let cache = cache_with(&fetcher);
        let url = "https://cdn.example.com/a.jpg";

        cache.request(url, true).await?;

        let mut again = tokio_test::task::spawn(cache.request(url, false));
        tokio_test::assert_ready_ok!(again.poll());

        assert_eq!(fetcher.count(url), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_batch_runs_in_order_without_overlap() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(100)));
        let cache = cache_with(&fetcher);
        let urls = ["https://a.test/1.jpg", "https://a.test/2.jpg", "https://a.test/3.jpg"];

        let results = cache.request_many(&urls, true).await;
        assert!(results.iter().all(Result::is_ok));

        let calls = fetcher.calls();
        assert_eq!(
            calls.iter().map(|c| c.url.as_str()).collect::<Vec<_>>(),
            urls.to_vec()
        );
        for pair in calls.windows(2) {
            assert!(pair[0].started <= pair[1].started);
            assert!(pair[0].finished.is_some_and(|end| end <= pair[1].started));
        }
        assert!(calls.iter().all(|c| c.priority));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batch_overlaps_and_isolates_failures() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(100)));
        fetcher.fail("https://a.test/2.jpg");
        let cache = cache_with(&fetcher);
        let urls = ["https://a.test/1.jpg", "https://a.test/2.jpg", "https://a.test/3.jpg"];

        let results = cache.request_many(&urls, false).await;

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(LoadError::Network { .. })));
        assert!(results[2].is_ok());

        let calls = fetcher.calls();
        let latest_start = calls.iter().map(|c| c.started).max();
        let earliest_end = calls.iter().filter_map(|c| c.finished).min();
        assert!(latest_start < earliest_end);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_not_retried() {
        let fetcher = Arc::new(MockFetcher::instant());
        let url = "https://cdn.example.com/missing.jpg";
        fetcher.fail(url);
        let cache = cache_with(&fetcher);

        let result = cache.request(url, false).await;
        assert!(result.is_err());

        let state = cache.get(url);
        assert!(!state.is_loaded);
        assert!(!state.is_loading);
        assert!(state.error.is_some());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.count(url), 1);

        let _ = cache.request(url, false).await;
        assert_eq!(fetcher.count(url), 2);
    }

    #[tokio::test]
    async fn test_clear_resets_loaded_url() -> LoadResult<()> {
        let fetcher = Arc::new(MockFetcher::instant());
        let cache = cache_with(&fetcher);
        let url = "https://cdn.example.com/a.jpg";

        cache.request(url, false).await?;
        assert!(cache.get(url).is_loaded);

        cache.clear();
        assert_eq!(cache.get(url), LoadState::untouched(url));

        cache.request(url, false).await?;
        assert_eq!(fetcher.count(url), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_during_load_leaves_no_state() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(30)));
        let cache = cache_with(&fetcher);
        let url = "https://cdn.example.com/a.jpg";

        let pending = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.request(url, false).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.clear();

        let result = pending.await;
        assert!(matches!(result, Ok(Ok(()))));
        assert!(cache.get(url).is_untouched());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() -> Result<(), Box<dyn std::error::Error>> {
        let cache = cache_with(&Arc::new(MockFetcher::instant()));
        let mut events = cache.subscribe();
        let url = "https://cdn.example.com/a.jpg";

        cache.request(url, false).await?;

        assert_eq!(events.recv().await?, LoadState::loading(url));
        assert_eq!(events.recv().await?, LoadState::loaded(url));
        Ok(())
    }

    #[tokio::test]
    async fn test_stats() {
        let fetcher = Arc::new(MockFetcher::instant());
        fetcher.fail("https://a.test/bad.jpg");
        let cache = cache_with(&fetcher);

        let _ = cache
            .request_many(&["https://a.test/ok.jpg", "https://a.test/bad.jpg"], false)
            .await;

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.loading, 0);
    }

    #[tokio::test]
    async fn test_panicked_load_fails_and_can_be_retried() {
        let cache = PreloadCache::new(Arc::new(PanicOnce(Default::default())));
        let url = "https://cdn.example.com/a.jpg";

        let first = cache.request(url, false).await;
        assert!(matches!(first, Err(LoadError::Network { .. })));

        let state = cache.get(url);
        assert!(!state.is_loading);
        assert!(state.is_failed());
        assert_eq!(cache.stats().loading, 0);

        assert!(cache.request(url, false).await.is_ok());
        assert!(cache.get(url).is_loaded);
    }
}
