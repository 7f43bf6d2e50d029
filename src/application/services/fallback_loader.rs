//! Negotiated image loading with a single fallback to the original URL.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::errors::LoadResult;

use super::format_negotiator::FormatNegotiator;
use super::preload_cache::PreloadCache;
use super::telemetry::PerformanceTelemetry;

/// Outcome of loading one logical image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// URL the caller asked for.
    pub original: String,
    /// URL of the last attempt.
    pub resolved: String,
    /// Number of load attempts made, 1 or 2.
    pub attempts: u8,
    /// Result of the last attempt.
    pub result: LoadResult<()>,
}

impl LoadOutcome {
    /// Returns true if the image loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns true if the original URL was used after the WebP variant failed.
    #[must_use]
    pub fn fell_back(&self) -> bool {
        self.attempts > 1
    }
}

/// Requests the negotiated URL and retries the original once if the rewrite fails.
///
/// At most two attempts are made per logical image; a failure of the original is final.
#[derive(Clone)]
pub struct FallbackLoader {
    cache: PreloadCache,
    negotiator: Arc<FormatNegotiator>,
    telemetry: Option<Arc<PerformanceTelemetry>>,
}

impl std::fmt::Debug for FallbackLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackLoader")
            .field("tracked", &self.telemetry.is_some())
            .finish_non_exhaustive()
    }
}

impl FallbackLoader {
    /// Creates a loader; `telemetry` times every attempt when present.
    #[must_use]
    pub fn new(
        cache: PreloadCache,
        negotiator: Arc<FormatNegotiator>,
        telemetry: Option<Arc<PerformanceTelemetry>>,
    ) -> Self {
        Self {
            cache,
            negotiator,
            telemetry,
        }
    }

    /// Shared cache this loader requests through.
    #[must_use]
    pub const fn cache(&self) -> &PreloadCache {
        &self.cache
    }

    /// Format negotiator in use.
    #[must_use]
    pub fn negotiator(&self) -> &FormatNegotiator {
        &self.negotiator
    }

    /// Loads `url`.
    pub async fn load(&self, url: &str, priority: bool) -> LoadOutcome {
        self.load_with(url, priority, false).await
    }

    /// Loads `url`; `square_expected` is passed on to telemetry.
    pub async fn load_with(&self, url: &str, priority: bool, square_expected: bool) -> LoadOutcome {
        let requested = self.negotiator.negotiated_url(url).await;
        let first = self.attempt(&requested, priority, square_expected).await;

        if first.is_ok() || !self.negotiator.should_fall_back(&requested, url) {
            return LoadOutcome {
                original: url.to_string(),
                resolved: requested,
                attempts: 1,
                result: first,
            };
        }

        if let Err(e) = &first {
            warn!(url = %requested, error = %e, "WebP variant failed, retrying original");
        }
        let second = self.attempt(url, priority, square_expected).await;
        if second.is_ok() {
            debug!(url = %url, "Original loaded after fallback");
        }

        LoadOutcome {
            original: url.to_string(),
            resolved: url.to_string(),
            attempts: 2,
            result: second,
        }
    }

    async fn attempt(&self, url: &str, priority: bool, square_expected: bool) -> LoadResult<()> {
        if let Some(telemetry) = &self.telemetry {
            telemetry.start_tracking_with(url, square_expected);
        }

        let result = self.cache.request(url, priority).await;

        if let Some(telemetry) = &self.telemetry {
            let error = result.as_ref().err().map(ToString::to_string);
            telemetry.end_tracking(url, result.is_ok(), error.as_deref());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::format_negotiator::FormatConfig;
    use crate::application::services::telemetry::TelemetryConfig;
    use crate::domain::entities::{BuildMode, ConnectionSnapshot, PerformanceThresholds};
    use crate::domain::ports::mocks::{
        FixedConnection, FixedDimensions, MockFetcher, MockFormatProbe,
    };

    const ORIGINAL: &str = "https://images.unsplash.com/photo-1?w=800";
    const REWRITTEN: &str = "https://images.unsplash.com/photo-1?w=800&fm=webp";

    fn loader(fetcher: &Arc<MockFetcher>, supported: bool) -> (FallbackLoader, Arc<PerformanceTelemetry>) {
        let negotiator = Arc::new(FormatNegotiator::new(
            Arc::new(MockFormatProbe::new(supported)),
            &FormatConfig::default(),
        ));
        let telemetry = Arc::new(PerformanceTelemetry::new(
            PerformanceThresholds::default(),
            TelemetryConfig::default(),
            BuildMode::Production,
            Arc::new(FixedConnection(ConnectionSnapshot::default())),
            Arc::new(FixedDimensions(None)),
            Arc::new(MockFormatProbe::new(supported)),
        ));
        let loader = FallbackLoader::new(
            PreloadCache::new(fetcher.clone()),
            negotiator,
            Some(telemetry.clone()),
        );
        (loader, telemetry)
    }

    #[tokio::test]
    async fn test_rewritten_url_loads_first_time() {
        let fetcher = Arc::new(MockFetcher::instant());
        let (loader, _) = loader(&fetcher, true);

        let outcome = loader.load(ORIGINAL, true).await;

        assert!(outcome.is_loaded());
        assert_eq!(outcome.resolved, REWRITTEN);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(fetcher.total(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_once_and_clears_error() {
        let fetcher = Arc::new(MockFetcher::instant());
        fetcher.fail(REWRITTEN);
        let (loader, telemetry) = loader(&fetcher, true);

        let outcome = loader.load(ORIGINAL, false).await;

        assert!(outcome.is_loaded());
        assert!(outcome.fell_back());
        assert_eq!(outcome.resolved, ORIGINAL);
        assert!(loader.cache().get(ORIGINAL).is_loaded);
        assert_eq!(telemetry.report().failed_count, 1);
    }

    #[tokio::test]
    async fn test_always_failing_rewrite_makes_exactly_two_attempts() {
        let fetcher = Arc::new(MockFetcher::instant());
        fetcher.fail(REWRITTEN);
        fetcher.fail(ORIGINAL);
        let (loader, _) = loader(&fetcher, true);

        let outcome = loader.load(ORIGINAL, false).await;

        assert!(!outcome.is_loaded());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(fetcher.total(), 2);
        assert_eq!(fetcher.count(REWRITTEN), 1);
        assert_eq!(fetcher.count(ORIGINAL), 1);
    }

    #[tokio::test]
    async fn test_unrewritten_failure_is_terminal() {
        let fetcher = Arc::new(MockFetcher::instant());
        let url = "https://cdn.example.org/shoe.jpg";
        fetcher.fail(url);
        let (loader, _) = loader(&fetcher, true);

        let outcome = loader.load(url, false).await;

        assert!(!outcome.is_loaded());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(fetcher.total(), 1);
    }

    #[tokio::test]
    async fn test_no_rewrite_without_support() {
        let fetcher = Arc::new(MockFetcher::instant());
        fetcher.fail(ORIGINAL);
        let (loader, _) = loader(&fetcher, false);

        let outcome = loader.load(ORIGINAL, false).await;

        assert_eq!(outcome.resolved, ORIGINAL);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(fetcher.count(REWRITTEN), 0);
    }
}
