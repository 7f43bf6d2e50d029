//! Composition root for the imaging services.

use std::sync::Arc;

use tracing::info;

use crate::domain::entities::{BuildMode, PerformanceThresholds};
use crate::domain::ports::{
    ConnectionProbe, DimensionProbe, FormatProbe, HintSink, ImageFetcher, ViewportObserver,
};

use super::services::{
    FallbackLoader, FormatConfig, FormatNegotiator, HintEmitter, LoadPlan, PerformanceTelemetry,
    PreloadCache, StrategyConfig, StrategyHandle, StrategyOrchestrator, TelemetryConfig,
    VisibilityConfig, VisibilityTrigger,
};

/// Host adapters the services are built on.
#[derive(Clone)]
pub struct ImagingPorts {
    /// Network boundary.
    pub fetcher: Arc<dyn ImageFetcher>,
    /// Capability probe used for rewriting.
    pub format_probe: Arc<dyn FormatProbe>,
    /// Independent capability probe used only for telemetry audits.
    pub telemetry_probe: Arc<dyn FormatProbe>,
    /// Document head receiving hints.
    pub hint_sink: Arc<dyn HintSink>,
    /// Network condition snapshots.
    pub connection: Arc<dyn ConnectionProbe>,
    /// Post-load dimension lookups.
    pub dimensions: Arc<dyn DimensionProbe>,
    /// Viewport observation, if the host has it.
    pub viewport: Option<Arc<dyn ViewportObserver>>,
}

/// Per-component settings.
#[derive(Debug, Clone, Default)]
pub struct ImagingOptions {
    /// Build flavour.
    pub build_mode: BuildMode,
    /// Load duration thresholds.
    pub thresholds: PerformanceThresholds,
    /// Telemetry retention.
    pub telemetry: TelemetryConfig,
    /// Default visibility trigger settings.
    pub visibility: VisibilityConfig,
    /// Orchestrator timing.
    pub strategy: StrategyConfig,
    /// URL rewriting.
    pub format: FormatConfig,
}

/// Shared services, constructed once and handed to every consumer.
///
/// Cloning is cheap; clones share the same cache, hints and telemetry.
#[derive(Clone)]
pub struct ImagingContext {
    options: Arc<ImagingOptions>,
    cache: PreloadCache,
    negotiator: Arc<FormatNegotiator>,
    hints: Arc<HintEmitter>,
    telemetry: Arc<PerformanceTelemetry>,
    loader: FallbackLoader,
    orchestrator: StrategyOrchestrator,
    viewport: Option<Arc<dyn ViewportObserver>>,
}

impl std::fmt::Debug for ImagingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagingContext")
            .field("build_mode", &self.options.build_mode)
            .field("cache", &self.cache.stats())
            .field("has_viewport", &self.viewport.is_some())
            .finish_non_exhaustive()
    }
}

impl ImagingContext {
    /// Wires the services together.
    #[must_use]
    pub fn new(ports: ImagingPorts, options: ImagingOptions) -> Self {
        let cache = PreloadCache::new(ports.fetcher);
        let negotiator = Arc::new(FormatNegotiator::new(ports.format_probe, &options.format));
        let hints = Arc::new(HintEmitter::new(ports.hint_sink));
        let telemetry = Arc::new(PerformanceTelemetry::new(
            options.thresholds,
            options.telemetry.clone(),
            options.build_mode,
            ports.connection,
            ports.dimensions,
            ports.telemetry_probe,
        ));
        let loader = FallbackLoader::new(cache.clone(), negotiator.clone(), Some(telemetry.clone()));
        let orchestrator = StrategyOrchestrator::new(
            loader.clone(),
            hints.clone(),
            options.strategy.clone(),
            options.visibility,
        );

        Self {
            options: Arc::new(options),
            cache,
            negotiator,
            hints,
            telemetry,
            loader,
            orchestrator,
            viewport: ports.viewport,
        }
    }

    /// Settings the context was built with.
    #[must_use]
    pub fn options(&self) -> &ImagingOptions {
        &self.options
    }

    /// Shared preload cache.
    #[must_use]
    pub const fn cache(&self) -> &PreloadCache {
        &self.cache
    }

    /// Format negotiator.
    #[must_use]
    pub fn negotiator(&self) -> &FormatNegotiator {
        &self.negotiator
    }

    /// Hint emitter.
    #[must_use]
    pub fn hints(&self) -> &HintEmitter {
        &self.hints
    }

    /// Performance telemetry.
    #[must_use]
    pub fn telemetry(&self) -> &PerformanceTelemetry {
        &self.telemetry
    }

    /// Loader applying the WebP fallback protocol.
    #[must_use]
    pub const fn loader(&self) -> &FallbackLoader {
        &self.loader
    }

    /// Viewport observer, if the host has one.
    #[must_use]
    pub fn viewport(&self) -> Option<Arc<dyn ViewportObserver>> {
        self.viewport.clone()
    }

    /// New visibility trigger with the configured defaults.
    #[must_use]
    pub fn trigger(&self) -> VisibilityTrigger {
        VisibilityTrigger::new(self.options.visibility)
    }

    /// Flushes the preload cache and removes every hint placed through this context.
    ///
    /// Telemetry is kept; call `telemetry().clear()` to drop it too.
    pub fn clear(&self) {
        self.cache.clear();
        self.hints.unhint_all();
        info!("Flushed preload cache and hints");
    }

    /// Runs a page's loading strategy against the context's viewport.
    pub async fn execute(&self, plan: LoadPlan) -> StrategyHandle {
        self.orchestrator.execute(plan, self.viewport()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::services::LazyImage;
    use crate::domain::entities::{ConnectionSnapshot, Rect};
    use crate::domain::ports::mocks::{
        FixedConnection, FixedDimensions, MockFetcher, MockFormatProbe,
    };
    use crate::infrastructure::hints::HeadHintRegistry;
    use crate::infrastructure::viewport::ScrollViewport;

    fn context(fetcher: Arc<MockFetcher>, viewport: Option<Arc<ScrollViewport>>) -> ImagingContext {
        context_with_head(fetcher, viewport, Arc::new(HeadHintRegistry::new()))
    }

    fn context_with_head(
        fetcher: Arc<MockFetcher>,
        viewport: Option<Arc<ScrollViewport>>,
        head: Arc<HeadHintRegistry>,
    ) -> ImagingContext {
        let ports = ImagingPorts {
            fetcher,
            format_probe: Arc::new(MockFormatProbe::new(true)),
            telemetry_probe: Arc::new(MockFormatProbe::new(true)),
            hint_sink: head,
            connection: Arc::new(FixedConnection(ConnectionSnapshot::default())),
            dimensions: Arc::new(FixedDimensions(None)),
            viewport: viewport.map(|v| v as Arc<dyn ViewportObserver>),
        };
        ImagingContext::new(
            ports,
            ImagingOptions {
                build_mode: BuildMode::Production,
                ..ImagingOptions::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_state() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(10)));
        let ctx = context(fetcher.clone(), None);
        let other = ctx.clone();
        let url = "https://a.test/one.webp";

        ctx.loader().load(url, true).await;
        other.loader().load(url, true).await;

        assert!(other.cache().get(url).is_loaded);
        assert_eq!(fetcher.count(url), 1);
        assert_eq!(other.telemetry().report().total_images, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_reports_every_eager_image() {
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(20)));
        let viewport = Arc::new(ScrollViewport::new(1200.0, 800.0));
        let ctx = context(fetcher.clone(), Some(viewport.clone()));

        let plan = LoadPlan {
            hero: vec!["https://a.test/hero.webp".into()],
            above_fold: vec!["https://a.test/fold.jpg".into()],
            lazy: vec![LazyImage {
                url: "https://a.test/below.webp".into(),
                bounds: Some(Rect::new(0.0, 3000.0, 200.0, 200.0)),
            }],
            ..LoadPlan::default()
        };
        let handle = ctx.execute(plan).await;

        let report = ctx.telemetry().report();
        assert_eq!(report.total_images, 2);
        assert_eq!(report.failed_count, 0);
        assert!(handle.triggered_lazy().is_empty());
        assert_eq!(viewport.observed_count(), 1);

        drop(handle);
        assert_eq!(viewport.observed_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_flushes_cache_and_hints() {
        let fetcher = Arc::new(MockFetcher::instant());
        let head = Arc::new(HeadHintRegistry::new());
        let ctx = context_with_head(fetcher.clone(), None, head.clone());
        let url = "https://a.test/hero.webp";

        ctx.hints().hint(url, true);
        ctx.hints().preconnect(url);
        ctx.loader().load(url, true).await;
        assert!(ctx.cache().get(url).is_loaded);
        assert_eq!(head.len(), 2);

        ctx.clear();

        assert!(!ctx.hints().is_hinted(url));
        assert!(ctx.hints().live_hints().is_empty());
        assert_eq!(head.len(), 0);
        assert!(!ctx.cache().get(url).is_loaded);

        ctx.loader().load(url, true).await;
        assert_eq!(fetcher.count(url), 2);
        assert_eq!(ctx.telemetry().report().total_images, 1);
    }
}
