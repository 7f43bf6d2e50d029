//! Per-element visibility latch that turns a lazy image eager.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::domain::entities::{IntersectionRecord, Rect, RootMargin};
use crate::domain::errors::LoadError;
use crate::domain::ports::{IntersectionCallback, ObservationId, ViewportObserver};

/// Visibility trigger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// Margin added around the viewport before testing intersection.
    #[serde(default)]
    pub root_margin: RootMargin,

    /// Visible fraction of the element required to count as intersecting.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Stop observing after the first intersection.
    #[serde(default = "default_true")]
    pub once: bool,
}

const fn default_threshold() -> f64 {
    0.1
}

const fn default_true() -> bool {
    true
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            root_margin: RootMargin::default(),
            threshold: default_threshold(),
            once: true,
        }
    }
}

impl VisibilityConfig {
    /// Applies per-call-site overrides.
    #[must_use]
    pub fn with_overrides(mut self, root_margin: Option<RootMargin>, threshold: Option<f64>) -> Self {
        if let Some(margin) = root_margin {
            self.root_margin = margin;
        }
        if let Some(threshold) = threshold {
            self.threshold = threshold;
        }
        self.normalized()
    }

    /// Clamps `threshold` into `0.0..=1.0`; NaN falls back to the default.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.threshold = if self.threshold.is_nan() {
            default_threshold()
        } else {
            self.threshold.clamp(0.0, 1.0)
        };
        self
    }
}

/// Observation phase of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityPhase {
    /// Not attached to an observer yet.
    NotObserved,
    /// Attached, no intersection seen.
    Observing,
    /// Currently intersecting, or latched when `once` is set.
    Intersected,
    /// Left the viewport after intersecting (only without `once`).
    NotIntersecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latch {
    Pending,
    Intersected,
    TornDown,
}

struct TriggerState {
    phase: VisibilityPhase,
    is_intersecting: bool,
    has_intersected: bool,
    disconnected: bool,
    observation: Option<(Arc<dyn ViewportObserver>, ObservationId)>,
}

struct TriggerInner {
    config: VisibilityConfig,
    state: Mutex<TriggerState>,
    latch: watch::Sender<Latch>,
}

impl Drop for TriggerInner {
    fn drop(&mut self) {
        if let Some((observer, id)) = self.state.get_mut().observation.take() {
            observer.unobserve(id);
        }
    }
}

/// Visibility state for one element.
///
/// `has_intersected` latches on the first intersection and never resets.
#[derive(Clone)]
pub struct VisibilityTrigger {
    inner: Arc<TriggerInner>,
}

impl std::fmt::Debug for VisibilityTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("VisibilityTrigger")
            .field("phase", &state.phase)
            .field("is_intersecting", &state.is_intersecting)
            .field("has_intersected", &state.has_intersected)
            .field("disconnected", &state.disconnected)
            .finish_non_exhaustive()
    }
}

impl VisibilityTrigger {
    /// Creates an unattached trigger.
    #[must_use]
    pub fn new(config: VisibilityConfig) -> Self {
        let (latch, _) = watch::channel(Latch::Pending);
        Self {
            inner: Arc::new(TriggerInner {
                config: config.normalized(),
                state: Mutex::new(TriggerState {
                    phase: VisibilityPhase::NotObserved,
                    is_intersecting: false,
                    has_intersected: false,
                    disconnected: false,
                    observation: None,
                }),
                latch,
            }),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &VisibilityConfig {
        &self.inner.config
    }

    /// Starts observing `target` through `observer`.
    ///
    /// If the host cannot observe visibility the trigger fails open and latches at once,
    /// so the image loads eagerly instead of never.
    pub fn attach(&self, observer: Arc<dyn ViewportObserver>, target: Rect) {
        if self.inner.state.lock().disconnected {
            return;
        }

        let weak: Weak<TriggerInner> = Arc::downgrade(&self.inner);
        let callback: IntersectionCallback = Arc::new(move |record| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.handle(record);
            }
        });

        let id = match observer.observe(target, callback) {
            Ok(id) => id,
            Err(e) => {
                self.fail_open(&e);
                return;
            }
        };

        let release = {
            let mut state = self.inner.state.lock();
            if state.phase == VisibilityPhase::NotObserved {
                state.phase = VisibilityPhase::Observing;
            }
            let finished = state.disconnected || (self.inner.config.once && state.has_intersected);
            if !finished {
                state.observation = Some((observer.clone(), id));
            }
            finished
        };

        if release {
            observer.unobserve(id);
        }
    }

    /// Latches without observing, for hosts lacking the observation primitive.
    pub fn fail_open(&self, error: &LoadError) {
        warn!(error = %error, "Visibility observation unavailable, loading eagerly");
        {
            let mut state = self.inner.state.lock();
            if state.disconnected {
                return;
            }
            state.phase = VisibilityPhase::Intersected;
            state.is_intersecting = true;
            state.has_intersected = true;
        }
        self.inner.latch.send_replace(Latch::Intersected);
    }

    /// Applies one intersection observation.
    ///
    /// Ignored after `disconnect`, and after the first intersection when `once` is set.
    pub fn handle(&self, record: IntersectionRecord) {
        let config = &self.inner.config;
        let ratio = record.visible_ratio(&config.root_margin);
        let intersecting = ratio > 0.0 && ratio >= config.threshold;

        let (latched_now, release) = {
            let mut state = self.inner.state.lock();
            if state.disconnected || (config.once && state.has_intersected) {
                trace!("Ignoring intersection record");
                return;
            }

            state.is_intersecting = intersecting;
            let latched_now = intersecting && !state.has_intersected;
            if intersecting {
                state.phase = VisibilityPhase::Intersected;
                state.has_intersected = true;
            } else if state.phase == VisibilityPhase::Intersected {
                state.phase = VisibilityPhase::NotIntersecting;
            } else if state.phase == VisibilityPhase::NotObserved {
                state.phase = VisibilityPhase::Observing;
            }

            let release = if config.once && intersecting {
                state.observation.take()
            } else {
                None
            };
            (latched_now, release)
        };

        if latched_now {
            debug!(ratio = ratio, "Element became visible");
            self.inner.latch.send_replace(Latch::Intersected);
        }
        if let Some((observer, id)) = release {
            observer.unobserve(id);
        }
    }

    /// Stops observing. Later records are ignored and waiters are released.
    pub fn disconnect(&self) {
        let observation = {
            let mut state = self.inner.state.lock();
            if state.disconnected {
                return;
            }
            state.disconnected = true;
            state.observation.take()
        };
        if let Some((observer, id)) = observation {
            observer.unobserve(id);
        }
        self.inner.latch.send_if_modified(|latch| {
            if *latch == Latch::Pending {
                *latch = Latch::TornDown;
                true
            } else {
                false
            }
        });
    }

    /// Whether the element is intersecting now.
    #[must_use]
    pub fn is_intersecting(&self) -> bool {
        self.inner.state.lock().is_intersecting
    }

    /// Whether the element has ever intersected.
    #[must_use]
    pub fn has_intersected(&self) -> bool {
        self.inner.state.lock().has_intersected
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> VisibilityPhase {
        self.inner.state.lock().phase
    }

    /// Whether an image gated by this trigger may be requested.
    #[must_use]
    pub fn should_load(&self, priority: bool) -> bool {
        priority || self.has_intersected()
    }

    /// Waits for the first intersection.
    ///
    /// Returns false if the trigger was torn down before intersecting.
    pub async fn intersected(&self) -> bool {
        let mut rx = self.inner.latch.subscribe();
        match rx.wait_for(|latch| *latch != Latch::Pending).await {
            Ok(latch) => *latch == Latch::Intersected,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::services::PreloadCache;
    use crate::domain::ports::mocks::MockFetcher;
    use crate::infrastructure::viewport::ScrollViewport;

    const VIEWPORT_HEIGHT: f64 = 800.0;

    fn element_at(y: f64) -> Rect {
        Rect::new(0.0, y, 300.0, 300.0)
    }

    fn record(target: Rect, scroll_y: f64) -> IntersectionRecord {
        IntersectionRecord {
            target,
            root: Rect::new(0.0, scroll_y, 1200.0, VIEWPORT_HEIGHT),
        }
    }

    #[test]
    fn test_starts_not_observed() {
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());
        assert_eq!(trigger.phase(), VisibilityPhase::NotObserved);
        assert!(!trigger.has_intersected());
        assert!(!trigger.should_load(false));
        assert!(trigger.should_load(true));
    }

    #[test]
    fn test_root_margin_triggers_before_visible() {
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());
        // 50px below the fold, inside the default 100px margin.
        trigger.handle(record(element_at(850.0), 0.0));
        assert!(trigger.has_intersected());
    }

    #[test]
    fn test_threshold_not_met() {
        let config = VisibilityConfig::default().with_overrides(Some(RootMargin::uniform_px(0.0)), Some(0.5));
        let trigger = VisibilityTrigger::new(config);

        // 60 of 300px visible.
        trigger.handle(record(element_at(740.0), 0.0));
        assert!(!trigger.is_intersecting());
        assert_eq!(trigger.phase(), VisibilityPhase::Observing);

        trigger.handle(record(element_at(740.0), 200.0));
        assert!(trigger.is_intersecting());
    }

    #[test]
    fn test_out_of_range_threshold_is_clamped() {
        let config: VisibilityConfig = toml::from_str("threshold = 1.5").unwrap();
        let trigger = VisibilityTrigger::new(config);
        assert!((trigger.config().threshold - 1.0).abs() < f64::EPSILON);

        // Fully visible.
        trigger.handle(record(element_at(100.0), 0.0));
        assert!(trigger.has_intersected());

        let negative = VisibilityConfig {
            threshold: -2.0,
            ..VisibilityConfig::default()
        };
        assert!(VisibilityTrigger::new(negative).config().threshold.abs() < f64::EPSILON);

        let nan = VisibilityConfig {
            threshold: f64::NAN,
            ..VisibilityConfig::default()
        };
        assert!((VisibilityTrigger::new(nan).config().threshold - 0.1).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_once_latches_and_loads_once() {
        let fetcher = Arc::new(MockFetcher::instant());
        let cache = PreloadCache::new(fetcher.clone());
        let viewport = Arc::new(ScrollViewport::new(1200.0, VIEWPORT_HEIGHT));
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());
        let url = "https://a.test/lazy.jpg";

        trigger.attach(viewport.clone(), element_at(2000.0));
        assert_eq!(trigger.phase(), VisibilityPhase::Observing);

        let waiter = tokio::spawn({
            let trigger = trigger.clone();
            let cache = cache.clone();
            async move {
                if trigger.intersected().await {
                    let _ = cache.request(url, false).await;
                }
            }
        });

        viewport.scroll_to(1500.0);
        assert!(trigger.has_intersected());
        viewport.scroll_to(0.0);
        assert!(trigger.has_intersected());
        viewport.scroll_to(1500.0);

        tokio::time::timeout(Duration::from_secs(1), waiter).await.ok();
        assert_eq!(trigger.phase(), VisibilityPhase::Intersected);
        assert!(trigger.has_intersected());
        assert_eq!(fetcher.count(url), 1);
        assert_eq!(viewport.observed_count(), 0);
    }

    #[test]
    fn test_without_once_cycles() {
        let config = VisibilityConfig {
            once: false,
            ..VisibilityConfig::default()
        };
        let trigger = VisibilityTrigger::new(config);
        let target = element_at(2000.0);

        trigger.handle(record(target, 1500.0));
        assert_eq!(trigger.phase(), VisibilityPhase::Intersected);

        trigger.handle(record(target, 0.0));
        assert_eq!(trigger.phase(), VisibilityPhase::NotIntersecting);
        assert!(!trigger.is_intersecting());
        assert!(trigger.has_intersected());

        trigger.handle(record(target, 1500.0));
        assert_eq!(trigger.phase(), VisibilityPhase::Intersected);
    }

    #[tokio::test]
    async fn test_unsupported_host_fails_open() {
        let viewport = Arc::new(ScrollViewport::unsupported(1200.0, VIEWPORT_HEIGHT));
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());

        trigger.attach(viewport, element_at(5000.0));

        assert!(trigger.has_intersected());
        assert!(trigger.intersected().await);
    }

    #[tokio::test]
    async fn test_disconnect_ignores_late_records() {
        let viewport = Arc::new(ScrollViewport::new(1200.0, VIEWPORT_HEIGHT));
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());
        trigger.attach(viewport.clone(), element_at(2000.0));

        let waiter = tokio::spawn({
            let trigger = trigger.clone();
            async move { trigger.intersected().await }
        });

        trigger.disconnect();
        trigger.handle(record(element_at(2000.0), 1500.0));
        viewport.scroll_to(1500.0);

        assert!(!trigger.has_intersected());
        assert_eq!(viewport.observed_count(), 0);
        assert!(matches!(waiter.await, Ok(false)));
    }

    #[test]
    fn test_dropped_trigger_unobserves() {
        let viewport = Arc::new(ScrollViewport::new(1200.0, VIEWPORT_HEIGHT));
        {
            let trigger = VisibilityTrigger::new(VisibilityConfig::default());
            trigger.attach(viewport.clone(), element_at(2000.0));
            assert_eq!(viewport.observed_count(), 1);
        }
        assert_eq!(viewport.observed_count(), 0);
        viewport.scroll_to(1500.0);
    }

    #[test]
    fn test_visible_on_attach_latches_immediately() {
        let viewport = Arc::new(ScrollViewport::new(1200.0, VIEWPORT_HEIGHT));
        let trigger = VisibilityTrigger::new(VisibilityConfig::default());

        trigger.attach(viewport.clone(), element_at(100.0));

        assert!(trigger.has_intersected());
        assert_eq!(viewport.observed_count(), 0);
    }
}
