//! Ordered loading of a page's images by priority class.
//!
//! Hero images load first and one at a time. Above-the-fold and critical images follow
//! after short delays, concurrently within each class. Hover and lazy images wait for
//! their trigger. Delays only reduce bandwidth contention; the network may still reorder.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::entities::{PriorityClass, Rect};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::ViewportObserver;

use super::fallback_loader::{FallbackLoader, LoadOutcome};
use super::hint_emitter::HintEmitter;
use super::visibility::{VisibilityConfig, VisibilityTrigger};

/// Orchestrator timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Delay before above-the-fold images start, in milliseconds.
    #[serde(default = "default_above_fold_delay_ms")]
    pub above_fold_delay_ms: u64,

    /// Delay before critical images start, in milliseconds.
    #[serde(default = "default_critical_delay_ms")]
    pub critical_delay_ms: u64,

    /// Place preconnect hints for the origins of eager images.
    #[serde(default = "default_true")]
    pub preconnect: bool,
}

const fn default_above_fold_delay_ms() -> u64 {
    100
}

const fn default_critical_delay_ms() -> u64 {
    500
}

const fn default_true() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            above_fold_delay_ms: default_above_fold_delay_ms(),
            critical_delay_ms: default_critical_delay_ms(),
            preconnect: true,
        }
    }
}

/// A lazily loaded image and, optionally, where it sits on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LazyImage {
    /// Image URL.
    pub url: String,
    /// Element bounds; without them the host drives the trigger itself.
    #[serde(default)]
    pub bounds: Option<Rect>,
}

impl From<&str> for LazyImage {
    fn from(url: &str) -> Self {
        Self {
            url: url.to_string(),
            bounds: None,
        }
    }
}

/// The images of one page, grouped by priority class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadPlan {
    /// Hero images.
    #[serde(default)]
    pub hero: Vec<String>,
    /// Above-the-fold images.
    #[serde(default)]
    pub above_fold: Vec<String>,
    /// Critical images.
    #[serde(default)]
    pub critical: Vec<String>,
    /// Images loaded on hover.
    #[serde(default)]
    pub on_hover: Vec<String>,
    /// Images loaded when scrolled into view.
    #[serde(default)]
    pub lazy: Vec<LazyImage>,
}

impl LoadPlan {
    /// Makes the classes disjoint, keeping each URL in its most urgent class.
    #[must_use]
    pub fn normalized(self) -> Self {
        let mut seen = HashSet::new();
        let mut keep = |urls: Vec<String>| -> Vec<String> {
            urls.into_iter().filter(|url| seen.insert(url.clone())).collect()
        };

        let hero = keep(self.hero);
        let above_fold = keep(self.above_fold);
        let critical = keep(self.critical);
        let on_hover = keep(self.on_hover);
        let lazy = self
            .lazy
            .into_iter()
            .filter(|image| seen.insert(image.url.clone()))
            .collect();

        Self {
            hero,
            above_fold,
            critical,
            on_hover,
            lazy,
        }
    }

    /// Number of URLs across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hero.len()
            + self.above_fold.len()
            + self.critical.len()
            + self.on_hover.len()
            + self.lazy.len()
    }

    /// Returns true if the plan has no URLs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class a URL belongs to, checked in urgency order.
    #[must_use]
    pub fn class_of(&self, url: &str) -> Option<PriorityClass> {
        let has = |urls: &[String]| urls.iter().any(|u| u == url);
        if has(&self.hero) {
            Some(PriorityClass::Hero)
        } else if has(&self.above_fold) {
            Some(PriorityClass::AboveFold)
        } else if has(&self.critical) {
            Some(PriorityClass::Critical)
        } else if has(&self.on_hover) {
            Some(PriorityClass::OnHover)
        } else if self.lazy.iter().any(|image| image.url == url) {
            Some(PriorityClass::Lazy)
        } else {
            None
        }
    }
}

/// Result of one eager load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLoad {
    /// Class the image was loaded as.
    pub class: PriorityClass,
    /// Load outcome.
    pub outcome: LoadOutcome,
}

/// Sequences loads across priority classes.
#[derive(Debug, Clone)]
pub struct StrategyOrchestrator {
    loader: FallbackLoader,
    hints: Arc<HintEmitter>,
    config: StrategyConfig,
    visibility: VisibilityConfig,
}

impl StrategyOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        loader: FallbackLoader,
        hints: Arc<HintEmitter>,
        config: StrategyConfig,
        visibility: VisibilityConfig,
    ) -> Self {
        Self {
            loader,
            hints,
            config,
            visibility,
        }
    }

    /// Runs the eager stages of `plan` and arms its deferred ones.
    ///
    /// Returns once hero, above-the-fold and critical images have settled. Lazy images
    /// are observed through `observer`; without one they load immediately.
    pub async fn execute(
        &self,
        plan: LoadPlan,
        observer: Option<Arc<dyn ViewportObserver>>,
    ) -> StrategyHandle {
        let plan = plan.normalized();
        info!(
            hero = plan.hero.len(),
            above_fold = plan.above_fold.len(),
            critical = plan.critical.len(),
            on_hover = plan.on_hover.len(),
            lazy = plan.lazy.len(),
            "Executing image loading strategy"
        );

        if self.config.preconnect {
            for url in plan.hero.iter().chain(&plan.above_fold) {
                self.hints.preconnect(url);
            }
        }

        let lazy = self.arm_lazy(&plan.lazy, observer);

        let (hero, above_fold, critical) = tokio::join!(
            self.run_hero(&plan.hero),
            self.run_concurrent(
                PriorityClass::AboveFold,
                &plan.above_fold,
                self.config.above_fold_delay_ms
            ),
            self.run_concurrent(
                PriorityClass::Critical,
                &plan.critical,
                self.config.critical_delay_ms
            ),
        );

        let mut loads = hero;
        loads.extend(above_fold);
        loads.extend(critical);

        StrategyHandle {
            loader: self.loader.clone(),
            eager: loads,
            hover: Mutex::new(
                plan.on_hover
                    .into_iter()
                    .map(|url| (url, HoverState::Armed))
                    .collect(),
            ),
            lazy,
        }
    }

    async fn run_hero(&self, urls: &[String]) -> Vec<StageLoad> {
        let mut loads = Vec::with_capacity(urls.len());
        for url in urls {
            let requested = self.loader.negotiator().negotiated_url(url).await;
            self.hints.hint(&requested, true);
            let outcome = self.loader.load(url, true).await;
            loads.push(StageLoad {
                class: PriorityClass::Hero,
                outcome,
            });
        }
        if !urls.is_empty() {
            debug!(count = urls.len(), "Hero images settled");
        }
        loads
    }

    async fn run_concurrent(
        &self,
        class: PriorityClass,
        urls: &[String],
        delay_ms: u64,
    ) -> Vec<StageLoad> {
        if urls.is_empty() {
            return Vec::new();
        }

        for url in urls {
            let requested = self.loader.negotiator().negotiated_url(url).await;
            self.hints.hint(&requested, class.is_high());
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        debug!(class = %class, count = urls.len(), "Starting stage");

        let outcomes = join_all(urls.iter().map(|url| self.loader.load(url, class.is_high()))).await;
        outcomes
            .into_iter()
            .map(|outcome| StageLoad { class, outcome })
            .collect()
    }

    fn arm_lazy(
        &self,
        images: &[LazyImage],
        observer: Option<Arc<dyn ViewportObserver>>,
    ) -> Vec<LazyEntry> {
        images
            .iter()
            .map(|image| {
                let trigger = VisibilityTrigger::new(self.visibility);
                match (&observer, image.bounds) {
                    (Some(observer), Some(bounds)) => trigger.attach(observer.clone(), bounds),
                    (Some(_), None) => {}
                    (None, _) => trigger.fail_open(&LoadError::observer_unavailable(
                        "no viewport observer configured",
                    )),
                }

                let loader = self.loader.clone();
                let waiter = trigger.clone();
                let url = image.url.clone();
                let task = tokio::spawn(async move {
                    if waiter.intersected().await {
                        Some(loader.load(&url, false).await)
                    } else {
                        None
                    }
                });

                LazyEntry {
                    url: image.url.clone(),
                    trigger,
                    task: Mutex::new(Some(task)),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HoverState {
    Armed,
    Fired,
}

struct LazyEntry {
    url: String,
    trigger: VisibilityTrigger,
    task: Mutex<Option<JoinHandle<Option<LoadOutcome>>>>,
}

/// Deferred work of an executed plan.
///
/// Dropping the handle disconnects its lazy triggers; loads already started still finish.
pub struct StrategyHandle {
    loader: FallbackLoader,
    eager: Vec<StageLoad>,
    hover: Mutex<HashMap<String, HoverState>>,
    lazy: Vec<LazyEntry>,
}

impl std::fmt::Debug for StrategyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHandle")
            .field("eager", &self.eager.len())
            .field("hover", &self.hover.lock().len())
            .field("lazy", &self.lazy.len())
            .finish_non_exhaustive()
    }
}

impl StrategyHandle {
    /// Results of the hero, above-the-fold and critical stages, in that order.
    #[must_use]
    pub fn eager_loads(&self) -> &[StageLoad] {
        &self.eager
    }

    /// Loads a hover image the first time it is hovered.
    ///
    /// Returns `None` for URLs not registered for hover, or already hovered.
    pub async fn hover(&self, url: &str) -> Option<LoadOutcome> {
        {
            let mut hover = self.hover.lock();
            let state = hover.get_mut(url)?;
            if *state == HoverState::Fired {
                return None;
            }
            *state = HoverState::Fired;
        }
        debug!(url = %url, "Hover triggered load");
        Some(self.loader.load(url, false).await)
    }

    /// Visibility trigger of a lazy image, for hosts that drive it directly.
    #[must_use]
    pub fn trigger(&self, url: &str) -> Option<&VisibilityTrigger> {
        self.lazy
            .iter()
            .find(|entry| entry.url == url)
            .map(|entry| &entry.trigger)
    }

    /// Lazy images whose trigger has latched.
    #[must_use]
    pub fn triggered_lazy(&self) -> Vec<String> {
        self.lazy
            .iter()
            .filter(|entry| entry.trigger.has_intersected())
            .map(|entry| entry.url.clone())
            .collect()
    }

    /// Waits for the load of a triggered lazy image.
    ///
    /// # Errors
    /// Returns `LoadError::ObserverUnavailable` if the image is unknown, was already
    /// collected, or its trigger was torn down before it became visible.
    pub async fn lazy_outcome(&self, url: &str) -> LoadResult<LoadOutcome> {
        let not_loaded =
            || LoadError::observer_unavailable(format!("lazy image {url} never became visible"));
        let task = self
            .lazy
            .iter()
            .find(|entry| entry.url == url)
            .and_then(|entry| entry.task.lock().take())
            .ok_or_else(not_loaded)?;

        match task.await {
            Ok(Some(outcome)) => Ok(outcome),
            Ok(None) | Err(_) => Err(not_loaded()),
        }
    }

    /// Disconnects every lazy trigger that has not fired.
    pub fn disconnect(&self) {
        for entry in &self.lazy {
            entry.trigger.disconnect();
        }
    }
}

impl Drop for StrategyHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}
