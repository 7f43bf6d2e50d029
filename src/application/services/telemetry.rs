//! Load timing, classification and aggregate reporting.
//!
//! Purely observational: nothing here changes how or when images load.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::domain::entities::{
    AuditRecommendations, BuildMode, ConnectionSnapshot, FormatAudit, ImageFormat, LoadClass,
    LoadMetric, PerformanceReport, PerformanceThresholds, Recommendation,
};
use crate::domain::ports::{ConnectionProbe, DimensionProbe, FormatProbe};

/// Share of slow loads above which oversized images are suspected.
const SLOW_SHARE_LIMIT: f64 = 0.2;

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Most recent metrics kept; older ones are evicted.
    #[serde(default = "default_max_metrics")]
    pub max_metrics: usize,

    /// How many audited URLs are suggested for preloading.
    #[serde(default = "default_preload_budget")]
    pub preload_budget: usize,
}

const fn default_max_metrics() -> usize {
    500
}

const fn default_preload_budget() -> usize {
    3
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_metrics: default_max_metrics(),
            preload_budget: default_preload_budget(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTrack {
    started: Instant,
    started_at: DateTime<Utc>,
    connection: ConnectionSnapshot,
    square_expected: bool,
}

/// Collects one metric per tracked URL and aggregates them into reports.
pub struct PerformanceTelemetry {
    thresholds: PerformanceThresholds,
    config: TelemetryConfig,
    build_mode: BuildMode,
    connection: Arc<dyn ConnectionProbe>,
    dimensions: Arc<dyn DimensionProbe>,
    format_probe: Arc<dyn FormatProbe>,
    webp_support: OnceCell<bool>,
    pending: Mutex<HashMap<String, PendingTrack>>,
    metrics: Arc<Mutex<LruCache<String, LoadMetric>>>,
}

impl std::fmt::Debug for PerformanceTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceTelemetry")
            .field("thresholds", &self.thresholds)
            .field("build_mode", &self.build_mode)
            .field("metrics", &self.metrics.lock().len())
            .finish_non_exhaustive()
    }
}

impl PerformanceTelemetry {
    /// Creates an empty telemetry store.
    #[must_use]
    pub fn new(
        thresholds: PerformanceThresholds,
        config: TelemetryConfig,
        build_mode: BuildMode,
        connection: Arc<dyn ConnectionProbe>,
        dimensions: Arc<dyn DimensionProbe>,
        format_probe: Arc<dyn FormatProbe>,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.max_metrics).unwrap_or(NonZeroUsize::MIN);
        Self {
            thresholds,
            config,
            build_mode,
            connection,
            dimensions,
            format_probe,
            webp_support: OnceCell::new(),
            pending: Mutex::new(HashMap::new()),
            metrics: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &PerformanceThresholds {
        &self.thresholds
    }

    /// Starts timing `url`, replacing any unfinished timing for it.
    pub fn start_tracking(&self, url: &str) {
        self.start_tracking_with(url, false);
    }

    /// Starts timing `url`; `square_expected` enables a warning for non-square results.
    pub fn start_tracking_with(&self, url: &str, square_expected: bool) {
        let track = PendingTrack {
            started: Instant::now(),
            started_at: Utc::now(),
            connection: self.connection.snapshot(),
            square_expected,
        };
        if self.pending.lock().insert(url.to_string(), track).is_some() {
            trace!(url = %url, "Restarted unfinished tracking");
        }
    }

    /// Stops timing `url` and stores its metric, replacing any earlier one.
    ///
    /// Returns the duration class, or `None` if `url` was not being tracked.
    pub fn end_tracking(&self, url: &str, success: bool, error: Option<&str>) -> Option<LoadClass> {
        let Some(track) = self.pending.lock().remove(url) else {
            trace!(url = %url, "end_tracking without start_tracking");
            return None;
        };

        let duration_ms = u64::try_from(track.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let format = ImageFormat::from_url(url);
        let metric = LoadMetric {
            url: url.to_string(),
            start: track.started_at,
            end: Utc::now(),
            duration_ms,
            format,
            is_webp: format.is_webp(),
            connection: track.connection,
            dimensions: None,
            error: (!success).then(|| error.unwrap_or("load failed").to_string()),
        };

        self.metrics.lock().put(url.to_string(), metric);

        if success {
            self.probe_dimensions(url, track);
        }

        let class = self.thresholds.classify(duration_ms);
        self.log_classification(url, duration_ms, class, success);
        Some(class)
    }

    /// Stored metric for `url`.
    #[must_use]
    pub fn metric(&self, url: &str) -> Option<LoadMetric> {
        self.metrics.lock().peek(url).cloned()
    }

    /// All stored metrics, most recent first.
    #[must_use]
    pub fn metrics(&self) -> Vec<LoadMetric> {
        self.metrics.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    /// Aggregates stored metrics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self) -> PerformanceReport {
        let metrics = self.metrics();
        let total = metrics.len();

        if total == 0 {
            return PerformanceReport {
                total_images: 0,
                average_load_time_ms: 0.0,
                webp_usage_ratio: 0.0,
                fast_count: 0,
                slow_count: 0,
                failed_count: 0,
                formats: BTreeMap::new(),
                recommendations: Vec::new(),
            };
        }

        let total_ms: u64 = metrics.iter().map(|m| m.duration_ms).sum();
        let average_load_time_ms = total_ms as f64 / total as f64;
        let webp_count = metrics.iter().filter(|m| m.is_webp).count();
        let webp_usage_ratio = webp_count as f64 / total as f64;
        let fast_count = metrics
            .iter()
            .filter(|m| !m.is_failed() && m.duration_ms <= self.thresholds.good_ms)
            .count();
        let slow_count = metrics
            .iter()
            .filter(|m| self.thresholds.classify(m.duration_ms).is_slow())
            .count();
        let failed_count = metrics.iter().filter(|m| m.is_failed()).count();

        let mut formats = BTreeMap::new();
        for metric in &metrics {
            *formats.entry(metric.format.to_string()).or_insert(0) += 1;
        }

        let mut recommendations = Vec::new();
        if webp_usage_ratio < self.thresholds.min_webp_ratio {
            recommendations.push(Recommendation::IncreaseWebpAdoption);
        }
        if average_load_time_ms > self.thresholds.warn_ms as f64 {
            recommendations.push(Recommendation::InvestigateCompression);
        }
        if slow_count as f64 > SLOW_SHARE_LIMIT * total as f64 {
            recommendations.push(Recommendation::ReviewOversizedImages);
        }
        if failed_count > 0 {
            recommendations.push(Recommendation::CheckBrokenUrls);
        }

        PerformanceReport {
            total_images: total,
            average_load_time_ms,
            webp_usage_ratio,
            fast_count,
            slow_count,
            failed_count,
            formats,
            recommendations,
        }
    }

    /// Audits a set of URLs for WebP usage.
    ///
    /// Uses this store's own capability probe, independent of the format negotiator.
    #[allow(clippy::cast_precision_loss)]
    pub async fn audit<S: AsRef<str>>(&self, urls: &[S]) -> FormatAudit {
        let supports_webp = *self
            .webp_support
            .get_or_init(|| self.format_probe.can_decode(ImageFormat::Webp))
            .await;

        let formats: Vec<(&str, ImageFormat)> = urls
            .iter()
            .map(|url| (url.as_ref(), ImageFormat::from_url(url.as_ref())))
            .collect();
        let webp_count = formats.iter().filter(|(_, f)| f.is_webp()).count();
        let webp_usage_percentage = if formats.is_empty() {
            0.0
        } else {
            webp_count as f64 / formats.len() as f64 * 100.0
        };

        let should_convert = if supports_webp {
            formats
                .iter()
                .filter(|(_, f)| !f.is_webp() && *f != ImageFormat::Svg)
                .map(|(url, _)| (*url).to_string())
                .collect()
        } else {
            Vec::new()
        };
        let should_preload = formats
            .iter()
            .take(self.config.preload_budget)
            .map(|(url, _)| (*url).to_string())
            .collect();

        FormatAudit {
            total: formats.len(),
            webp_count,
            webp_usage_percentage,
            supports_webp,
            recommendations: AuditRecommendations {
                should_convert,
                should_preload,
            },
        }
    }

    /// Drops all metrics and unfinished timings.
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.metrics.lock().clear();
    }

    fn probe_dimensions(&self, url: &str, track: PendingTrack) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let probe = self.dimensions.clone();
        let metrics = self.metrics.clone();
        let diagnostics = self.build_mode.diagnostics_enabled();
        let url = url.to_string();
        handle.spawn(async move {
            let Some(dimensions) = probe.dimensions(&url).await else {
                return;
            };
            if let Some(metric) = metrics.lock().peek_mut(&url)
                && metric.start == track.started_at
            {
                metric.dimensions = Some(dimensions);
            }
            if diagnostics && track.square_expected && !dimensions.is_square() {
                warn!(
                    url = %url,
                    width = dimensions.width,
                    height = dimensions.height,
                    "Expected a square image"
                );
            }
        });
    }

    fn log_classification(&self, url: &str, duration_ms: u64, class: LoadClass, success: bool) {
        if !self.build_mode.diagnostics_enabled() {
            return;
        }
        match (success, class) {
            (false, _) => warn!(url = %url, duration_ms, "Image failed to load"),
            (true, LoadClass::Good) => info!(url = %url, duration_ms, "Image loaded"),
            (true, LoadClass::Warn) => warn!(url = %url, duration_ms, "Image load is slow"),
            (true, LoadClass::Slow) => {
                warn!(url = %url, duration_ms, "Image load exceeded the maximum threshold");
            }
        }
    }
}
