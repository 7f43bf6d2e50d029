//! Load timing records and the thresholds they are judged against.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::image::{Dimensions, ImageFormat};

/// Effective network type as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectiveConnectionType {
    /// Very slow 2G.
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// 2G.
    #[serde(rename = "2g")]
    TwoG,
    /// 3G.
    #[serde(rename = "3g")]
    ThreeG,
    /// 4G or better.
    #[serde(rename = "4g")]
    FourG,
    /// Host does not expose network information.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl EffectiveConnectionType {
    /// Classifies a measured downlink throughput the way browsers bucket it.
    #[must_use]
    pub fn from_downlink_mbps(mbps: f64) -> Self {
        if mbps < 0.05 {
            Self::Slow2g
        } else if mbps < 0.07 {
            Self::TwoG
        } else if mbps < 0.7 {
            Self::ThreeG
        } else {
            Self::FourG
        }
    }
}

impl std::fmt::Display for EffectiveConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slow2g => write!(f, "slow-2g"),
            Self::TwoG => write!(f, "2g"),
            Self::ThreeG => write!(f, "3g"),
            Self::FourG => write!(f, "4g"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Network conditions captured when tracking starts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ConnectionSnapshot {
    /// Effective connection type.
    pub effective_type: EffectiveConnectionType,
    /// Downlink bandwidth estimate in Mbit/s, if known.
    pub bandwidth_mbps: Option<f64>,
}

/// One tracked load attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadMetric {
    /// URL that was loaded.
    pub url: String,
    /// Wall-clock start.
    pub start: DateTime<Utc>,
    /// Wall-clock end.
    pub end: DateTime<Utc>,
    /// Elapsed load time in milliseconds.
    pub duration_ms: u64,
    /// Format inferred from the URL.
    pub format: ImageFormat,
    /// Whether the loaded variant is WebP.
    pub is_webp: bool,
    /// Network conditions at start.
    pub connection: ConnectionSnapshot,
    /// Decoded dimensions, filled in asynchronously.
    pub dimensions: Option<Dimensions>,
    /// Failure message, if the attempt failed.
    pub error: Option<String>,
}

impl LoadMetric {
    /// Returns true if the attempt failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Duration bands used to classify a load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceThresholds {
    /// Loads at or under this are counted as fast.
    #[serde(default = "default_good_ms")]
    pub good_ms: u64,
    /// Loads over this are counted as slow.
    #[serde(default = "default_warn_ms")]
    pub warn_ms: u64,
    /// Loads over this are severely slow.
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    /// Minimum acceptable share of WebP loads (0.0 to 1.0).
    #[serde(default = "default_min_webp_ratio")]
    pub min_webp_ratio: f64,
}

const fn default_good_ms() -> u64 {
    500
}

const fn default_warn_ms() -> u64 {
    1000
}

const fn default_max_ms() -> u64 {
    3000
}

const fn default_min_webp_ratio() -> f64 {
    0.8
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            good_ms: default_good_ms(),
            warn_ms: default_warn_ms(),
            max_ms: default_max_ms(),
            min_webp_ratio: default_min_webp_ratio(),
        }
    }
}

impl PerformanceThresholds {
    /// Classifies a load duration.
    #[must_use]
    pub const fn classify(&self, duration_ms: u64) -> LoadClass {
        if duration_ms > self.max_ms {
            LoadClass::Slow
        } else if duration_ms > self.warn_ms {
            LoadClass::Warn
        } else {
            LoadClass::Good
        }
    }
}

/// Outcome of classifying one load duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadClass {
    /// Within the warning threshold.
    Good,
    /// Over the warning threshold.
    Warn,
    /// Over the maximum threshold.
    Slow,
}

impl LoadClass {
    /// Counts towards the report's slow total.
    #[must_use]
    pub const fn is_slow(self) -> bool {
        matches!(self, Self::Warn | Self::Slow)
    }
}

/// Rule-based advice attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    /// WebP share is under the configured minimum.
    IncreaseWebpAdoption,
    /// Average load time is over the warning threshold.
    InvestigateCompression,
    /// More than a fifth of loads were slow.
    ReviewOversizedImages,
    /// At least one load failed.
    CheckBrokenUrls,
}

impl Recommendation {
    /// Human-readable advice.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::IncreaseWebpAdoption => "increase WebP adoption",
            Self::InvestigateCompression => "investigate compression/size",
            Self::ReviewOversizedImages => "review oversized images",
            Self::CheckBrokenUrls => "check broken URLs",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Aggregate over all retained metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// Number of metrics.
    pub total_images: usize,
    /// Mean load time.
    pub average_load_time_ms: f64,
    /// Share of WebP loads, 0.0 to 1.0.
    pub webp_usage_ratio: f64,
    /// Loads at or under the good threshold.
    pub fast_count: usize,
    /// Loads over the warning threshold.
    pub slow_count: usize,
    /// Failed loads.
    pub failed_count: usize,
    /// Loads per detected format.
    pub formats: BTreeMap<String, usize>,
    /// Fired recommendations.
    pub recommendations: Vec<Recommendation>,
}

impl PerformanceReport {
    /// Returns true if `recommendation` fired.
    #[must_use]
    pub fn recommends(&self, recommendation: Recommendation) -> bool {
        self.recommendations.contains(&recommendation)
    }
}

impl std::fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Images: {} loaded, {:.0}ms average, {:.1}% WebP",
            self.total_images,
            self.average_load_time_ms,
            self.webp_usage_ratio * 100.0
        )?;
        write!(
            f,
            "Fast: {}, slow: {}, failed: {}",
            self.fast_count, self.slow_count, self.failed_count
        )?;
        for recommendation in &self.recommendations {
            write!(f, "\n- {recommendation}")?;
        }
        Ok(())
    }
}

/// Advice from a format audit of a set of URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditRecommendations {
    /// URLs that could be served as WebP but are not.
    pub should_convert: Vec<String>,
    /// URLs worth a preload hint.
    pub should_preload: Vec<String>,
}

/// Result of auditing a set of URLs for WebP usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatAudit {
    /// URLs audited.
    pub total: usize,
    /// URLs already in WebP.
    pub webp_count: usize,
    /// `webp_count` as a percentage of `total`.
    pub webp_usage_percentage: f64,
    /// Result of the capability probe.
    pub supports_webp: bool,
    /// Suggested follow-ups.
    pub recommendations: AuditRecommendations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(400, LoadClass::Good ; "under_warn")]
    #[test_case(1000, LoadClass::Good ; "at_warn")]
    #[test_case(1200, LoadClass::Warn ; "over_warn")]
    #[test_case(3000, LoadClass::Warn ; "at_max")]
    #[test_case(5000, LoadClass::Slow ; "over_max")]
    fn test_classify(duration_ms: u64, expected: LoadClass) {
        assert_eq!(PerformanceThresholds::default().classify(duration_ms), expected);
    }

    #[test_case(0.01, EffectiveConnectionType::Slow2g ; "slow_2g")]
    #[test_case(0.06, EffectiveConnectionType::TwoG ; "two_g")]
    #[test_case(0.5, EffectiveConnectionType::ThreeG ; "three_g")]
    #[test_case(25.0, EffectiveConnectionType::FourG ; "four_g")]
    fn test_effective_type_from_downlink(mbps: f64, expected: EffectiveConnectionType) {
        assert_eq!(EffectiveConnectionType::from_downlink_mbps(mbps), expected);
    }

    #[test]
    fn test_thresholds_deserialize_with_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let thresholds: PerformanceThresholds = toml::from_str("warn_ms = 1500")?;
        assert_eq!(thresholds.warn_ms, 1500);
        assert_eq!(thresholds.max_ms, 3000);
        assert!((thresholds.min_webp_ratio - 0.8).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_recommendation_messages() {
        assert_eq!(
            Recommendation::InvestigateCompression.to_string(),
            "investigate compression/size"
        );
        assert_eq!(Recommendation::CheckBrokenUrls.message(), "check broken URLs");
    }
}
