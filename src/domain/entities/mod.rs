//! Domain entity definitions.

mod build_mode;
mod format_rule;
mod geometry;
mod hint;
mod image;
mod metric;
mod priority;

pub use build_mode::BuildMode;
pub use format_rule::{HostRule, RewriteAction};
pub use geometry::{IntersectionRecord, MarginValue, Rect, RootMargin, RootMarginError};
pub use hint::{HintKind, PreloadHint, origin_of};
pub use image::{Dimensions, ImageFormat, ImageId, LoadState};
pub use metric::{
    AuditRecommendations, ConnectionSnapshot, EffectiveConnectionType, FormatAudit, LoadClass,
    LoadMetric, PerformanceReport, PerformanceThresholds, Recommendation,
};
pub use priority::PriorityClass;
