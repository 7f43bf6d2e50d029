pub mod fallback_loader;
pub mod format_negotiator;
pub mod hint_emitter;
pub mod preload_cache;
pub mod strategy;
pub mod telemetry;
pub mod visibility;

pub use fallback_loader::{FallbackLoader, LoadOutcome};
pub use format_negotiator::{FormatConfig, FormatNegotiator};
pub use hint_emitter::HintEmitter;
pub use preload_cache::{CacheStats, PreloadCache};
pub use strategy::{
    LazyImage, LoadPlan, StageLoad, StrategyConfig, StrategyHandle, StrategyOrchestrator,
};
pub use telemetry::{PerformanceTelemetry, TelemetryConfig};
pub use visibility::{VisibilityConfig, VisibilityPhase, VisibilityTrigger};
