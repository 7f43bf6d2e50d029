//! Application layer with the imaging services and their composition root.

/// Composition root.
pub mod context;
/// Imaging services.
pub mod services;

pub use context::{ImagingContext, ImagingOptions, ImagingPorts};
pub use services::{
    FallbackLoader, FormatNegotiator, HintEmitter, LoadOutcome, LoadPlan, PerformanceTelemetry,
    PreloadCache, StrategyHandle, StrategyOrchestrator, VisibilityTrigger,
};
