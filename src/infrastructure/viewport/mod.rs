//! Viewport hosts that deliver intersection observations.

pub mod scroll_viewport;

pub use scroll_viewport::ScrollViewport;
