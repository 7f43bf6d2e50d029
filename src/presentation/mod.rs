//! Presentation layer with the per-image view adapter.

/// Reusable widgets.
pub mod widgets;

pub use widgets::{ImageView, ImageViewStatus};
