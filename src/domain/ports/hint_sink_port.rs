//! Port for the document head that receives network hints.

use crate::domain::entities::{ImageId, PreloadHint};

/// Receives hint insertions and removals.
/// Implementations must be thread-safe and must not fail.
pub trait HintSink: Send + Sync {
    /// Places a hint element.
    fn insert(&self, hint: &PreloadHint);

    /// Removes the hint element with `id`, if present.
    fn remove(&self, id: &ImageId);

    /// Returns true if an element with `id` is present.
    fn contains(&self, id: &ImageId) -> bool;
}
