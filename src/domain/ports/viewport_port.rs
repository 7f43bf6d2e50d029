//! Port for the host's viewport-intersection primitive.

use std::sync::Arc;

use crate::domain::entities::{IntersectionRecord, Rect};
use crate::domain::errors::LoadResult;

/// Callback invoked with each intersection observation.
pub type IntersectionCallback = Arc<dyn Fn(IntersectionRecord) + Send + Sync>;

/// Handle for one observed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationId(pub u64);

/// Host-side intersection observer.
pub trait ViewportObserver: Send + Sync {
    /// Starts observing `target`.
    ///
    /// # Errors
    /// Returns `LoadError::ObserverUnavailable` if the host cannot observe visibility.
    fn observe(&self, target: Rect, callback: IntersectionCallback) -> LoadResult<ObservationId>;

    /// Stops observing. Unknown ids are ignored.
    fn unobserve(&self, id: ObservationId);
}
