//! A scrollable page viewport that reports element intersections.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{IntersectionRecord, Rect};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::{IntersectionCallback, ObservationId, ViewportObserver};

struct ViewportState {
    viewport: Rect,
    next_id: u64,
    observed: BTreeMap<ObservationId, (Rect, IntersectionCallback)>,
}

/// Page viewport with registered elements.
///
/// Every observed element gets a record when it is registered and on every scroll or
/// resize. Callbacks run without internal locks held, so they may unobserve.
pub struct ScrollViewport {
    supported: bool,
    state: Mutex<ViewportState>,
}

impl std::fmt::Debug for ScrollViewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScrollViewport")
            .field("supported", &self.supported)
            .field("viewport", &state.viewport)
            .field("observed", &state.observed.len())
            .finish()
    }
}

impl ScrollViewport {
    /// Creates a viewport of the given size scrolled to the top.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            supported: true,
            state: Mutex::new(ViewportState {
                viewport: Rect::new(0.0, 0.0, width, height),
                next_id: 0,
                observed: BTreeMap::new(),
            }),
        }
    }

    /// Creates a viewport whose host lacks intersection observation.
    #[must_use]
    pub fn unsupported(width: f64, height: f64) -> Self {
        Self {
            supported: false,
            ..Self::new(width, height)
        }
    }

    /// Current viewport bounds.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.state.lock().viewport
    }

    /// Number of elements under observation.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.state.lock().observed.len()
    }

    /// Scrolls vertically to `y` and notifies observed elements.
    pub fn scroll_to(&self, y: f64) {
        let dispatch = {
            let mut state = self.state.lock();
            state.viewport.y = y.max(0.0);
            trace!(y = state.viewport.y, "Viewport scrolled");
            Self::collect(&state)
        };
        Self::deliver(dispatch);
    }

    /// Resizes the viewport and notifies observed elements.
    pub fn resize(&self, width: f64, height: f64) {
        let dispatch = {
            let mut state = self.state.lock();
            state.viewport.width = width;
            state.viewport.height = height;
            Self::collect(&state)
        };
        Self::deliver(dispatch);
    }

    fn collect(state: &ViewportState) -> Vec<(IntersectionRecord, IntersectionCallback)> {
        state
            .observed
            .values()
            .map(|(target, callback)| {
                (
                    IntersectionRecord {
                        target: *target,
                        root: state.viewport,
                    },
                    callback.clone(),
                )
            })
            .collect()
    }

    fn deliver(dispatch: Vec<(IntersectionRecord, IntersectionCallback)>) {
        for (record, callback) in dispatch {
            callback(record);
        }
    }
}

impl ViewportObserver for ScrollViewport {
    fn observe(&self, target: Rect, callback: IntersectionCallback) -> LoadResult<ObservationId> {
        if !self.supported {
            return Err(LoadError::observer_unavailable(
                "host has no intersection observer",
            ));
        }

        let (id, record) = {
            let mut state = self.state.lock();
            let id = ObservationId(state.next_id);
            state.next_id += 1;
            state.observed.insert(id, (target, callback.clone()));
            (
                id,
                IntersectionRecord {
                    target,
                    root: state.viewport,
                },
            )
        };

        debug!(id = id.0, "Observing element");
        callback(record);
        Ok(id)
    }

    fn unobserve(&self, id: ObservationId) {
        if self.state.lock().observed.remove(&id).is_some() {
            trace!(id = id.0, "Stopped observing element");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_records_on_observe_and_scroll() -> LoadResult<()> {
        let viewport = ScrollViewport::new(1000.0, 800.0);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        viewport.observe(
            Rect::new(0.0, 1000.0, 100.0, 100.0),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )?;
        viewport.scroll_to(500.0);
        viewport.resize(1000.0, 400.0);

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!((viewport.bounds().height - 400.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_unsupported_host_refuses() {
        let viewport = ScrollViewport::unsupported(1000.0, 800.0);
        let result = viewport.observe(Rect::default(), Arc::new(|_| {}));
        assert!(matches!(result, Err(LoadError::ObserverUnavailable { .. })));
    }

    #[test]
    fn test_negative_scroll_clamps() {
        let viewport = ScrollViewport::new(1000.0, 800.0);
        viewport.scroll_to(-50.0);
        assert!(viewport.bounds().y.abs() < f64::EPSILON);
    }
}
