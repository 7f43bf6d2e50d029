//! Idempotent early network hints.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{HintKind, ImageId, PreloadHint, origin_of};
use crate::domain::ports::HintSink;

/// Places and removes preload/preconnect hints, at most one per URL and kind.
///
/// Hints only influence network scheduling. Completion is tracked by the preload cache.
pub struct HintEmitter {
    sink: Arc<dyn HintSink>,
    live: Mutex<HashMap<ImageId, PreloadHint>>,
}

impl std::fmt::Debug for HintEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HintEmitter")
            .field("live", &self.live.lock().len())
            .finish_non_exhaustive()
    }
}

impl HintEmitter {
    /// Creates an emitter writing to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn HintSink>) -> Self {
        Self {
            sink,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Places a preload hint for `url`. Does nothing if one is already live.
    pub fn hint(&self, url: &str, priority: bool) {
        self.place(PreloadHint::preload(url, priority));
    }

    /// Places a preconnect hint for the origin of `url`.
    /// Relative URLs have no remote origin and are ignored.
    pub fn preconnect(&self, url: &str) {
        if let Some(origin) = origin_of(url) {
            self.place(PreloadHint::preconnect(origin));
        }
    }

    /// Removes the preload hint for `url`, if any.
    pub fn unhint(&self, url: &str) {
        let id = PreloadHint::id_for(HintKind::Preload, url);
        if self.live.lock().remove(&id).is_some() {
            self.sink.remove(&id);
            debug!(url = %url, "Removed preload hint");
        }
    }

    /// Removes every hint this emitter placed.
    pub fn unhint_all(&self) {
        let drained: Vec<ImageId> = self.live.lock().drain().map(|(id, _)| id).collect();
        for id in &drained {
            self.sink.remove(id);
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Removed all hints");
        }
    }

    /// Returns true if a preload hint for `url` is live.
    #[must_use]
    pub fn is_hinted(&self, url: &str) -> bool {
        self.live
            .lock()
            .contains_key(&PreloadHint::id_for(HintKind::Preload, url))
    }

    /// Live hints, in no particular order.
    #[must_use]
    pub fn live_hints(&self) -> Vec<PreloadHint> {
        self.live.lock().values().cloned().collect()
    }

    fn place(&self, hint: PreloadHint) {
        let mut live = self.live.lock();
        if live.contains_key(&hint.hint_id) || self.sink.contains(&hint.hint_id) {
            trace!(url = %hint.url, kind = hint.kind.rel(), "Hint already present");
            return;
        }
        self.sink.insert(&hint);
        debug!(url = %hint.url, kind = hint.kind.rel(), high = hint.high_priority, "Placed hint");
        live.insert(hint.hint_id.clone(), hint);
    }
}
