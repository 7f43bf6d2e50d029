//! In-memory document head holding rendered hint elements.

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::{ImageId, PreloadHint};
use crate::domain::ports::HintSink;

/// Ordered list of `<link>` elements, as a document head would hold them.
#[derive(Debug, Default)]
pub struct HeadHintRegistry {
    elements: Mutex<Vec<(ImageId, String)>>,
}

impl HeadHintRegistry {
    /// Creates an empty head.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    /// Returns true if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered elements, one per line, in insertion order.
    #[must_use]
    pub fn markup(&self) -> String {
        self.elements
            .lock()
            .iter()
            .map(|(_, element)| element.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl HintSink for HeadHintRegistry {
    fn insert(&self, hint: &PreloadHint) {
        let mut elements = self.elements.lock();
        if elements.iter().any(|(id, _)| *id == hint.hint_id) {
            return;
        }
        trace!(id = %hint.hint_id, "Appending hint element");
        elements.push((hint.hint_id.clone(), hint.to_markup()));
    }

    fn remove(&self, id: &ImageId) {
        self.elements.lock().retain(|(existing, _)| existing != id);
    }

    fn contains(&self, id: &ImageId) -> bool {
        self.elements.lock().iter().any(|(existing, _)| existing == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_order_and_dedupes() {
        let head = HeadHintRegistry::new();
        let first = PreloadHint::preload("https://a.test/1.jpg", true);
        let second = PreloadHint::preload("https://a.test/2.jpg", false);

        head.insert(&first);
        head.insert(&second);
        head.insert(&first);

        assert_eq!(head.len(), 2);
        let markup = head.markup();
        let lines: Vec<&str> = markup.lines().collect();
        assert!(lines[0].contains("1.jpg"));
        assert!(lines[1].contains("2.jpg"));
    }

    #[test]
    fn test_remove() {
        let head = HeadHintRegistry::new();
        let hint = PreloadHint::preload("https://a.test/1.jpg", false);
        head.insert(&hint);
        assert!(head.contains(&hint.hint_id));

        head.remove(&hint.hint_id);
        assert!(head.is_empty());
    }
}
