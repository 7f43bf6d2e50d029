use serde::{Deserialize, Serialize};

/// Declared loading priority of an image.
///
/// Ordered from most to least urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Largest above-the-fold image, loaded first and sequentially.
    Hero,
    /// Visible without scrolling.
    AboveFold,
    /// Needed soon but not immediately visible.
    Critical,
    /// Loaded when the user hovers its trigger.
    OnHover,
    /// Loaded when scrolled near the viewport.
    #[default]
    Lazy,
}

impl PriorityClass {
    /// Classes that load without waiting for visibility.
    #[must_use]
    pub const fn is_eager(self) -> bool {
        matches!(self, Self::Hero | Self::AboveFold | Self::Critical)
    }

    /// Classes whose requests use the priority fetch path.
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::Hero | Self::AboveFold)
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hero => write!(f, "hero"),
            Self::AboveFold => write!(f, "above_fold"),
            Self::Critical => write!(f, "critical"),
            Self::OnHover => write!(f, "on_hover"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_matches_urgency() {
        assert!(PriorityClass::Hero < PriorityClass::AboveFold);
        assert!(PriorityClass::AboveFold < PriorityClass::Critical);
        assert!(PriorityClass::Critical < PriorityClass::OnHover);
        assert!(PriorityClass::OnHover < PriorityClass::Lazy);
    }

    #[test]
    fn test_eager_classes() {
        assert!(PriorityClass::Critical.is_eager());
        assert!(!PriorityClass::OnHover.is_eager());
        assert!(!PriorityClass::Lazy.is_high());
    }
}
