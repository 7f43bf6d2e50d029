//! Rectangles and CSS-style margins used for viewport intersection.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Axis-aligned rectangle in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Area, zero for degenerate rectangles.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Overlap of two rectangles, if they touch.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right < left || bottom < top {
            return None;
        }
        Some(Self::new(left, top, right - left, bottom - top))
    }

    /// Grows the rectangle by a margin; percentages resolve against this rectangle.
    #[must_use]
    pub fn expand(&self, margin: &RootMargin) -> Self {
        let top = margin.top.resolve(self.height);
        let right = margin.right.resolve(self.width);
        let bottom = margin.bottom.resolve(self.height);
        let left = margin.left.resolve(self.width);
        Self::new(
            self.x - left,
            self.y - top,
            self.width + left + right,
            self.height + top + bottom,
        )
    }
}

/// One intersection observation delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionRecord {
    /// Bounds of the observed element.
    pub target: Rect,
    /// Bounds of the viewport, before margins.
    pub root: Rect,
}

impl IntersectionRecord {
    /// Fraction of the target inside the root expanded by `margin`.
    ///
    /// A zero-area target counts as fully visible when it lies inside.
    #[must_use]
    pub fn visible_ratio(&self, margin: &RootMargin) -> f64 {
        let root = self.root.expand(margin);
        let Some(overlap) = self.target.intersection(&root) else {
            return 0.0;
        };
        let area = self.target.area();
        if area <= 0.0 {
            return 1.0;
        }
        (overlap.area() / area).clamp(0.0, 1.0)
    }
}

/// One side of a margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginValue {
    /// Absolute pixels.
    Px(f64),
    /// Percentage of the viewport along the same axis.
    Percent(f64),
}

impl MarginValue {
    fn resolve(self, extent: f64) -> f64 {
        match self {
            Self::Px(px) => px,
            Self::Percent(pct) => extent * pct / 100.0,
        }
    }
}

impl std::fmt::Display for MarginValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Px(v) => write!(f, "{v}px"),
            Self::Percent(v) => write!(f, "{v}%"),
        }
    }
}

/// Error parsing a root margin string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum RootMarginError {
    #[error("root margin must have 1 to 4 values, got {0}")]
    WrongArity(usize),
    #[error("invalid margin value {0:?}: expected <number>px or <number>%")]
    InvalidValue(String),
}

/// CSS-style margin around the viewport, e.g. `"100px"` or `"10px 5% 0px 5%"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootMargin {
    /// Top margin.
    pub top: MarginValue,
    /// Right margin.
    pub right: MarginValue,
    /// Bottom margin.
    pub bottom: MarginValue,
    /// Left margin.
    pub left: MarginValue,
}

impl RootMargin {
    /// Same pixel margin on every side.
    #[must_use]
    pub const fn uniform_px(px: f64) -> Self {
        let value = MarginValue::Px(px);
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

impl Default for RootMargin {
    fn default() -> Self {
        Self::uniform_px(100.0)
    }
}

impl FromStr for RootMargin {
    type Err = RootMarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split_whitespace()
            .map(parse_margin_value)
            .collect::<Result<Vec<_>, _>>()?;

        match values.as_slice() {
            [all] => Ok(Self {
                top: *all,
                right: *all,
                bottom: *all,
                left: *all,
            }),
            [vertical, horizontal] => Ok(Self {
                top: *vertical,
                right: *horizontal,
                bottom: *vertical,
                left: *horizontal,
            }),
            [top, horizontal, bottom] => Ok(Self {
                top: *top,
                right: *horizontal,
                bottom: *bottom,
                left: *horizontal,
            }),
            [top, right, bottom, left] => Ok(Self {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            other => Err(RootMarginError::WrongArity(other.len())),
        }
    }
}

fn parse_margin_value(raw: &str) -> Result<MarginValue, RootMarginError> {
    let invalid = || RootMarginError::InvalidValue(raw.to_string());
    if let Some(number) = raw.strip_suffix("px") {
        number.parse().map(MarginValue::Px).map_err(|_| invalid())
    } else if let Some(number) = raw.strip_suffix('%') {
        number.parse().map(MarginValue::Percent).map_err(|_| invalid())
    } else if raw == "0" {
        Ok(MarginValue::Px(0.0))
    } else {
        Err(invalid())
    }
}

impl std::fmt::Display for RootMargin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.top, self.right, self.bottom, self.left)
    }
}

impl Serialize for RootMargin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RootMargin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_single_value() -> Result<(), RootMarginError> {
        let margin: RootMargin = "100px".parse()?;
        assert_eq!(margin, RootMargin::uniform_px(100.0));
        Ok(())
    }

    #[test]
    fn test_parse_two_values() -> Result<(), RootMarginError> {
        let margin: RootMargin = "10px 5%".parse()?;
        assert_eq!(margin.top, MarginValue::Px(10.0));
        assert_eq!(margin.left, MarginValue::Percent(5.0));
        assert_eq!(margin.right, MarginValue::Percent(5.0));
        Ok(())
    }

    #[test_case("" ; "empty")]
    #[test_case("1px 2px 3px 4px 5px" ; "too_many")]
    #[test_case("10em" ; "bad_unit")]
    #[test_case("px" ; "no_number")]
    fn test_parse_rejects(raw: &str) {
        assert!(raw.parse::<RootMargin>().is_err());
    }

    #[test]
    fn test_expand_by_percent_uses_axis() -> Result<(), RootMarginError> {
        let viewport = Rect::new(0.0, 0.0, 1000.0, 500.0);
        let expanded = viewport.expand(&"10%".parse()?);
        assert!((expanded.y + 50.0).abs() < f64::EPSILON);
        assert!((expanded.x + 100.0).abs() < f64::EPSILON);
        assert!((expanded.height - 600.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_visible_ratio_with_margin() {
        let record = IntersectionRecord {
            target: Rect::new(0.0, 850.0, 100.0, 100.0),
            root: Rect::new(0.0, 0.0, 1000.0, 800.0),
        };
        assert!(record.visible_ratio(&RootMargin::uniform_px(0.0)).abs() < f64::EPSILON);
        let ratio = record.visible_ratio(&RootMargin::uniform_px(100.0));
        assert!((ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_intersection() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        let overlap = a.intersection(&b);
        assert_eq!(overlap, Some(Rect::new(50.0, 50.0, 50.0, 50.0)));
        assert_eq!(a.intersection(&Rect::new(200.0, 0.0, 10.0, 10.0)), None);
    }
}
