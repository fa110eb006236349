//! Geometric primitives for positionally-tokenized pages.
//!
//! Tabular structure in this crate is axis-aligned: columns are horizontal
//! intervals and rows are vertical intervals. The primitives here are the
//! two 1-D spans and the overlap math the pipeline stages share.

use serde::{Deserialize, Serialize};

/// A horizontal interval `[x0, x1]` in page coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HSpan {
    /// Left edge.
    pub x0: f32,
    /// Right edge.
    pub x1: f32,
}

impl HSpan {
    /// Creates a new horizontal span. The edges are normalized so that
    /// `x0 <= x1`.
    pub fn new(x0: f32, x1: f32) -> Self {
        if x0 <= x1 {
            Self { x0, x1 }
        } else {
            Self { x0: x1, x1: x0 }
        }
    }

    /// Width of the span.
    #[inline]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Horizontal midpoint.
    #[inline]
    pub fn center(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    /// Length of the overlap with another span, zero when disjoint.
    pub fn overlap_len(&self, other: &HSpan) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Returns true when `other` lies entirely within this span.
    pub fn contains(&self, other: &HSpan) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1
    }
}

/// A vertical interval `[top, bottom]` in page coordinates (top < bottom,
/// y grows downward).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VSpan {
    /// Upper edge.
    pub top: f32,
    /// Lower edge.
    pub bottom: f32,
}

impl VSpan {
    /// Creates a new vertical span. The edges are normalized so that
    /// `top <= bottom`.
    pub fn new(top: f32, bottom: f32) -> Self {
        if top <= bottom {
            Self { top, bottom }
        } else {
            Self {
                top: bottom,
                bottom: top,
            }
        }
    }

    /// Height of the span.
    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Vertical center.
    #[inline]
    pub fn center(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// Length of the overlap with another span, zero when disjoint.
    pub fn overlap_len(&self, other: &VSpan) -> f32 {
        (self.bottom.min(other.bottom) - self.top.max(other.top)).max(0.0)
    }

    /// Returns true when the two spans overlap by any positive amount.
    pub fn intersects(&self, other: &VSpan) -> bool {
        self.overlap_len(other) > 0.0
    }

    /// Smallest span covering both.
    pub fn union(&self, other: &VSpan) -> VSpan {
        VSpan {
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Overlap as a fraction of the shorter span's height. Zero when either
    /// span is degenerate.
    pub fn overlap_ratio(&self, other: &VSpan) -> f32 {
        let shorter = self.height().min(other.height());
        if shorter <= 0.0 {
            return 0.0;
        }
        self.overlap_len(other) / shorter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hspan_normalizes_swapped_edges() {
        let s = HSpan::new(10.0, 4.0);
        assert_eq!(s.x0, 4.0);
        assert_eq!(s.x1, 10.0);
    }

    #[test]
    fn hspan_overlap() {
        let a = HSpan::new(0.0, 10.0);
        let b = HSpan::new(6.0, 20.0);
        let c = HSpan::new(12.0, 14.0);
        assert_eq!(a.overlap_len(&b), 4.0);
        assert_eq!(a.overlap_len(&c), 0.0);
        assert!(a.contains(&HSpan::new(2.0, 8.0)));
        assert!(!a.contains(&b));
    }

    #[test]
    fn vspan_union_and_center() {
        let a = VSpan::new(10.0, 20.0);
        let b = VSpan::new(18.0, 30.0);
        let u = a.union(&b);
        assert_eq!(u.top, 10.0);
        assert_eq!(u.bottom, 30.0);
        assert_eq!(a.center(), 15.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&VSpan::new(25.0, 30.0)));
    }

    #[test]
    fn vspan_overlap_ratio_uses_shorter_span() {
        let tall = VSpan::new(0.0, 100.0);
        let short = VSpan::new(40.0, 50.0);
        assert_eq!(tall.overlap_ratio(&short), 1.0);

        let half = VSpan::new(95.0, 105.0);
        assert!((tall.overlap_ratio(&half) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_vspan_ratio_is_zero() {
        let point = VSpan::new(5.0, 5.0);
        let other = VSpan::new(0.0, 10.0);
        assert_eq!(point.overlap_ratio(&other), 0.0);
    }
}
