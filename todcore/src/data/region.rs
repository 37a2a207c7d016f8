use serde::{Deserialize, Serialize};

/// Whether a region marks samples as bad or retracts earlier markings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionPolarity {
    Flag,
    Unflag,
}

/// Axis-aligned rectangle of flag-cube cells in one scan, stored as
/// inclusive cell ranges. `x` runs along bolometers, `y` along timepoints.
///
/// Regions are the system of record for what the user has drawn: rendering
/// is a read-only projection of the per-scan region list, and deleting a
/// region replays its inverse onto the flag cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectRegion {
    pub scan: usize,
    pub x_lo: usize,
    pub x_hi: usize,
    pub y_lo: usize,
    pub y_hi: usize,
    pub polarity: RegionPolarity,
}

impl RectRegion {
    /// Build a region from the two corner points of a drag gesture.
    ///
    /// Corners round to the nearest cell and normalize to inclusive
    /// `[lo, hi]` ranges clamped to the scan slice; a degenerate drag along
    /// an axis collapses that axis to exactly one cell so the region still
    /// affects at least one sample and remains hit-testable.
    pub fn from_corners(
        (x1, y1): (f64, f64),
        (x2, y2): (f64, f64),
        polarity: RegionPolarity,
        scan: usize,
        scanlen: usize,
        nbolos: usize,
    ) -> Self {
        let (x_lo, x_hi) = Self::cell_range(x1, x2, nbolos);
        let (y_lo, y_hi) = Self::cell_range(y1, y2, scanlen);
        RectRegion {
            scan,
            x_lo,
            x_hi,
            y_lo,
            y_hi,
            polarity,
        }
    }

    fn cell_range(a: f64, b: f64, len: usize) -> (usize, usize) {
        let last = len.saturating_sub(1);
        let ai = (a.round().max(0.0) as usize).min(last);
        let bi = (b.round().max(0.0) as usize).min(last);
        (ai.min(bi), ai.max(bi))
    }

    /// Hit-test a cursor position with half-cell tolerance.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_lo as f64 - 0.5
            && x <= self.x_hi as f64 + 0.5
            && y >= self.y_lo as f64 - 0.5
            && y <= self.y_hi as f64 + 0.5
    }

    pub fn width(&self) -> usize {
        self.x_hi - self.x_lo + 1
    }

    pub fn height(&self) -> usize {
        self.y_hi - self.y_lo + 1
    }
}

/// Which cube axis a line flag spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineAxis {
    /// Fixed bolometer, all timepoints of the scan.
    Bolometer,
    /// Fixed timepoint, all bolometers of the scan.
    Time,
}

/// A whole-column or whole-row flag in one scan.
///
/// Lines are identified for removal by exact match on the fixed coordinate,
/// not by overlap containment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFlag {
    pub scan: usize,
    pub axis: LineAxis,
    pub index: usize,
}

impl LineFlag {
    pub fn matches(&self, axis: LineAxis, index: usize) -> bool {
        self.axis == axis && self.index == index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corners_normalize_and_clamp() {
        let r = RectRegion::from_corners(
            (3.6, 7.2),
            (1.2, 2.8),
            RegionPolarity::Flag,
            0,
            10,
            5,
        );
        assert_eq!((r.x_lo, r.x_hi), (1, 4));
        assert_eq!((r.y_lo, r.y_hi), (3, 7));

        // off-grid corners clamp to the slice
        let r = RectRegion::from_corners(
            (-2.0, 0.0),
            (99.0, 99.0),
            RegionPolarity::Flag,
            0,
            10,
            5,
        );
        assert_eq!((r.x_lo, r.x_hi), (0, 4));
        assert_eq!((r.y_lo, r.y_hi), (0, 9));
    }

    #[test]
    fn test_degenerate_drag_covers_one_cell() {
        let r = RectRegion::from_corners(
            (2.0, 5.0),
            (2.0, 5.0),
            RegionPolarity::Unflag,
            1,
            10,
            5,
        );
        assert_eq!(r.width(), 1);
        assert_eq!(r.height(), 1);
        assert!(r.contains(2.3, 4.8));
        assert!(!r.contains(3.0, 5.0));
    }

    #[test]
    fn test_line_exact_match() {
        let line = LineFlag {
            scan: 0,
            axis: LineAxis::Bolometer,
            index: 7,
        };
        assert!(line.matches(LineAxis::Bolometer, 7));
        assert!(!line.matches(LineAxis::Bolometer, 6));
        assert!(!line.matches(LineAxis::Time, 7));
    }
}
