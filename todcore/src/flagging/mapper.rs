use ndarray::s;

use crate::data::cube::FlagCube;
use crate::data::region::{RectRegion, RegionPolarity};

/// What a region gesture does to the flag cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionAction {
    /// Add one flag layer to every cell in the range.
    Flag,
    /// Add one unflag marker (`-1`) to every cell in the range.
    Unflag,
    /// Zero only cells holding unflag markers, leaving flagged cells
    /// untouched, so overlapping flag and unflag gestures cancel only
    /// their own class.
    UnflagOverlap,
    /// Remove one layer of magnitude from every cell, never crossing zero.
    /// Overlapping regions can be deleted independently without erasing
    /// flags contributed by the others.
    Delete,
}

/// Apply a region action to the flag cube.
///
/// The region carries its own scan index and inclusive cell ranges; see
/// [`RectRegion::from_corners`] for how drag corners become ranges.
pub fn apply_action(flags: &mut FlagCube, region: &RectRegion, action: RegionAction) {
    let mut slice = flags.data.slice_mut(s![
        region.scan,
        region.y_lo..=region.y_hi,
        region.x_lo..=region.x_hi
    ]);
    match action {
        RegionAction::Flag => slice.mapv_inplace(|c| c + 1),
        RegionAction::Unflag => slice.mapv_inplace(|c| c - 1),
        RegionAction::UnflagOverlap => slice.mapv_inplace(|c| c.max(0)),
        RegionAction::Delete => slice.mapv_inplace(|c| c - c.signum()),
    }
}

/// Apply a freshly drawn region according to its polarity.
pub fn apply_region(flags: &mut FlagCube, region: &RectRegion) {
    let action = match region.polarity {
        RegionPolarity::Flag => RegionAction::Flag,
        RegionPolarity::Unflag => RegionAction::Unflag,
    };
    apply_action(flags, region, action);
}

/// Undo a previously applied region.
///
/// Flag regions lose one layer of magnitude per cell; unflag regions have
/// their markers zeroed without touching positively flagged cells.
pub fn delete_region(flags: &mut FlagCube, region: &RectRegion) {
    let action = match region.polarity {
        RegionPolarity::Flag => RegionAction::Delete,
        RegionPolarity::Unflag => RegionAction::UnflagOverlap,
    };
    apply_action(flags, region, action);
}

/// Flag a single cell (a click rather than a drag).
pub fn flag_point(flags: &mut FlagCube, scan: usize, time: usize, bolo: usize) {
    flags.data[[scan, time, bolo]] += 1;
}

/// Remove one flag layer from a single cell, clamped at zero.
pub fn unflag_point(flags: &mut FlagCube, scan: usize, time: usize, bolo: usize) {
    let c = &mut flags.data[[scan, time, bolo]];
    if *c > 0 {
        *c -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::region::RegionPolarity;

    fn rect(scan: usize, x: (usize, usize), y: (usize, usize), polarity: RegionPolarity) -> RectRegion {
        RectRegion {
            scan,
            x_lo: x.0,
            x_hi: x.1,
            y_lo: y.0,
            y_hi: y.1,
            polarity,
        }
    }

    #[test]
    fn test_flag_then_delete_restores_cube() {
        // spec scenario: (1, 4, 4) cube, flag rows 1-2 x cols 1-2
        let mut flags = FlagCube::zeros((1, 4, 4));
        let region = rect(0, (1, 2), (1, 2), RegionPolarity::Flag);

        apply_region(&mut flags, &region);
        assert_eq!(flags.flagged_count(), 4);
        for y in 1..=2 {
            for x in 1..=2 {
                assert_eq!(flags.data[[0, y, x]], 1);
            }
        }
        assert_eq!(flags.data[[0, 0, 0]], 0);
        assert_eq!(flags.data[[0, 3, 3]], 0);

        delete_region(&mut flags, &region);
        assert!(flags.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_overlapping_regions_delete_independently() {
        let mut flags = FlagCube::zeros((1, 4, 4));
        let a = rect(0, (0, 2), (0, 2), RegionPolarity::Flag);
        let b = rect(0, (1, 3), (1, 3), RegionPolarity::Flag);

        apply_region(&mut flags, &a);
        apply_region(&mut flags, &b);
        assert_eq!(flags.data[[0, 1, 1]], 2);

        // deleting a leaves b's contribution in the overlap
        delete_region(&mut flags, &a);
        assert_eq!(flags.data[[0, 1, 1]], 1);
        assert_eq!(flags.data[[0, 0, 0]], 0);
        assert_eq!(flags.data[[0, 3, 3]], 1);

        delete_region(&mut flags, &b);
        assert!(flags.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_unflag_markers_cancel_only_their_class() {
        let mut flags = FlagCube::zeros((1, 3, 3));
        let flagged = rect(0, (0, 1), (0, 1), RegionPolarity::Flag);
        let unflag = rect(0, (1, 2), (1, 2), RegionPolarity::Unflag);

        apply_region(&mut flags, &flagged);
        apply_region(&mut flags, &unflag);

        // overlap cell lost its flag layer, untouched unflag cells go negative
        assert_eq!(flags.data[[0, 1, 1]], 0);
        assert_eq!(flags.data[[0, 2, 2]], -1);
        assert_eq!(flags.data[[0, 0, 0]], 1);

        // removing the unflag region clears markers but not flags
        delete_region(&mut flags, &unflag);
        assert_eq!(flags.data[[0, 2, 2]], 0);
        assert_eq!(flags.data[[0, 0, 0]], 1);
    }

    #[test]
    fn test_delete_never_crosses_zero() {
        let mut flags = FlagCube::zeros((1, 2, 2));
        flags.data[[0, 0, 0]] = 2;
        flags.data[[0, 0, 1]] = -1;
        let region = rect(0, (0, 1), (0, 1), RegionPolarity::Flag);

        apply_action(&mut flags, &region, RegionAction::Delete);
        assert_eq!(flags.data[[0, 0, 0]], 1);
        assert_eq!(flags.data[[0, 0, 1]], 0);
        assert_eq!(flags.data[[0, 1, 0]], 0);

        apply_action(&mut flags, &region, RegionAction::Delete);
        apply_action(&mut flags, &region, RegionAction::Delete);
        assert!(flags.data.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_point_flagging() {
        let mut flags = FlagCube::zeros((2, 3, 3));
        flag_point(&mut flags, 1, 2, 0);
        flag_point(&mut flags, 1, 2, 0);
        assert_eq!(flags.data[[1, 2, 0]], 2);

        unflag_point(&mut flags, 1, 2, 0);
        assert_eq!(flags.data[[1, 2, 0]], 1);

        // unflagging a clear cell is a no-op
        unflag_point(&mut flags, 0, 0, 0);
        assert_eq!(flags.data[[0, 0, 0]], 0);
    }
}
