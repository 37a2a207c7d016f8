use ndarray::s;

use crate::data::cube::FlagCube;
use crate::data::region::{LineAxis, LineFlag};

/// Flag an entire bolometer column of one scan and return the line record
/// to keep in the per-scan line list.
pub fn flag_bolometer(flags: &mut FlagCube, scan: usize, bolo: usize) -> LineFlag {
    flags
        .data
        .slice_mut(s![scan, .., bolo])
        .mapv_inplace(|c| c + 1);
    LineFlag {
        scan,
        axis: LineAxis::Bolometer,
        index: bolo,
    }
}

/// Flag an entire timepoint row of one scan.
pub fn flag_timepoint(flags: &mut FlagCube, scan: usize, time: usize) -> LineFlag {
    flags
        .data
        .slice_mut(s![scan, time, ..])
        .mapv_inplace(|c| c + 1);
    LineFlag {
        scan,
        axis: LineAxis::Time,
        index: time,
    }
}

/// Undo one layer of flagging along a bolometer column.
///
/// While the column still holds a positive cell, every positive cell is
/// decremented by one, clamped at zero. A fully clear column is left alone.
pub fn unflag_bolometer(flags: &mut FlagCube, scan: usize, bolo: usize) {
    let mut line = flags.data.slice_mut(s![scan, .., bolo]);
    if line.iter().any(|&c| c > 0) {
        line.mapv_inplace(|c| if c > 0 { c - 1 } else { c });
    }
}

/// Undo one layer of flagging along a timepoint row.
pub fn unflag_timepoint(flags: &mut FlagCube, scan: usize, time: usize) {
    let mut line = flags.data.slice_mut(s![scan, time, ..]);
    if line.iter().any(|&c| c > 0) {
        line.mapv_inplace(|c| if c > 0 { c - 1 } else { c });
    }
}
