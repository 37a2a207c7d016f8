use itertools::izip;
use ndarray::{s, Array2, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::cube::{MapImage, SampleToMapIndex};

/// Shape of the map image, fixing the flattened-index convention.
///
/// One convention is applied uniformly: `index = row * width + col`,
/// `row = index / width` (truncating integer division) and
/// `col = index % width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapGeometry {
    pub height: usize,
    pub width: usize,
}

impl MapGeometry {
    pub fn of(map: &MapImage) -> Self {
        MapGeometry {
            height: map.height(),
            width: map.width(),
        }
    }

    pub fn flatten(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn unflatten(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.height && col < self.width
    }
}

/// Position of one sample in the cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleIndex {
    pub scan: usize,
    pub time: usize,
    pub bolometer: usize,
}

/// All samples projecting onto one map pixel, optionally restricted to a
/// single scan. The full-table search runs scans in parallel.
pub fn samples_at_pixel(
    table: &SampleToMapIndex,
    geometry: MapGeometry,
    row: usize,
    col: usize,
    scan_filter: Option<usize>,
) -> Vec<SampleIndex> {
    let target = geometry.flatten(row, col);
    let (nscans, _, _) = table.data.dim();

    let scan_hits = |scan: usize| -> Vec<SampleIndex> {
        table
            .data
            .slice(s![scan, .., ..])
            .indexed_iter()
            .filter(|&(_, &idx)| idx == target)
            .map(|((time, bolometer), _)| SampleIndex {
                scan,
                time,
                bolometer,
            })
            .collect()
    };

    match scan_filter {
        Some(scan) if scan < nscans => scan_hits(scan),
        Some(_) => Vec::new(),
        None => (0..nscans)
            .into_par_iter()
            .flat_map_iter(scan_hits)
            .collect(),
    }
}

/// Map positions of every bolometer at one timepoint of a scan, the
/// instantaneous array footprint.
pub fn footprint(
    table: &SampleToMapIndex,
    geometry: MapGeometry,
    scan: usize,
    time: usize,
) -> Vec<(usize, usize)> {
    table
        .data
        .slice(s![scan, time, ..])
        .iter()
        .map(|&idx| geometry.unflatten(idx))
        .collect()
}

/// Bounding box `((row_min, row_max), (col_min, col_max))` of all map
/// pixels touched by a scan, used to zoom the map viewport onto it.
pub fn scan_extent(
    table: &SampleToMapIndex,
    geometry: MapGeometry,
    scan: usize,
) -> ((usize, usize), (usize, usize)) {
    let slice = table.data.slice(s![scan, .., ..]);
    let mut rows = (usize::MAX, 0);
    let mut cols = (usize::MAX, 0);
    for &idx in slice.iter() {
        let (row, col) = geometry.unflatten(idx);
        rows = (rows.0.min(row), rows.1.max(row));
        cols = (cols.0.min(col), cols.1.max(col));
    }
    (rows, cols)
}

/// Project one bolometer's samples through the index table into a
/// map-shaped raster, averaging colliding samples by hit count. Pixels the
/// bolometer never visits stay NaN.
pub fn bolometer_map(
    samples: &Array3<f64>,
    table: &SampleToMapIndex,
    geometry: MapGeometry,
    bolometer: usize,
) -> Array2<f64> {
    let mut accum = Array2::<f64>::zeros((geometry.height, geometry.width));
    let mut hits = Array2::<f64>::zeros((geometry.height, geometry.width));

    let values = samples.slice(s![.., .., bolometer]);
    let indices = table.data.slice(s![.., .., bolometer]);
    for (&v, &idx) in izip!(values.iter(), indices.iter()) {
        let (row, col) = geometry.unflatten(idx);
        if geometry.contains(row, col) {
            accum[[row, col]] += v;
            hits[[row, col]] += 1.0;
        }
    }

    accum.zip_mut_with(&hits, |a, &h| {
        *a = if h > 0.0 { *a / h } else { f64::NAN };
    });
    accum
}
