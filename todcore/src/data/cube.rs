use std::fmt;
use std::fmt::Formatter;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Integer flag cube, same shape as the sample cube it annotates.
///
/// A cell value `> 0` means the sample is flagged that many times, so
/// overlapping flag regions accumulate and can be removed one layer at a
/// time. Negative values are in-memory unflag markers; they never reach
/// disk, the save path clamps the cube to zero first.
#[derive(Clone, Debug, PartialEq)]
pub struct FlagCube {
    pub data: Array3<i32>,
}

impl FlagCube {
    pub fn new(data: Array3<i32>) -> Self {
        FlagCube { data }
    }

    /// All-zero flag cube for a `(nscans, scanlen, nbolos)` sample cube.
    pub fn zeros(shape: (usize, usize, usize)) -> Self {
        FlagCube {
            data: Array3::zeros(shape),
        }
    }

    pub fn nscans(&self) -> usize {
        self.data.dim().0
    }

    pub fn scanlen(&self) -> usize {
        self.data.dim().1
    }

    pub fn nbolos(&self) -> usize {
        self.data.dim().2
    }

    /// Check that this cube annotates a sample cube of the given shape.
    pub fn check_shape(&self, samples: (usize, usize, usize)) -> Result<(), CoreError> {
        if self.data.dim() != samples {
            return Err(CoreError::ShapeMismatch {
                samples,
                flags: self.data.dim(),
            });
        }
        Ok(())
    }

    /// Copy of the cube with unflag markers clamped away, the form that is
    /// written to disk.
    pub fn clamped(&self) -> Array3<i32> {
        self.data.mapv(|c| c.max(0))
    }

    /// Number of cells carrying at least one flag layer.
    pub fn flagged_count(&self) -> usize {
        self.data.iter().filter(|&&c| c > 0).count()
    }
}

impl fmt::Display for FlagCube {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (nscans, scanlen, nbolos) = self.data.dim();
        write!(
            f,
            "FlagCube(scans: {}, scanlen: {}, bolos: {}, flagged: {})",
            nscans,
            scanlen,
            nbolos,
            self.flagged_count()
        )
    }
}

/// 2-D spatial map the samples project onto.
#[derive(Clone, Debug, PartialEq)]
pub struct MapImage {
    pub data: Array2<f64>,
}

impl MapImage {
    pub fn new(data: Array2<f64>) -> Self {
        MapImage { data }
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    /// Replace NaN pixels by zero. Legacy maps store unobserved pixels as
    /// NaN, which would poison every statistic downstream.
    pub fn zero_nans(&mut self) {
        self.data.mapv_inplace(|p| if p.is_nan() { 0.0 } else { p });
    }
}

/// Per-sample lookup table of flattened map indices, same shape as the
/// sample cube. Each entry is `row * map_width + col`.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleToMapIndex {
    pub data: Array3<usize>,
}

impl SampleToMapIndex {
    pub fn new(data: Array3<usize>) -> Self {
        SampleToMapIndex { data }
    }

    pub fn check_shape(&self, samples: (usize, usize, usize)) -> Result<(), CoreError> {
        if self.data.dim() != samples {
            return Err(CoreError::IndexTableMismatch {
                samples,
                index: self.data.dim(),
            });
        }
        Ok(())
    }
}

/// Which derived timestream is shown and flagged against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestreamSignal {
    /// Sky-subtracted bolometer signal, `(ac_bolos - atmosphere) * scalearr`.
    SkySub,
    AstroSignal,
    Atmosphere,
    AcBolos,
    DcBolos,
    Scale,
    Raw,
    RawScaled,
}

impl Default for TimestreamSignal {
    fn default() -> Self {
        TimestreamSignal::SkySub
    }
}

/// Named component cubes of a structured save file, all `[scan, time,
/// bolometer]` and co-registered with the flag cube.
#[derive(Clone, Debug)]
pub struct TimestreamComponents {
    pub raw: Array3<f64>,
    pub astrosignal: Array3<f64>,
    pub atmosphere: Array3<f64>,
    pub ac_bolos: Array3<f64>,
    pub dc_bolos: Array3<f64>,
    pub scalearr: Array3<f64>,
    pub weight: Array3<f64>,
}

impl TimestreamComponents {
    pub fn shape(&self) -> (usize, usize, usize) {
        self.raw.dim()
    }

    /// Derive the displayed sample cube for one signal selection.
    ///
    /// `AstroSignal` falls back to the sky-subtracted default when the
    /// astrosignal component is identically zero, as unreduced save files
    /// ship it empty.
    pub fn select(&self, signal: TimestreamSignal) -> Array3<f64> {
        match signal {
            TimestreamSignal::SkySub => (&self.ac_bolos - &self.atmosphere) * &self.scalearr,
            TimestreamSignal::AstroSignal => {
                if self.astrosignal.iter().all(|&v| v == 0.0) {
                    (&self.ac_bolos - &self.atmosphere) * &self.scalearr
                } else {
                    &self.astrosignal * &self.scalearr
                }
            }
            TimestreamSignal::Atmosphere => &self.atmosphere * &self.scalearr,
            TimestreamSignal::AcBolos => &self.ac_bolos * &self.scalearr,
            TimestreamSignal::DcBolos => &self.dc_bolos * &self.scalearr,
            TimestreamSignal::Scale => self.scalearr.clone(),
            TimestreamSignal::Raw => self.raw.clone(),
            TimestreamSignal::RawScaled => &self.raw * &self.scalearr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;

    #[test]
    fn test_clamped_removes_unflag_markers() {
        let mut flags = FlagCube::zeros((1, 2, 2));
        flags.data[[0, 0, 0]] = 3;
        flags.data[[0, 1, 1]] = -2;

        let clamped = flags.clamped();
        assert_eq!(clamped[[0, 0, 0]], 3);
        assert_eq!(clamped[[0, 1, 1]], 0);
        // the in-memory cube keeps its markers
        assert_eq!(flags.data[[0, 1, 1]], -2);
    }

    #[test]
    fn test_shape_check() {
        let flags = FlagCube::zeros((2, 3, 4));
        assert!(flags.check_shape((2, 3, 4)).is_ok());
        assert!(flags.check_shape((2, 3, 5)).is_err());
    }

    #[test]
    fn test_signal_selection() {
        let ones = arr3(&[[[1.0, 1.0]]]);
        let components = TimestreamComponents {
            raw: arr3(&[[[4.0, 8.0]]]),
            astrosignal: arr3(&[[[0.0, 0.0]]]),
            atmosphere: arr3(&[[[1.0, 2.0]]]),
            ac_bolos: arr3(&[[[3.0, 5.0]]]),
            dc_bolos: ones.clone(),
            scalearr: arr3(&[[[2.0, 2.0]]]),
            weight: ones,
        };

        let skysub = components.select(TimestreamSignal::SkySub);
        assert_eq!(skysub[[0, 0, 0]], 4.0);
        assert_eq!(skysub[[0, 0, 1]], 6.0);

        // empty astrosignal falls back to the sky-subtracted cube
        let astro = components.select(TimestreamSignal::AstroSignal);
        assert_eq!(astro, skysub);

        let raw_scaled = components.select(TimestreamSignal::RawScaled);
        assert_eq!(raw_scaled[[0, 0, 1]], 16.0);
    }
}
