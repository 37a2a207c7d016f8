use thiserror::Error;

/// Errors raised by the flagging core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("scan index {scan} out of range, dataset has {nscans} scans")]
    ScanOutOfRange { scan: usize, nscans: usize },

    #[error("flag cube shape {flags:?} does not match sample cube shape {samples:?}")]
    ShapeMismatch {
        samples: (usize, usize, usize),
        flags: (usize, usize, usize),
    },

    #[error("index table shape {index:?} does not match sample cube shape {samples:?}")]
    IndexTableMismatch {
        samples: (usize, usize, usize),
        index: (usize, usize, usize),
    },
}

/// Errors raised by the re-gridding routine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridmapError {
    #[error("gridmap requires at least one input point")]
    EmptyInput,

    #[error("gridmap coordinate/value slices differ in length: x={x}, y={y}, v={v}")]
    LengthMismatch { x: usize, y: usize, v: usize },

    #[error("gridmap requires a positive downsample factor")]
    ZeroDownsampleFactor,

    #[error("gridmap input contains a non-finite coordinate")]
    NonFiniteCoordinate,
}
