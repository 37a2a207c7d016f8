use thiserror::Error;

/// Errors raised while reading or writing timestream containers.
#[derive(Error, Debug)]
pub enum TodIoError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a flag container: bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("container section {0:?} is missing")]
    MissingSection(String),

    #[error("section {name:?} has {got} elements, dimensions imply {expected}")]
    SectionSizeMismatch {
        name: String,
        got: usize,
        expected: usize,
    },

    #[error("section {name:?} has unexpected element type code {got}")]
    SectionTypeMismatch { name: String, got: u8 },

    #[error("header record error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filename {0:?} does not match the expected timestream layout")]
    FilenamePattern(String),

    #[error(transparent)]
    Core(#[from] todcore::error::CoreError),
}
