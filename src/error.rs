use thiserror::Error;

/// Errors surfaced by the decode and cache layers.
#[derive(Error, Debug)]
pub enum ImfcsError {
    #[error("sheet not found: {name}")]
    MissingTable { name: String },

    #[error("parameter not found in first column: {name}")]
    ParameterNotFound { name: String },

    #[error("cell is not numeric: {value:?}")]
    NumericParse { value: String },

    #[error("{count} files match the {role} role (exactly one required)")]
    AmbiguousFile { role: &'static str, count: usize },

    #[error("field '{name}' has not been loaded")]
    FieldNotLoaded { name: String },

    #[error("unknown field: {name}")]
    UnknownField { name: String },

    #[error("ROI rectangle is missing")]
    InvalidRoi,

    #[error("index out of range: {index} (collection has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("array dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("snapshot version {0} is newer than this build understands")]
    UnsupportedVersion(u32),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ImfcsError>;
