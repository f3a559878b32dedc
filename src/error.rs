// Error types for the filter-and-render engine

use thiserror::Error;

/// Errors reported to the caller of a render.
///
/// A failing render never produces partial output; the error carries enough
/// detail (chart type, format, axis) to diagnose the request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("Unsupported chart_type: {0}")]
    UnsupportedChartType(String),

    #[error("{chart} requires both x and y (missing {axis})")]
    MissingAxis { chart: String, axis: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),
}

impl From<anyhow::Error> for RenderError {
    fn from(err: anyhow::Error) -> Self {
        // Keep the whole context chain, not only the outermost message
        RenderError::RenderFailure(format!("{:#}", err))
    }
}

/// Errors raised while building or slicing a dataset.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("Column '{column}' has {actual} values, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Row mask has {actual} entries but dataset has {expected} rows")]
    MaskLength { expected: usize, actual: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
