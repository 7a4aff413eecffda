use std::path::PathBuf;

use thiserror::Error;

use crate::types::DataType;

/// Convenience result type for parse operations.
pub type ImportResult<T> = Result<T, ParseError>;

/// File-level (fatal) error returned by the parsers.
///
/// These are raised before any row is produced; no partial result accompanies them.
/// Row-level problems are reported through [`TransformError`] and never escape `parse()`.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input path does not exist.
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The input exists but cannot be opened for reading.
    #[error("file is not readable: {}: {source}", path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input has zero bytes.
    #[error("file is empty: {}", path.display())]
    Empty { path: PathBuf },

    /// The input exceeds the configured size cap.
    #[error("file too large: {} is {size} bytes, limit is {limit} bytes", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The extension is not in the supported set of the selected parser.
    #[error("unsupported format '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// An explicitly requested character encoding is unknown.
    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    /// XML syntax validation failed.
    #[error("malformed xml at byte {position}: {message}")]
    MalformedXml { message: String, position: u64 },

    /// A named worksheet does not exist in the workbook.
    #[error("worksheet '{name}' not found (available: {available:?})")]
    WorksheetNotFound { name: String, available: Vec<String> },

    /// A worksheet index is out of range.
    #[error("worksheet index {index} not found (workbook has {count} sheets)")]
    WorksheetIndexOutOfRange { index: usize, count: usize },

    /// The workbook contains no worksheets.
    #[error("workbook has no worksheets")]
    NoWorksheets,

    /// Underlying I/O error while reading an already validated file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-text reader error outside of per-record processing.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "excel")]
    /// Workbook reader error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// XML reader error outside of syntax validation.
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The progress callback failed; the parse was aborted.
    #[error("parse aborted by progress callback: {0}")]
    ProgressAborted(#[from] ProgressError),

    /// Engine configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ParseError {
    /// Offset/line context for the parse-error event, when the error carries one.
    pub fn location(&self) -> Option<String> {
        match self {
            ParseError::MalformedXml { position, .. } => Some(format!("byte {position}")),
            ParseError::Csv(err) => err.position().map(|p| {
                format!("line {}, record {}, byte {}", p.line(), p.record(), p.byte())
            }),
            _ => None,
        }
    }
}

/// Error returned by a progress callback to abort the parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ProgressError(pub String);

impl ProgressError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A single value could not be coerced into its declared type.
///
/// Callers keep the raw value and flag the row instead of propagating this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("invalid date '{raw}'")]
    InvalidDate { raw: String },

    #[error("invalid decimal '{raw}'")]
    InvalidDecimal { raw: String },

    #[error("invalid integer '{raw}'")]
    InvalidInteger { raw: String },

    #[error("cannot convert {found} to {expected:?}")]
    Unsupported { expected: DataType, found: String },
}
