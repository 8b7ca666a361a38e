use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {unparsable} of {total} unparsable cells")]
    UnparsableColumn {
        column: String,
        unparsable: usize,
        total: usize,
    },

    #[error("{unparsable} of {total} timestamps could not be parsed")]
    UnparsableTimestamps { unparsable: usize, total: usize },

    #[error("Malformed source: {reason}")]
    MalformedSource { reason: String },

    #[error("Failed to open archive")]
    Archive(#[from] zip::result::ZipError),

    #[error("Failed to read archive member '{0}'")]
    ArchiveRead(String, #[source] std::io::Error),

    #[error("Failed to read CSV data")]
    Csv(#[from] polars::error::PolarsError),

    #[error("Failed to read XML data")]
    Xml(#[from] quick_xml::Error),

    #[error("Failed to read spreadsheet")]
    Spreadsheet(#[from] calamine::XlsxError),

    #[error("Failed to read JSON data")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern '{0}'")]
    InvalidPattern(String, #[source] regex::Error),
}

impl ParseError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ParseError::MalformedSource {
            reason: reason.into(),
        }
    }

    /// Whether the payload itself is at fault, as opposed to the decoder.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ParseError::InvalidPattern(..))
    }
}
