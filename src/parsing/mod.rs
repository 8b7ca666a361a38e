//! Decoding of raw upstream files into wide [`RawTable`]s.
//!
//! Every format goes through the same pipeline: archive extraction, text
//! decoding, format-specific reading into a [`TextTable`], then numeric and
//! timestamp coercion driven by a [`SchemaHint`].

pub mod archive;
pub mod csv;
pub mod error;
pub mod fixed_width;
pub mod json;
pub mod kml;
pub mod numeric;
pub mod schema;
pub mod spreadsheet;
pub mod table;
pub mod text_table;

use crate::parsing::error::ParseError;
use crate::parsing::schema::SchemaHint;
use crate::parsing::table::RawTable;
use crate::parsing::text_table::TextTable;
use regex::Regex;
use serde::{Deserialize, Serialize};

fn default_separator() -> char {
    ';'
}

/// The closed set of source formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum RawParser {
    /// Delimited text, e.g. the semicolon separated DWD product files.
    Csv {
        #[serde(default = "default_separator")]
        separator: char,
    },
    /// Column-aligned text with a ruler line of dashes under the header.
    FixedWidth,
    /// Forecast placemarks with a shared time axis.
    Kml,
    /// An xlsx workbook; the first sheet unless one is named.
    Spreadsheet {
        #[serde(default)]
        sheet: Option<String>,
    },
    /// An array of JSON records, optionally below a JSON pointer.
    Json {
        #[serde(default)]
        records: Option<String>,
    },
}

impl Default for RawParser {
    fn default() -> Self {
        RawParser::Csv {
            separator: default_separator(),
        }
    }
}

impl RawParser {
    /// Extracts and reads `payload` into an untyped table.
    pub fn decode(&self, payload: &[u8], archive_member: Option<&str>) -> Result<TextTable, ParseError> {
        let member = archive_member
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ParseError::InvalidPattern(pattern.to_string(), e))
            })
            .transpose()?;
        let bytes = archive::extract(payload, member.as_ref())?;

        match self {
            RawParser::Csv { separator } => {
                csv::read_delimited(&archive::decode_text(&bytes), *separator)
            }
            RawParser::FixedWidth => fixed_width::read_fixed_width(&archive::decode_text(&bytes)),
            RawParser::Kml => kml::read_placemarks(&archive::decode_text(&bytes)),
            RawParser::Json { records } => {
                json::read_records(&archive::decode_text(&bytes), records.as_deref())
            }
            RawParser::Spreadsheet { sheet } => {
                spreadsheet::read_spreadsheet(&bytes, sheet.as_deref())
            }
        }
    }

    /// Decodes `payload` and types it according to `hint`. KML documents
    /// always use their own station and timestamp columns.
    pub fn parse(&self, payload: &[u8], hint: &SchemaHint) -> Result<RawTable, ParseError> {
        let text = self.decode(payload, hint.archive_member.as_deref())?;
        if *self == RawParser::Kml {
            let hint = SchemaHint {
                timestamp_column: kml::TIMESTAMP_COLUMN.to_string(),
                timestamp_formats: vec![kml::TIMESTAMP_FORMAT.to_string()],
                station_column: Some(kml::STATION_COLUMN.to_string()),
                ..hint.clone()
            };
            return RawTable::from_text(&text, &hint);
        }
        RawTable::from_text(&text, hint)
    }
}
