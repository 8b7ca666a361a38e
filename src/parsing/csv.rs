use crate::parsing::error::ParseError;
use crate::parsing::text_table::{non_blank, TextTable};
use polars::prelude::*;
use std::io::Cursor;

/// Reads delimited text with polars, keeping every column as text.
pub fn read_delimited(text: &str, separator: char) -> Result<TextTable, ParseError> {
    let separator = u8::try_from(separator).map_err(|_| {
        ParseError::malformed(format!("separator '{separator}' is not a single byte"))
    })?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| {
            options
                .with_separator(separator)
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()?;

    let mut headers = Vec::with_capacity(df.width());
    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        headers.push(column.name().trim().to_string());
        let cells = column
            .str()?
            .into_iter()
            .map(|cell| cell.and_then(non_blank))
            .collect();
        columns.push(cells);
    }
    Ok(TextTable {
        headers,
        columns,
        issued: None,
    })
}
