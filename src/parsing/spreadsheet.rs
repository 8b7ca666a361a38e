use crate::parsing::error::ParseError;
use crate::parsing::text_table::{non_blank, TextTable};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{Duration, NaiveDate};
use std::io::Cursor;

/// Reads one worksheet of an xlsx workbook; the first row holds the headers.
pub fn read_spreadsheet(bytes: &[u8], sheet: Option<&str>) -> Result<TextTable, ParseError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name)?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ParseError::malformed("workbook has no worksheets"))??,
    };

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| row.iter().any(Option::is_some));
    let headers = rows
        .next()
        .ok_or_else(|| ParseError::malformed("worksheet is empty"))?
        .into_iter()
        .map(|cell| cell.unwrap_or_default())
        .collect();
    Ok(TextTable::from_rows(headers, rows.collect()))
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => non_blank(s.trim()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64()),
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn excel_serial_to_text(serial: f64) -> Option<String> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    let datetime = epoch.checked_add_signed(Duration::seconds(seconds))?;
    Some(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_dates_become_iso_text() {
        assert_eq!(
            excel_serial_to_text(45_000.5).as_deref(),
            Some("2023-03-15 12:00:00")
        );
    }

    #[test]
    fn cells_are_stringified() {
        assert_eq!(cell_text(&Data::Float(478.0)).as_deref(), Some("478"));
        assert_eq!(cell_text(&Data::Float(47.8413)).as_deref(), Some("47.8413"));
        assert_eq!(cell_text(&Data::String("  ".into())), None);
        assert_eq!(cell_text(&Data::Empty), None);
    }

    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(read_spreadsheet(b"not a workbook", None).is_err());
    }
}
