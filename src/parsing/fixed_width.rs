use crate::parsing::error::ParseError;
use crate::parsing::text_table::{non_blank, TextTable};

/// Reads a column-aligned text table whose header is underlined by a ruler
/// of dashes, one run of dashes per column.
///
/// A column spans from the start of its run to the start of the next one;
/// the last column runs to the end of the line.
pub fn read_fixed_width(text: &str) -> Result<TextTable, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let ruler_index = lines
        .iter()
        .position(|line| is_ruler(line))
        .ok_or_else(|| ParseError::malformed("fixed-width table has no ruler line"))?;
    let header_line = lines[..ruler_index]
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ParseError::malformed("fixed-width table has no header line"))?;

    let starts = run_starts(lines[ruler_index]);
    let headers: Vec<String> = slice_line(header_line, &starts)
        .into_iter()
        .map(|cell| cell.unwrap_or_default())
        .collect();

    let rows = lines[ruler_index + 1..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| slice_line(line, &starts))
        .collect();
    Ok(TextTable::from_rows(headers, rows))
}

fn is_ruler(line: &str) -> bool {
    line.contains('-') && line.chars().all(|c| c == '-' || c.is_whitespace())
}

fn run_starts(ruler: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut previous = ' ';
    for (position, c) in ruler.chars().enumerate() {
        if c == '-' && previous != '-' {
            starts.push(position);
        }
        previous = c;
    }
    starts
}

fn slice_line(line: &str, starts: &[usize]) -> Vec<Option<String>> {
    let chars: Vec<char> = line.chars().collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(chars.len()).min(chars.len());
            if start >= end {
                return None;
            }
            let cell: String = chars[start..end].iter().collect();
            non_blank(cell.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION_LIST: &str = "\
Stations_id von_datum bis_datum Stationshoehe geoBreite geoLaenge Stationsname                             Bundesland
----------- --------- --------- ------------- --------- --------- ---------------------------------------- ----------
00003       19500401  20110331            202   50.7827    6.0941 Aachen                                   Nordrhein-Westfalen
00044       20070401  20241016             44   52.9336    8.2370 Großenkneten                             Niedersachsen
";

    #[test]
    fn columns_follow_the_ruler() {
        let table = read_fixed_width(STATION_LIST).unwrap();
        assert_eq!(table.headers[0], "Stations_id");
        assert_eq!(table.headers[7], "Bundesland");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 1), Some("00044"));
        assert_eq!(table.cell(3, 0), Some("202"));
        assert_eq!(table.cell(6, 1), Some("Großenkneten"));
        assert_eq!(table.cell(7, 0), Some("Nordrhein-Westfalen"));
    }

    #[test]
    fn missing_ruler_is_malformed() {
        assert!(read_fixed_width("a b\n1 2\n").unwrap_err().is_malformed());
    }
}
