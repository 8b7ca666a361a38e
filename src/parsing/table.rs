//! The typed wide table every parser produces.

use crate::parsing::error::ParseError;
use crate::parsing::numeric::{coerce, Cell, Sentinels};
use crate::parsing::schema::SchemaHint;
use crate::parsing::text_table::TextTable;
use crate::stations::same_station_id;
use chrono::NaiveDateTime;
use log::warn;
use std::collections::{BTreeMap, HashSet};

/// One measured quantity of a [`RawTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    /// Provider-native column name.
    pub name: String,
    pub values: Vec<Option<f64>>,
    pub quality: Option<Vec<Option<String>>>,
}

/// Wide table of one source file, rows sorted by timestamp then station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub stations: Vec<Option<String>>,
    pub timestamps: Vec<NaiveDateTime>,
    pub columns: Vec<RawColumn>,
    /// Zone of local-time timestamps; `None` means UTC.
    pub timezone: Option<String>,
    pub issued: Option<NaiveDateTime>,
    /// Number of cells per column that were not numbers.
    pub unparsable: BTreeMap<String, usize>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&RawColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Rows of one station. Ids compare without leading zeros.
    pub fn retain_station(&self, station_id: &str) -> RawTable {
        let keep: Vec<bool> = self
            .stations
            .iter()
            .map(|s| s.as_deref().is_some_and(|s| same_station_id(s, station_id)))
            .collect();
        self.select_rows(&keep)
    }

    /// Fills rows without a station with `station_id`.
    pub fn assign_station(&mut self, station_id: &str) {
        for station in self.stations.iter_mut().filter(|s| s.is_none()) {
            *station = Some(station_id.to_string());
        }
    }

    pub fn retain_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        self.columns
            .retain(|c| names.iter().any(|n| n.as_ref() == c.name));
    }

    fn select_rows(&self, keep: &[bool]) -> RawTable {
        let pick = |i: &usize| keep.get(*i).copied().unwrap_or(false);
        let rows: Vec<usize> = (0..self.len()).filter(pick).collect();
        RawTable {
            stations: rows.iter().map(|&i| self.stations[i].clone()).collect(),
            timestamps: rows.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| RawColumn {
                    name: c.name.clone(),
                    values: rows.iter().map(|&i| c.values[i]).collect(),
                    quality: c
                        .quality
                        .as_ref()
                        .map(|q| rows.iter().map(|&i| q[i].clone()).collect()),
                })
                .collect(),
            timezone: self.timezone.clone(),
            issued: self.issued,
            unparsable: self.unparsable.clone(),
        }
    }

    /// Types a decoded table according to `hint`.
    ///
    /// # Errors
    ///
    /// Fails if a declared column is missing, a column name repeats, or the
    /// share of unparsable timestamps or cells in any column exceeds the
    /// hint's threshold.
    pub fn from_text(text: &TextTable, hint: &SchemaHint) -> Result<RawTable, ParseError> {
        let mut seen = HashSet::new();
        for header in &text.headers {
            if !seen.insert(header.trim()) {
                return Err(ParseError::DuplicateColumn(header.trim().to_string()));
            }
        }

        let find = |name: &str| {
            text.column_index(name)
                .ok_or_else(|| ParseError::MissingColumn(name.to_string()))
        };
        let timestamp_index = find(&hint.timestamp_column)?;
        let station_index = hint.station_column.as_deref().map(find).transpose()?;
        let quality_index = hint.quality_column.as_deref().map(find).transpose()?;

        let total = text.row_count();
        let parsed: Vec<Option<NaiveDateTime>> = (0..total)
            .map(|row| {
                text.cell(timestamp_index, row)
                    .and_then(|raw| hint.parse_timestamp(raw))
            })
            .collect();
        let unparsable_timestamps = parsed.iter().filter(|t| t.is_none()).count();
        if exceeds(unparsable_timestamps, total, hint.max_unparsable_fraction) {
            return Err(ParseError::UnparsableTimestamps {
                unparsable: unparsable_timestamps,
                total,
            });
        }
        if unparsable_timestamps > 0 {
            warn!("Dropping {} rows with unparsable timestamps", unparsable_timestamps);
        }

        let mut order: Vec<(NaiveDateTime, Option<&str>, usize)> = parsed
            .iter()
            .enumerate()
            .filter_map(|(row, t)| {
                t.map(|t| {
                    let station = station_index.and_then(|i| text.cell(i, row)).map(str::trim);
                    (t, station, row)
                })
            })
            .collect();
        order.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let rows: Vec<usize> = order.iter().map(|(_, _, row)| *row).collect();

        let quality = quality_index.map(|index| {
            rows.iter()
                .map(|&row| text.cell(index, row).map(|q| q.trim().to_string()))
                .collect::<Vec<_>>()
        });

        let sentinels = Sentinels::new(hint.missing_values.as_slice(), hint.decimal_separator);
        let reserved = [Some(timestamp_index), station_index, quality_index];
        let mut columns = Vec::new();
        let mut unparsable = BTreeMap::new();
        for (index, header) in text.headers.iter().enumerate() {
            let name = header.trim();
            if reserved.contains(&Some(index)) || name.is_empty() || hint.is_ignored(name) {
                continue;
            }
            let mut failures = 0;
            let values: Vec<Option<f64>> = rows
                .iter()
                .map(|&row| match coerce(text.cell(index, row), &sentinels, hint.decimal_separator) {
                    Cell::Unparsable => {
                        failures += 1;
                        None
                    }
                    cell => cell.value(),
                })
                .collect();
            if exceeds(failures, rows.len(), hint.max_unparsable_fraction) {
                return Err(ParseError::UnparsableColumn {
                    column: name.to_string(),
                    unparsable: failures,
                    total: rows.len(),
                });
            }
            if failures > 0 {
                warn!("Column {} has {} unparsable cells", name, failures);
                unparsable.insert(name.to_string(), failures);
            }
            columns.push(RawColumn {
                name: name.to_string(),
                values,
                quality: quality.clone(),
            });
        }

        Ok(RawTable {
            stations: order
                .iter()
                .map(|(_, station, _)| station.map(str::to_string))
                .collect(),
            timestamps: order.iter().map(|(t, _, _)| *t).collect(),
            columns,
            timezone: hint.timezone(),
            issued: text.issued,
            unparsable,
        })
    }
}

fn exceeds(failures: usize, total: usize, max_fraction: f64) -> bool {
    total > 0 && failures as f64 / total as f64 > max_fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::schema::DecimalSeparator;
    use chrono::NaiveDate;

    fn text(headers: &[&str], rows: &[&[&str]]) -> TextTable {
        TextTable::from_rows(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| {
                    row.iter()
                        .map(|c| (!c.is_empty()).then(|| c.to_string()))
                        .collect()
                })
                .collect(),
        )
    }

    fn hint() -> SchemaHint {
        SchemaHint {
            timestamp_column: "time".into(),
            timestamp_formats: vec!["%Y%m%d%H".into()],
            station_column: Some("station".into()),
            ..SchemaHint::default()
        }
    }

    #[test]
    fn sentinels_become_missing_and_rows_are_sorted() {
        let table = text(
            &["station", "time", "roadSurfaceTemperature"],
            &[
                &["2", "2024010101", "1.0"],
                &["1", "2024010101", "3.2"],
                &["1", "2024010100", "-999"],
            ],
        );
        let raw = RawTable::from_text(&table, &hint()).unwrap();

        let at = |h| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(h, 0, 0).unwrap();
        assert_eq!(raw.timestamps, vec![at(0), at(1), at(1)]);
        assert_eq!(
            raw.stations,
            vec![Some("1".into()), Some("1".into()), Some("2".into())]
        );
        assert_eq!(
            raw.column("roadSurfaceTemperature").unwrap().values,
            vec![None, Some(3.2), Some(1.0)]
        );
        assert!(raw.unparsable.is_empty());
    }

    #[test]
    fn duplicate_columns_are_malformed() {
        let table = text(&["station", "time", "TT", " TT"], &[&["1", "2024010100", "1", "2"]]);
        let err = RawTable::from_text(&table, &hint()).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateColumn(ref c) if c == "TT"));
        assert!(err.is_malformed());
    }

    #[test]
    fn unparsable_cells_are_counted_up_to_the_threshold() {
        let rows: Vec<Vec<String>> = (0..20)
            .map(|i| {
                let value = if i == 0 { "n/a".to_string() } else { format!("{i},5") };
                vec!["1".to_string(), format!("20240101{:02}", i), value]
            })
            .collect();
        let row_refs: Vec<Vec<&str>> = rows
            .iter()
            .map(|r| r.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();
        let table = text(&["station", "time", "TT"], &slices);

        let mut comma = hint();
        comma.decimal_separator = DecimalSeparator::Comma;
        let raw = RawTable::from_text(&table, &comma).unwrap();
        assert_eq!(raw.unparsable.get("TT"), Some(&1));
        assert_eq!(raw.column("TT").unwrap().values[1], Some(1.5));

        let mut strict = comma.clone();
        strict.max_unparsable_fraction = 0.01;
        assert!(matches!(
            RawTable::from_text(&table, &strict),
            Err(ParseError::UnparsableColumn { unparsable: 1, total: 20, .. })
        ));

        let point = hint();
        assert!(RawTable::from_text(&table, &point).is_err());
    }

    #[test]
    fn missing_timestamp_column_is_reported() {
        let table = text(&["station", "TT"], &[&["1", "2"]]);
        assert!(matches!(
            RawTable::from_text(&table, &hint()),
            Err(ParseError::MissingColumn(ref c)) if c == "time"
        ));
    }

    #[test]
    fn station_rows_can_be_selected() {
        let table = text(
            &["station", "time", "TT"],
            &[&["00044", "2024010100", "1"], &["3", "2024010100", "2"]],
        );
        let raw = RawTable::from_text(&table, &hint()).unwrap();
        let only = raw.retain_station("00003");
        assert_eq!(only.len(), 1);
        assert_eq!(only.columns[0].values, vec![Some(2.0)]);
    }
}
