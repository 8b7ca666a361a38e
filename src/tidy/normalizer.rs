//! Wide to long conversion with period precedence.

use crate::parsing::table::{RawColumn, RawTable};
use crate::tidy::humanize::ParameterMap;
use crate::types::period::Period;
use crate::types::resolution::Resolution;
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// One observation in the canonical long layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TidyRow {
    pub station_id: String,
    pub dataset: String,
    pub parameter: String,
    pub resolution: Resolution,
    pub date: NaiveDateTime,
    pub value: Option<f64>,
    pub quality: Option<String>,
    /// Zone of `date` when the provider publishes local time.
    pub timezone: Option<String>,
}

/// A parsed table together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedTable {
    pub dataset: String,
    pub resolution: Resolution,
    pub period: Period,
    /// Used for rows that carry no station of their own.
    pub default_station: Option<String>,
    pub table: RawTable,
}

type RowKey = (String, String, String, Resolution, NaiveDateTime);

/// Pivots wide tables into long rows.
///
/// When several tables report the same station, dataset, parameter,
/// resolution and date, the row from the later published period wins
/// (`Now` over `Recent` over `Historical`); between tables of equal
/// precedence the one further back in `tables` wins. Output is sorted by
/// station, dataset, parameter, resolution and date.
pub fn tidy(tables: &[ScopedTable], parameters: &ParameterMap, humanize: bool) -> Vec<TidyRow> {
    let mut merged: BTreeMap<RowKey, ((u8, usize), TidyRow)> = BTreeMap::new();
    let mut orphaned = 0usize;

    for (position, scoped) in tables.iter().enumerate() {
        let rank = (scoped.period.precedence(), position);
        let table = &scoped.table;
        let names: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                if humanize {
                    parameters.humanize(&c.name)
                } else {
                    c.name.clone()
                }
            })
            .collect();

        for (row, date) in table.timestamps.iter().enumerate() {
            let station = table
                .stations
                .get(row)
                .cloned()
                .flatten()
                .or_else(|| scoped.default_station.clone());
            let Some(station) = station else {
                orphaned += 1;
                continue;
            };

            for (column, parameter) in table.columns.iter().zip(&names) {
                let tidy_row = TidyRow {
                    station_id: station.clone(),
                    dataset: scoped.dataset.clone(),
                    parameter: parameter.clone(),
                    resolution: scoped.resolution,
                    date: *date,
                    value: column.values.get(row).copied().flatten(),
                    quality: column
                        .quality
                        .as_ref()
                        .and_then(|q| q.get(row).cloned().flatten()),
                    timezone: table.timezone.clone(),
                };
                let key = (
                    station.clone(),
                    scoped.dataset.clone(),
                    parameter.clone(),
                    scoped.resolution,
                    *date,
                );
                match merged.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert((rank, tidy_row));
                    }
                    Entry::Occupied(mut slot) => {
                        if rank >= slot.get().0 {
                            slot.insert((rank, tidy_row));
                        }
                    }
                }
            }
        }
    }

    if orphaned > 0 {
        debug!("Skipped {} rows without a station id", orphaned);
    }
    merged.into_values().map(|(_, row)| row).collect()
}

/// Turns long rows back into wide tables, one per dataset, resolution and
/// timezone. A group whose parameters share the same station and date pairs
/// becomes a single table, otherwise each parameter gets its own table so no
/// artificial gaps appear.
pub fn widen(rows: &[TidyRow]) -> Vec<ScopedTable> {
    type Cells = BTreeMap<(NaiveDateTime, String), (Option<f64>, Option<String>)>;
    let mut groups: BTreeMap<(String, Resolution, Option<String>), BTreeMap<String, Cells>> =
        BTreeMap::new();
    for row in rows {
        groups
            .entry((row.dataset.clone(), row.resolution, row.timezone.clone()))
            .or_default()
            .entry(row.parameter.clone())
            .or_default()
            .insert(
                (row.date, row.station_id.clone()),
                (row.value, row.quality.clone()),
            );
    }

    let mut tables = Vec::new();
    for ((dataset, resolution, timezone), parameters) in groups {
        let scope = |table: RawTable| ScopedTable {
            dataset: dataset.clone(),
            resolution,
            period: Period::Fixed,
            default_station: None,
            table,
        };

        let mut key_sets = parameters.values().map(|cells| cells.keys().collect::<BTreeSet<_>>());
        let rectangular = match key_sets.next() {
            Some(first) => key_sets.all(|keys| keys == first),
            None => true,
        };

        if rectangular {
            tables.push(scope(wide_table(&parameters, timezone.clone())));
        } else {
            for (name, cells) in parameters {
                let single = BTreeMap::from([(name, cells)]);
                tables.push(scope(wide_table(&single, timezone.clone())));
            }
        }
    }
    tables
}

fn wide_table(
    parameters: &BTreeMap<String, BTreeMap<(NaiveDateTime, String), (Option<f64>, Option<String>)>>,
    timezone: Option<String>,
) -> RawTable {
    let keys: Vec<(NaiveDateTime, String)> = parameters
        .values()
        .next()
        .map(|cells| cells.keys().cloned().collect())
        .unwrap_or_default();

    let columns = parameters
        .iter()
        .map(|(name, cells)| {
            let values = keys
                .iter()
                .map(|k| cells.get(k).and_then(|(v, _)| *v))
                .collect();
            let quality: Vec<Option<String>> = keys
                .iter()
                .map(|k| cells.get(k).and_then(|(_, q)| q.clone()))
                .collect();
            RawColumn {
                name: name.clone(),
                values,
                quality: quality.iter().any(Option::is_some).then_some(quality),
            }
        })
        .collect();

    RawTable {
        stations: keys.iter().map(|(_, s)| Some(s.clone())).collect(),
        timestamps: keys.iter().map(|(d, _)| *d).collect(),
        columns,
        timezone,
        issued: None,
        unparsable: BTreeMap::new(),
    }
}
