//! Per-source hints telling the parser how to read a wide table.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Format keyword for RFC 3339 timestamps carrying their own offset.
pub const RFC3339: &str = "rfc3339";

const DEFAULT_MAX_UNPARSABLE_FRACTION: f64 = 0.1;

/// How numbers are written in a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimalSeparator {
    #[default]
    Point,
    Comma,
    /// A comma counts as decimal separator when the value holds no point.
    Auto,
}

/// What the timestamps of a source are relative to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum TimeBasis {
    #[default]
    Utc,
    /// Local time at a constant offset east of UTC; converted to UTC.
    FixedOffset { seconds: i32 },
    /// Local time of a named zone; kept as is and tagged on every row.
    Local { timezone: String },
}

/// Describes the columns of one source format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaHint {
    pub timestamp_column: String,
    /// chrono patterns tried in order, or [`RFC3339`].
    pub timestamp_formats: Vec<String>,
    pub station_column: Option<String>,
    pub quality_column: Option<String>,
    pub ignore_columns: Vec<String>,
    /// Sentinels standing for a missing value, e.g. "-999".
    pub missing_values: Vec<String>,
    pub decimal_separator: DecimalSeparator,
    pub time_basis: TimeBasis,
    /// Regex selecting the member to read from a zip archive.
    pub archive_member: Option<String>,
    /// Largest tolerated share of unparsable cells per column.
    pub max_unparsable_fraction: f64,
}

impl Default for SchemaHint {
    fn default() -> Self {
        Self {
            timestamp_column: "date".to_string(),
            timestamp_formats: vec![RFC3339.to_string()],
            station_column: None,
            quality_column: None,
            ignore_columns: Vec::new(),
            missing_values: vec!["-999".to_string()],
            decimal_separator: DecimalSeparator::Point,
            time_basis: TimeBasis::Utc,
            archive_member: None,
            max_unparsable_fraction: DEFAULT_MAX_UNPARSABLE_FRACTION,
        }
    }
}

impl SchemaHint {
    pub(crate) fn is_ignored(&self, column: &str) -> bool {
        self.ignore_columns
            .iter()
            .any(|ignored| ignored.trim().eq_ignore_ascii_case(column))
    }

    /// Parses a timestamp with the first matching format. Values with an
    /// explicit offset are converted to UTC; the rest follow the time basis.
    pub fn parse_timestamp(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        self.timestamp_formats.iter().find_map(|format| {
            if format == RFC3339 {
                return DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.naive_utc());
            }
            parse_with_format(raw, format).map(|local| self.to_basis(local))
        })
    }

    fn to_basis(&self, local: NaiveDateTime) -> NaiveDateTime {
        match &self.time_basis {
            TimeBasis::FixedOffset { seconds } => {
                local - chrono::Duration::seconds(i64::from(*seconds))
            }
            TimeBasis::Utc | TimeBasis::Local { .. } => local,
        }
    }

    /// Zone name to tag rows with, if timestamps stay in local time.
    pub fn timezone(&self) -> Option<String> {
        match &self.time_basis {
            TimeBasis::Local { timezone } => Some(timezone.clone()),
            TimeBasis::Utc | TimeBasis::FixedOffset { .. } => None,
        }
    }
}

/// Parses a date time, a date (at midnight) or an hour-resolution pattern
/// such as `%Y%m%d%H`, which chrono cannot complete on its own.
pub(crate) fn parse_with_format(raw: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(parsed);
    }
    if format.contains("%H") && !format.contains("%M") {
        let padded = format!("{raw}00");
        let padded_format = format!("{format}%M");
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&padded, &padded_format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(formats: &[&str]) -> SchemaHint {
        SchemaHint {
            timestamp_formats: formats.iter().map(|f| f.to_string()).collect(),
            ..SchemaHint::default()
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn understands_common_timestamp_shapes() {
        let h = hint(&["%Y%m%d%H%M", "%Y%m%d%H", "%Y%m%d", RFC3339]);
        assert_eq!(h.parse_timestamp("202410170950"), Some(at(2024, 10, 17, 9, 50)));
        assert_eq!(h.parse_timestamp("2024101709"), Some(at(2024, 10, 17, 9, 0)));
        assert_eq!(h.parse_timestamp(" 20241017 "), Some(at(2024, 10, 17, 0, 0)));
        assert_eq!(
            h.parse_timestamp("2024-10-17T11:00:00+02:00"),
            Some(at(2024, 10, 17, 9, 0))
        );
        assert_eq!(h.parse_timestamp("yesterday"), None);
        assert_eq!(h.parse_timestamp(""), None);
    }

    #[test]
    fn fixed_offsets_are_shifted_to_utc() {
        let mut h = hint(&["%Y-%m-%d %H:%M"]);
        h.time_basis = TimeBasis::FixedOffset { seconds: 3600 };
        assert_eq!(
            h.parse_timestamp("2024-01-01 01:00"),
            Some(at(2024, 1, 1, 0, 0))
        );
        assert_eq!(h.timezone(), None);

        h.time_basis = TimeBasis::Local {
            timezone: "Europe/Berlin".into(),
        };
        assert_eq!(
            h.parse_timestamp("2024-01-01 01:00"),
            Some(at(2024, 1, 1, 1, 0))
        );
        assert_eq!(h.timezone().as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn hints_deserialize_with_defaults() {
        let h: SchemaHint = serde_json::from_str(
            r#"{"timestamp_column": "MESS_DATUM", "decimal_separator": "comma",
                "time_basis": {"basis": "fixed_offset", "seconds": -18000}}"#,
        )
        .unwrap();
        assert_eq!(h.timestamp_column, "MESS_DATUM");
        assert_eq!(h.decimal_separator, DecimalSeparator::Comma);
        assert_eq!(h.time_basis, TimeBasis::FixedOffset { seconds: -18000 });
        assert_eq!(h.missing_values, vec!["-999"]);
        assert_eq!(h.max_unparsable_fraction, 0.1);
    }
}
