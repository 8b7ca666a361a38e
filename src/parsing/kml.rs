//! Forecast placemark documents (MOSMIX style KML).
//!
//! A document holds an issue time, a shared axis of forecast time steps and
//! one placemark per station. Every placemark lists, per forecast element,
//! whitespace separated values aligned with the time steps; `-` is missing.

use crate::parsing::error::ParseError;
use crate::parsing::schema::RFC3339;
use crate::parsing::text_table::TextTable;
use chrono::{DateTime, NaiveDateTime};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

pub const STATION_COLUMN: &str = "station_id";
pub const TIMESTAMP_COLUMN: &str = "date";
/// Format of the timestamp column of decoded documents.
pub const TIMESTAMP_FORMAT: &str = RFC3339;

#[derive(Debug, Default)]
struct Placemark {
    name: String,
    forecasts: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    IssueTime,
    TimeStep,
    PlacemarkName,
    Value,
}

/// Decodes a KML document into one row per (placemark, time step).
pub fn read_placemarks(text: &str) -> Result<TextTable, ParseError> {
    let mut reader = XmlReader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut issued: Option<NaiveDateTime> = None;
    let mut steps: Vec<String> = Vec::new();
    let mut placemarks: Vec<Placemark> = Vec::new();
    let mut current: Option<Placemark> = None;
    let mut element: Option<String> = None;
    let mut capture = Capture::None;
    let mut buffer = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                buffer.clear();
                match e.local_name().as_ref() {
                    b"IssueTime" => capture = Capture::IssueTime,
                    b"TimeStep" => capture = Capture::TimeStep,
                    b"Placemark" => current = Some(Placemark::default()),
                    b"name" if current.is_some() => capture = Capture::PlacemarkName,
                    b"Forecast" => {
                        for attribute in e.attributes() {
                            let attribute = attribute.map_err(quick_xml::Error::from)?;
                            if attribute.key.local_name().as_ref() == b"elementName" {
                                element = Some(attribute.unescape_value()?.into_owned());
                            }
                        }
                    }
                    b"value" if element.is_some() => capture = Capture::Value,
                    _ => {}
                }
            }
            Event::Text(t) if capture != Capture::None => buffer.push_str(&t.unescape()?),
            Event::End(e) => {
                match (capture, e.local_name().as_ref()) {
                    (Capture::IssueTime, b"IssueTime") => {
                        issued = DateTime::parse_from_rfc3339(buffer.trim())
                            .map(|dt| dt.naive_utc())
                            .ok();
                    }
                    (Capture::TimeStep, b"TimeStep") => steps.push(buffer.trim().to_string()),
                    (Capture::PlacemarkName, b"name") => {
                        if let Some(placemark) = current.as_mut() {
                            placemark.name = buffer.trim().to_string();
                        }
                    }
                    (Capture::Value, b"value") => {
                        if let (Some(placemark), Some(name)) = (current.as_mut(), element.take()) {
                            placemark.forecasts.push((name, buffer.clone()));
                        }
                    }
                    (_, b"Placemark") => placemarks.extend(current.take()),
                    (_, b"Forecast") => element = None,
                    _ => {}
                }
                capture = Capture::None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    to_table(issued, &steps, placemarks)
}

fn to_table(
    issued: Option<NaiveDateTime>,
    steps: &[String],
    placemarks: Vec<Placemark>,
) -> Result<TextTable, ParseError> {
    let mut elements: Vec<String> = Vec::new();
    for placemark in &placemarks {
        for (name, _) in &placemark.forecasts {
            if !elements.contains(name) {
                elements.push(name.clone());
            }
        }
    }

    let mut headers = vec![STATION_COLUMN.to_string(), TIMESTAMP_COLUMN.to_string()];
    headers.extend(elements.iter().cloned());
    let mut rows = Vec::with_capacity(placemarks.len() * steps.len());

    for placemark in placemarks {
        let mut series: Vec<Vec<Option<String>>> = vec![vec![None; steps.len()]; elements.len()];
        for (name, values) in &placemark.forecasts {
            let tokens: Vec<&str> = values.split_whitespace().collect();
            if tokens.len() != steps.len() {
                return Err(ParseError::malformed(format!(
                    "placemark {} has {} values for {}, expected {}",
                    placemark.name,
                    tokens.len(),
                    name,
                    steps.len()
                )));
            }
            if let Some(index) = elements.iter().position(|e| e == name) {
                series[index] = tokens
                    .into_iter()
                    .map(|token| (token != "-").then(|| token.to_string()))
                    .collect();
            }
        }
        for (step_index, step) in steps.iter().enumerate() {
            let mut row = vec![Some(placemark.name.clone()), Some(step.clone())];
            row.extend(series.iter().map(|values| values[step_index].clone()));
            rows.push(row);
        }
    }

    let mut table = TextTable::from_rows(headers, rows);
    table.issued = issued;
    Ok(table)
}
