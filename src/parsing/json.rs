use crate::parsing::error::ParseError;
use crate::parsing::text_table::{non_blank, TextTable};
use serde_json::{Map, Value};

/// Reads an array of JSON records into a table.
///
/// `records` is a JSON pointer to the array (e.g. `/features`), or the
/// document root when absent. GeoJSON features contribute their properties
/// plus `latitude`, `longitude` and, if present, `height` from a point
/// geometry. Measurement objects of the form `{"value": .., ...}` are
/// reduced to their value.
pub fn read_records(text: &str, records: Option<&str>) -> Result<TextTable, ParseError> {
    let document: Value = serde_json::from_str(text)?;
    let array = match records {
        Some(pointer) => document.pointer(pointer),
        None => Some(&document),
    }
    .and_then(Value::as_array)
    .ok_or_else(|| {
        ParseError::malformed(format!(
            "no record array at '{}'",
            records.unwrap_or("/")
        ))
    })?;

    let mut headers: Vec<String> = Vec::new();
    let mut flattened = Vec::with_capacity(array.len());
    for record in array {
        let fields = flatten_record(record)?;
        for (key, _) in &fields {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        flattened.push(fields);
    }

    let rows = flattened
        .into_iter()
        .map(|fields| {
            headers
                .iter()
                .map(|header| {
                    fields
                        .iter()
                        .find(|(key, _)| key == header)
                        .and_then(|(_, value)| value.clone())
                })
                .collect()
        })
        .collect();
    Ok(TextTable::from_rows(headers, rows))
}

fn flatten_record(record: &Value) -> Result<Vec<(String, Option<String>)>, ParseError> {
    let object = record
        .as_object()
        .ok_or_else(|| ParseError::malformed("record is not an object"))?;

    let Some(properties) = object.get("properties").and_then(Value::as_object) else {
        return Ok(flatten_object(object));
    };
    let mut fields = flatten_object(properties);
    let coordinates = object
        .get("geometry")
        .and_then(|geometry| geometry.get("coordinates"))
        .and_then(Value::as_array);
    if let Some(coordinates) = coordinates {
        let names = ["longitude", "latitude", "height"];
        for (name, value) in names.iter().zip(coordinates) {
            if !fields.iter().any(|(key, _)| key == *name) {
                fields.push((name.to_string(), scalar_text(value)));
            }
        }
    }
    Ok(fields)
}

fn flatten_object(object: &Map<String, Value>) -> Vec<(String, Option<String>)> {
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::Object(inner) => inner.get("value").and_then(scalar_text),
                other => scalar_text(other),
            };
            (key.clone(), text)
        })
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(s.as_str()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_geojson_features() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"geometry": {"type": "Point", "coordinates": [-71.01, 42.36]},
             "properties": {"stationIdentifier": "KBOS", "name": "Boston",
                            "elevation": {"unitCode": "wmoUnit:m", "value": 6.1}}},
            {"geometry": null,
             "properties": {"stationIdentifier": "KJFK", "timeZone": "America/New_York"}}
        ]}"#;
        let table = read_records(text, Some("/features")).unwrap();
        assert_eq!(
            table.headers,
            vec![
                "elevation",
                "name",
                "stationIdentifier",
                "longitude",
                "latitude",
                "timeZone"
            ]
        );
        assert_eq!(table.cell(2, 1), Some("KJFK"));
        assert_eq!(table.cell(0, 0), Some("6.1"));
        assert_eq!(table.cell(4, 0), Some("42.36"));
        assert_eq!(table.cell(4, 1), None);
    }

    #[test]
    fn plain_arrays_and_bad_pointers() {
        let table = read_records(r#"[{"a": 1, "b": null}]"#, None).unwrap();
        assert_eq!(table.cell(0, 0), Some("1"));
        assert_eq!(table.cell(1, 0), None);
        assert!(read_records(r#"{"x": 1}"#, Some("/features"))
            .unwrap_err()
            .is_malformed());
    }
}
