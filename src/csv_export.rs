//! CSV export of readings.
//!
//! The header is a fixed column list. Missing values are empty cells. A cell
//! containing a comma, double quote, CR or LF, or starting or ending with
//! whitespace, is wrapped in double quotes with inner quotes doubled. Rows
//! end in `\n`.
//!
//! [`parse_records`] reads the same dialect back, and [`parse_readings`]
//! turns an uploaded file with this header into readings.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{iso8601, Reading};

// ---

/// Column order of the export.
pub const HEADER: [&str; 23] = [
    "sensor_id",
    "timestamp",
    "ph",
    "ec",
    "carbonate",
    "bicarbonate",
    "chloride",
    "sulfate",
    "nitrate",
    "hardness",
    "calcium",
    "magnesium",
    "sodium",
    "potassium",
    "fluoride",
    "tds",
    "turbidity",
    "temperature",
    "dissolved_oxygen",
    "latitude",
    "longitude",
    "state",
    "district",
];

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row(reading: &Reading) -> [String; 23] {
    // ---
    [
        reading.sensor_id.clone(),
        iso8601::format(&reading.timestamp),
        number(reading.ph),
        number(reading.ec),
        number(reading.carbonate),
        number(reading.bicarbonate),
        number(reading.chloride),
        number(reading.sulfate),
        number(reading.nitrate),
        number(reading.hardness),
        number(reading.calcium),
        number(reading.magnesium),
        number(reading.sodium),
        number(reading.potassium),
        number(reading.fluoride),
        number(reading.tds),
        number(reading.turbidity),
        number(reading.temperature),
        number(reading.dissolved_oxygen),
        number(reading.latitude),
        number(reading.longitude),
        reading.state.clone().unwrap_or_default(),
        reading.district.clone().unwrap_or_default(),
    ]
}

/// Quote a cell if it needs it.
pub fn escape_field(value: &str) -> String {
    let padded = value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace);
    if padded || value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_line<S: AsRef<str>>(out: &mut String, cells: &[S]) {
    let line: Vec<String> = cells.iter().map(|c| escape_field(c.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// Render readings as CSV, header first, one row per reading in input order.
pub fn export_readings(readings: &[Reading]) -> String {
    let mut out = String::new();
    write_line(&mut out, &HEADER);
    for reading in readings {
        write_line(&mut out, &row(reading));
    }
    out
}

/// Split CSV text into records of unescaped cells.
///
/// Quoted cells may span lines. A trailing newline does not produce an
/// empty record.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    // ---
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    cell.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
            }
            _ => cell.push(c),
        }
    }

    if !cell.is_empty() || !record.is_empty() {
        record.push(cell);
        records.push(record);
    }
    records
}

/// Parse an uploaded CSV into readings.
///
/// Columns are matched by header name, so any order or subset works as long
/// as `sensor_id` and `timestamp` are present. Unknown columns are ignored.
/// Empty cells are absent values and blank lines are skipped. Surrounding
/// whitespace is trimmed from ids, timestamps and numbers; `state` and
/// `district` are kept as written.
pub fn parse_readings(text: &str) -> Result<Vec<Reading>> {
    // ---
    let mut records = parse_records(text).into_iter();
    let header = records
        .next()
        .ok_or_else(|| Error::validation("CSV upload is empty"))?;

    let column = |name: &str| header.iter().position(|h| h.trim() == name);
    let sensor_col =
        column("sensor_id").ok_or_else(|| Error::validation("CSV has no sensor_id column"))?;
    let ts_col =
        column("timestamp").ok_or_else(|| Error::validation("CSV has no timestamp column"))?;
    let columns: Vec<Option<usize>> = HEADER.iter().map(|h| column(*h)).collect();

    let mut readings = Vec::new();
    for (idx, record) in records.enumerate() {
        // ---
        let line = idx + 2;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let cell = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };
        let text = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .filter(|s| !s.is_empty())
                .cloned()
        };
        let num = |name: &str| -> Result<Option<f64>> {
            let col = HEADER.iter().position(|h| *h == name).and_then(|i| columns[i]);
            cell(col)
                .map(|s| {
                    s.parse::<f64>().map_err(|_| {
                        Error::validation(format!("line {line}: {name} is not a number: {s:?}"))
                    })
                })
                .transpose()
        };

        let sensor_id = cell(Some(sensor_col))
            .ok_or_else(|| Error::validation(format!("line {line}: missing sensor_id")))?;
        let raw_ts = cell(Some(ts_col))
            .ok_or_else(|| Error::validation(format!("line {line}: missing timestamp")))?;
        let timestamp = DateTime::parse_from_rfc3339(raw_ts)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| Error::validation(format!("line {line}: bad timestamp {raw_ts:?}: {e}")))?;

        readings.push(Reading {
            ph: num("ph")?,
            ec: num("ec")?,
            carbonate: num("carbonate")?,
            bicarbonate: num("bicarbonate")?,
            chloride: num("chloride")?,
            sulfate: num("sulfate")?,
            nitrate: num("nitrate")?,
            hardness: num("hardness")?,
            calcium: num("calcium")?,
            magnesium: num("magnesium")?,
            sodium: num("sodium")?,
            potassium: num("potassium")?,
            fluoride: num("fluoride")?,
            tds: num("tds")?,
            turbidity: num("turbidity")?,
            temperature: num("temperature")?,
            dissolved_oxygen: num("dissolved_oxygen")?,
            latitude: num("latitude")?,
            longitude: num("longitude")?,
            state: text(column("state")),
            district: text(column("district")),
            ..Reading::new(sensor_id, timestamp)
        });
    }
    Ok(readings)
}
