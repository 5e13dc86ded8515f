#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use nf_columnar::{Column, ColumnError};
use nf_frame::{DataFrame, FrameError};
use nf_index::{IndexLabel, PositionIndex};
use nf_types::{DType, NullKind, Scalar, format_timestamp_nanos, parse_timestamp_nanos};
use thiserror::Error;

pub mod cli;

pub use cli::{DropNaCommand, DropNaOutput, axis_arg, run_dropna, subset_labels};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("duplicate csv header '{0}'")]
    DuplicateHeader(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Literals pandas' reader treats as missing by default (subset).
const MISSING_LITERALS: [&str; 7] = ["", "NaN", "nan", "NA", "None", "null", "NaT"];

/// Read a CSV with a header row. Header order becomes column order and rows
/// get default `0..n` labels.
pub fn read_csv_str(input: &str) -> Result<DataFrame, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let header_count = headers.len();
    let row_hint = input.len() / (header_count * 8).max(1);
    let mut raw: Vec<Vec<String>> = (0..header_count)
        .map(|_| Vec::with_capacity(row_hint))
        .collect();

    for row in reader.records() {
        let record = row?;
        for (idx, col) in raw.iter_mut().enumerate() {
            col.push(record.get(idx).unwrap_or_default().to_owned());
        }
    }

    let row_count = raw.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(header_count);
    for (idx, fields) in raw.iter().enumerate() {
        let name = headers.get(idx).unwrap_or_default();
        if data.iter().any(|(existing, _)| *existing == name) {
            return Err(IoError::DuplicateHeader(name.to_owned()));
        }
        data.push((name, column_values(fields)));
    }

    let labels = PositionIndex::new(row_count)
        .positions()
        .map(|p| IndexLabel::Int64(p as i64))
        .collect();
    Ok(DataFrame::from_dict_with_index(data, labels)?)
}

pub fn read_csv_path(path: &Path) -> Result<DataFrame, IoError> {
    let input = fs::read_to_string(path)?;
    read_csv_str(&input)
}

/// Write `frame` as CSV in column order. Missing cells are written empty.
/// With `include_index` the label index is written first under an empty header.
pub fn write_csv_string(frame: &DataFrame, include_index: bool) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    let names = frame.column_names();
    let mut header = Vec::with_capacity(names.len() + 1);
    if include_index {
        header.push(String::new());
    }
    header.extend(names.iter().map(|name| (*name).clone()));
    writer.write_record(&header)?;

    for row_idx in frame.positions().positions() {
        let mut row = Vec::with_capacity(header.len());
        if include_index {
            row.push(label_to_csv(&frame.index().labels()[row_idx]));
        }
        row.extend(names.iter().map(|name| {
            frame
                .column(name)
                .and_then(|column| column.value(row_idx))
                .map_or_else(String::new, scalar_to_csv)
        }));
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Parse every field, then fall back to a string column when the parsed
/// values do not share a dtype (`1,abc` becomes two strings, not an error).
fn column_values(fields: &[String]) -> Vec<Scalar> {
    let parsed = fields.iter().map(|f| parse_scalar(f)).collect::<Vec<_>>();
    if Column::from_values(parsed.clone()).is_ok() {
        return parsed;
    }
    fields
        .iter()
        .zip(parsed)
        .map(|(field, value)| {
            if value.is_missing() {
                Scalar::missing_for_dtype(DType::Utf8)
            } else {
                Scalar::Utf8(field.trim().to_owned())
            }
        })
        .collect()
}

fn parse_scalar(field: &str) -> Scalar {
    let trimmed = field.trim();
    if MISSING_LITERALS.contains(&trimmed) {
        return match trimmed {
            "NaN" | "nan" => Scalar::Null(NullKind::NaN),
            "NaT" => Scalar::Null(NullKind::NaT),
            _ => Scalar::Null(NullKind::Null),
        };
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return Scalar::Int64(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Scalar::Float64(value);
    }
    match trimmed {
        "True" | "true" => return Scalar::Bool(true),
        "False" | "false" => return Scalar::Bool(false),
        _ => {}
    }
    if let Ok(nanos) = parse_timestamp_nanos(trimmed) {
        return Scalar::Timestamp(nanos);
    }

    Scalar::Utf8(trimmed.to_owned())
}

fn scalar_to_csv(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null(_) => String::new(),
        Scalar::Bool(v) => if *v { "True" } else { "False" }.to_owned(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }
        Scalar::Utf8(v) => v.clone(),
        Scalar::Timestamp(ns) => format_timestamp_nanos(*ns),
    }
}

fn label_to_csv(label: &IndexLabel) -> String {
    match label {
        IndexLabel::Int64(v) => v.to_string(),
        IndexLabel::Utf8(v) => v.clone(),
        IndexLabel::Missing => String::new(),
    }
}
