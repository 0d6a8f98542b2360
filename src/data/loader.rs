use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Date32Type, Float64Type, Int64Type};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{coerce_cell, parse_date, Dataset, Field, Record, Value, ValueKind};
use crate::error::{IngestError, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – columnar SMART export (recommended)
/// * `.csv`     – one Backblaze daily drive-stats file
/// * `.json`    – `[{ "date": "...", "serial_number": "...", ... }, ...]`
///
/// A path that does not exist fails with [`IngestError::NotFound`] before
/// anything is parsed.
pub fn load_file(path: &Path) -> Result<Dataset> {
    std::fs::metadata(path).map_err(|e| IngestError::from_io(path, e))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "csv" => load_csv(path),
        "json" => load_json(path),
        other => Err(IngestError::parse(
            path,
            format!("unsupported file extension: .{other}"),
        )),
    }?;

    info!(
        "Loaded {} ({} rows, {} columns)",
        path.display(),
        dataset.len(),
        dataset.width()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of per-drive daily records.
///
/// Column types map onto [`ValueKind`]:
/// - integers (signed or unsigned) → `Integer`
/// - floats and decimals → `Float`
/// - strings and dictionary-encoded strings → `Categorical`
/// - `Date32`, `Date64`, `Timestamp` → `Date` (truncated to the day)
/// - booleans → `Boolean`
///
/// Works with files written by **Pandas**, **Polars** and Spark alike.
fn load_parquet(path: &Path) -> Result<Dataset> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::from_io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| IngestError::parse(path, format!("reading parquet metadata: {e}")))?;

    let fields: Vec<Field> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| -> Result<Field> {
            Ok(Field::new(f.name().clone(), kind_of(f.name(), f.data_type())?))
        })
        .collect::<Result<_>>()?;

    let reader = builder
        .build()
        .map_err(|e| IngestError::parse(path, format!("building parquet reader: {e}")))?;

    let mut records: Vec<Record> = Vec::new();
    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| IngestError::parse(path, format!("reading record batch: {e}")))?;

        let mut columns = Vec::with_capacity(fields.len());
        for (col, field) in batch.columns().iter().zip(&fields) {
            columns.push(column_values(col, field)?.into_iter());
        }

        for _ in 0..batch.num_rows() {
            let record: Record = columns
                .iter_mut()
                .map(|c| c.next().unwrap_or(Value::Null))
                .collect();
            records.push(record);
        }
    }

    Dataset::new(fields, records)
}

// -- Parquet / Arrow helpers --

fn kind_of(name: &str, data_type: &DataType) -> Result<ValueKind> {
    let kind = match data_type {
        DataType::Boolean => ValueKind::Boolean,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ValueKind::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ValueKind::Float,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
            ValueKind::Categorical
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => ValueKind::Date,
        DataType::Dictionary(_, values) => kind_of(name, values)?,
        other => {
            return Err(IngestError::Schema(format!(
                "column '{name}' has unsupported type {other:?}"
            )))
        }
    };
    Ok(kind)
}

/// Read a whole Arrow column as values of `field.kind`.
///
/// The column is first cast to the canonical Arrow type of the kind, with
/// overflow reported instead of silently turned into nulls.
fn column_values(col: &ArrayRef, field: &Field) -> Result<Vec<Value>> {
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let target = match field.kind {
        ValueKind::Boolean => DataType::Boolean,
        ValueKind::Integer => DataType::Int64,
        ValueKind::Float => DataType::Float64,
        ValueKind::Categorical => DataType::Utf8,
        ValueKind::Date => DataType::Date32,
    };
    let arr = cast_with_options(col, &target, &options).map_err(|e| {
        IngestError::Schema(format!("column '{}' cannot be read as {}: {e}", field.name, field.kind))
    })?;

    let values: Vec<Value> = match field.kind {
        ValueKind::Boolean => arr.as_boolean().iter().map(|v| Value::from(v.map(Value::Bool))).collect(),
        ValueKind::Integer => arr
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| Value::from(v.map(Value::Integer)))
            .collect(),
        ValueKind::Float => arr
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| Value::from(v.map(Value::Float)))
            .collect(),
        ValueKind::Categorical => arr
            .as_string::<i32>()
            .iter()
            .map(|v| Value::from(v.map(|s| Value::String(s.to_string()))))
            .collect(),
        ValueKind::Date => {
            let dates = arr.as_primitive::<Date32Type>();
            (0..dates.len())
                .map(|i| {
                    if dates.is_null(i) {
                        Value::Null
                    } else {
                        Value::from(dates.value_as_date(i))
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one drive-day per line, as in the
/// daily files Backblaze publishes.  Empty cells are missing values.
///
/// A column's kind is decided from all of its cells before any cell is
/// converted, so text columns keep their cells exactly as written.
fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| IngestError::parse(path, format!("CSV row {row_no}: {e}")))?;
        rows.push(record.iter().map(String::from).collect::<Vec<_>>());
    }

    from_text(headers, rows)
}

fn from_text(names: Vec<String>, rows: Vec<Vec<String>>) -> Result<Dataset> {
    let fields: Vec<Field> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = rows
                .iter()
                .filter_map(|r| guess_value(&r[i]).kind())
                .reduce(ValueKind::unify)
                .unwrap_or(ValueKind::Categorical);
            Field::new(name, kind)
        })
        .collect();

    let records = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&fields)
                .map(|(cell, field)| match field.kind {
                    _ if cell.is_empty() => Ok(Value::Null),
                    ValueKind::Categorical => Ok(Value::String(cell.clone())),
                    _ => coerce_cell(&guess_value(cell), field),
                })
                .collect::<Result<Record>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Dataset::new(fields, records)
}

fn csv_error(path: &Path, err: csv::Error) -> IngestError {
    if let csv::ErrorKind::Io(io) = err.kind() {
        if io.kind() == std::io::ErrorKind::NotFound {
            return IngestError::NotFound(path.to_path_buf());
        }
    }
    IngestError::parse(path, err)
}

/// `007` or `-0012`: digits after a leading zero mark an identifier, not a number.
fn has_leading_zero(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s).as_bytes();
    digits.first() == Some(&b'0') && digits.get(1).is_some_and(u8::is_ascii_digit)
}

fn guess_value(s: &str) -> Value {
    if s.is_empty() {
        return Value::Null;
    }
    if has_leading_zero(s) {
        return Value::String(s.to_string());
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if s == "true" || s == "false" {
        return Value::Bool(s == "true");
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Value::Date(d);
    }
    Value::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "date": "2017-01-01", "serial_number": "Z305B2QN", "failure": 0, "smart_5_raw": 0 },
///   ...
/// ]
/// ```
///
/// Keys missing from a record are null there.
fn load_json(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).map_err(|e| IngestError::from_io(path, e))?;
    let root: JsonValue = serde_json::from_str(&text).map_err(|e| IngestError::parse(path, e))?;

    let objects = root
        .as_array()
        .ok_or_else(|| IngestError::parse(path, "expected top-level JSON array"))?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in objects.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| IngestError::parse(path, format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let rows = objects
        .iter()
        .filter_map(|rec| rec.as_object())
        .map(|obj| {
            names
                .iter()
                .map(|name| obj.get(name).map(json_to_value).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    from_untyped(names, rows)
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => match parse_date(s) {
            Some(d) if s.len() == 10 => Value::Date(d),
            _ => Value::String(s.clone()),
        },
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

/// Give each column the unified kind of its cells and coerce them to it.
/// Columns holding only nulls are `Categorical`.
fn from_untyped(names: Vec<String>, rows: Vec<Record>) -> Result<Dataset> {
    let fields: Vec<Field> = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = rows
                .iter()
                .filter_map(|r| r.get(i).and_then(Value::kind))
                .reduce(ValueKind::unify)
                .unwrap_or(ValueKind::Categorical);
            Field::new(name, kind)
        })
        .collect();

    let records = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&fields)
                .map(|(v, f)| coerce_cell(v, f))
                .collect::<Result<Record>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Dataset::new(fields, records)
}

// ---------------------------------------------------------------------------
// Quarter directories of raw daily CSVs
// ---------------------------------------------------------------------------

/// Load and concatenate the raw daily CSV files of one year.
///
/// Backblaze ships each quarter as a `data_Q<n>_<year>` directory of daily
/// `YYYY-MM-DD.csv` files.  Directories are taken in quarter order (names
/// without a `Q<n>` part sort after, by name), at most `num_quarters` of them,
/// and their CSV files in name order.  Files without rows are skipped;
/// loading stops once `max_files` files have been read.  Columns that appear
/// only in some files are null elsewhere.
pub fn load_quarters(
    base: &Path,
    year: i32,
    num_quarters: usize,
    max_files: Option<usize>,
) -> Result<Dataset> {
    let suffix = format!("_{year}");
    let entries = std::fs::read_dir(base).map_err(|e| IngestError::from_io(base, e))?;

    let mut directories: Vec<(QuarterKey, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::from_io(base, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(middle) = name
            .strip_prefix("data_")
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
        {
            directories.push((QuarterKey::parse(middle), path.clone()));
        }
    }

    if directories.is_empty() {
        return Err(IngestError::NotFound(base.join(format!("data_*_{year}"))));
    }
    directories.sort();
    info!(
        "Found {} matching directories for {year}, using {}",
        directories.len(),
        num_quarters.min(directories.len())
    );

    let mut combined: Option<Dataset> = None;
    let mut loaded = 0usize;
    for (_, directory) in directories.into_iter().take(num_quarters) {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&directory).map_err(|e| IngestError::from_io(&directory, e))? {
            let path = entry.map_err(|e| IngestError::from_io(&directory, e))?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                files.push(path);
            }
        }
        files.sort();
        info!("Loading {} CSV files from {}", files.len(), directory.display());

        for file in files {
            let ds = load_csv(&file)?;
            if ds.is_empty() {
                debug!("Skipped empty file {}", file.display());
                continue;
            }
            loaded += 1;
            debug!("Loaded {} ({} rows, {} columns)", file.display(), ds.len(), ds.width());

            combined = Some(match combined {
                Some(acc) => acc.concat_relaxed(ds)?,
                None => ds,
            });
            if max_files.is_some_and(|max| loaded >= max) {
                info!("Stopped after {loaded} CSV files");
                return finish(combined);
            }
        }
    }

    info!("Loaded {loaded} CSV files");
    finish(combined)
}

fn finish(combined: Option<Dataset>) -> Result<Dataset> {
    combined.ok_or_else(|| IngestError::DataQuality("no rows found in any CSV file".into()))
}

/// Sort key of a quarter directory: `Q<n>` by number first, anything else by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum QuarterKey {
    Quarter(u32),
    Other(String),
}

impl QuarterKey {
    fn parse(middle: &str) -> Self {
        middle
            .strip_prefix('Q')
            .and_then(|n| n.parse::<u32>().ok())
            .map(QuarterKey::Quarter)
            .unwrap_or_else(|| QuarterKey::Other(middle.to_string()))
    }
}
