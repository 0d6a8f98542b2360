use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field as ArrowField, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;

use super::model::{Dataset, Value, ValueKind};
use crate::error::{IngestError, Result};

fn arrow_type(kind: ValueKind) -> DataType {
    match kind {
        ValueKind::Boolean => DataType::Boolean,
        ValueKind::Integer => DataType::Int64,
        ValueKind::Float => DataType::Float64,
        ValueKind::Categorical => DataType::Utf8,
        ValueKind::Date => DataType::Date32,
    }
}

fn days_since_epoch(d: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    (d - epoch).num_days() as i32
}

/// Convert a dataset to a single Arrow record batch.
pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(
        dataset
            .fields()
            .iter()
            .map(|f| ArrowField::new(f.name.clone(), arrow_type(f.kind), true))
            .collect::<Vec<_>>(),
    ));

    let columns: Vec<ArrayRef> = dataset
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let cells = dataset.records().iter().map(|r| &r[i]);
            let array: ArrayRef = match field.kind {
                ValueKind::Boolean => Arc::new(
                    cells
                        .map(|v| match v {
                            Value::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect::<BooleanArray>(),
                ),
                ValueKind::Integer => Arc::new(
                    cells
                        .map(|v| match v {
                            Value::Integer(n) => Some(*n),
                            _ => None,
                        })
                        .collect::<Int64Array>(),
                ),
                ValueKind::Float => Arc::new(cells.map(|v| v.as_f64()).collect::<Float64Array>()),
                ValueKind::Categorical => Arc::new(
                    cells
                        .map(|v| match v {
                            Value::String(s) => Some(s.as_str()),
                            _ => None,
                        })
                        .collect::<StringArray>(),
                ),
                ValueKind::Date => Arc::new(
                    cells
                        .map(|v| v.as_date().map(days_since_epoch))
                        .collect::<Date32Array>(),
                ),
            };
            array
        })
        .collect();

    let options = RecordBatchOptions::new().with_row_count(Some(dataset.len()));
    RecordBatch::try_new_with_options(schema, columns, &options)
        .map_err(|e| IngestError::Schema(format!("building record batch: {e}")))
}

/// Render the first `n` records as a text table.
pub fn preview(dataset: &Dataset, n: usize) -> Result<String> {
    let batch = to_record_batch(&dataset.head(n))?;
    let table = pretty_format_batches(&[batch])
        .map_err(|e| IngestError::Schema(format!("formatting preview: {e}")))?;
    Ok(format!(
        "shape: ({}, {})\n{table}",
        dataset.len(),
        dataset.width()
    ))
}

/// Write `dataset` to a Parquet file at `path`.
pub fn write_parquet(dataset: &Dataset, path: &Path) -> Result<()> {
    let write_err = |message: String| IngestError::Write {
        path: path.to_path_buf(),
        message,
    };

    let batch = to_record_batch(dataset)?;
    let file = std::fs::File::create(path).map_err(|e| IngestError::from_io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .map_err(|e| write_err(format!("creating writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| write_err(format!("writing batch: {e}")))?;
    writer
        .close()
        .map_err(|e| write_err(format!("closing writer: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_file;
    use crate::data::model::Field;

    fn sample() -> Dataset {
        Dataset::new(
            vec![
                Field::new("date", ValueKind::Date),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
                Field::new("smart_5_raw", ValueKind::Float),
                Field::new("ok", ValueKind::Boolean),
            ],
            vec![
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()),
                    Value::from("Z305B2QN"),
                    Value::Integer(0),
                    Value::Null,
                    Value::Bool(true),
                ],
                vec![
                    Value::Date(NaiveDate::from_ymd_opt(2017, 1, 2).unwrap()),
                    Value::from("Z305B2QN"),
                    Value::Integer(1),
                    Value::Float(16.0),
                    Value::Null,
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn parquet_files_read_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drives.parquet");
        write_parquet(&sample(), &path).unwrap();
        assert_eq!(load_file(&path).unwrap(), sample());
    }

    #[test]
    fn preview_shows_shape_and_only_first_rows() {
        let text = preview(&sample(), 1).unwrap();
        assert!(text.starts_with("shape: (2, 5)"));
        assert!(text.contains("2017-01-01"));
        assert!(!text.contains("2017-01-02"));
        assert!(text.contains("serial_number"));
    }

    #[test]
    fn empty_schema_still_converts() {
        let ds = Dataset::empty(Vec::new()).unwrap();
        assert_eq!(to_record_batch(&ds).unwrap().num_rows(), 0);
    }
}
