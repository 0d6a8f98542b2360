//! Per-drive daily timelines: gap filling and failure windows.

use chrono::NaiveDate;
use log::{debug, info};

use super::model::{Dataset, Record, Value, ValueKind, DATE, FAILURE, SERIAL_NUMBER};
use super::sampling::is_failure;
use crate::error::{IngestError, Result};

/// Records of one drive, ordered by day (stable for equal days).
fn drive_records<'a>(
    dataset: &'a Dataset,
    serial_idx: usize,
    date_idx: usize,
    serial: &Value,
) -> Vec<&'a Record> {
    let mut rows: Vec<&Record> = dataset
        .records()
        .iter()
        .filter(|r| r[serial_idx] == *serial)
        .collect();
    rows.sort_by(|a, b| a[date_idx].cmp(&b[date_idx]));
    rows
}

fn require_dates(dataset: &Dataset) -> Result<usize> {
    let idx = dataset.require(DATE)?;
    if dataset.fields()[idx].kind != ValueKind::Date {
        return Err(IngestError::Schema(format!(
            "column '{DATE}' holds {} values, expected dates",
            dataset.fields()[idx].kind
        )));
    }
    Ok(idx)
}

fn day_of(record: &Record, date_idx: usize) -> Result<NaiveDate> {
    record[date_idx]
        .as_date()
        .ok_or_else(|| IngestError::DataQuality(format!("record without a '{DATE}' value")))
}

/// Give every listed drive one record per day between its first and last
/// observation.
///
/// A missing day gets a copy of the drive's previous record with the date
/// replaced.  Output holds the listed drives in the given order, each sorted
/// by day; drives absent from `serials` are left out.
pub fn fill_date_gaps(dataset: &Dataset, serials: &[Value]) -> Result<Dataset> {
    let serial_idx = dataset.require(SERIAL_NUMBER)?;
    let date_idx = require_dates(dataset)?;
    info!("Fixing date gaps for {} serial numbers", serials.len());

    let mut out: Vec<Record> = Vec::new();
    let mut inserted = 0usize;
    for serial in serials {
        let mut previous: Option<(&Record, NaiveDate)> = None;
        for record in drive_records(dataset, serial_idx, date_idx, serial) {
            let day = day_of(record, date_idx)?;
            if let Some((prev, prev_day)) = previous {
                let mut next = prev_day.succ_opt();
                while let Some(d) = next.filter(|d| *d < day) {
                    let mut filler = prev.clone();
                    filler[date_idx] = Value::Date(d);
                    out.push(filler);
                    inserted += 1;
                    next = d.succ_opt();
                }
            }
            out.push(record.clone());
            previous = Some((record, day));
        }
    }
    debug!("Inserted {inserted} records for missing days");

    Dataset::new(dataset.fields().to_vec(), out)
}

/// Cut one window of `sequence_length` records out of each failed drive's
/// history, ending `lookahead` days before the first failure record.
///
/// With the failure at position `f` the window is `[f - lookahead + 1 -
/// sequence_length, f - lookahead + 1)`.  Drives with at most
/// `sequence_length + lookahead` records, without a failure record, or whose
/// window would start at or before the first record are skipped.
pub fn failure_sequences(
    dataset: &Dataset,
    failed: &[Value],
    sequence_length: usize,
    lookahead: usize,
) -> Result<Dataset> {
    let serial_idx = dataset.require(SERIAL_NUMBER)?;
    let failure_idx = dataset.require(FAILURE)?;
    let date_idx = dataset.require(DATE)?;
    info!("Creating sequences of data for {} failed disks", failed.len());

    let mut out: Vec<Record> = Vec::new();
    let mut created = 0usize;
    for serial in failed {
        let rows = drive_records(dataset, serial_idx, date_idx, serial);
        if rows.len() <= sequence_length + lookahead {
            continue;
        }
        let Some(first_failure) = rows.iter().position(|r| is_failure(&r[failure_idx])) else {
            debug!("Drive {serial} has no failure record, skipped");
            continue;
        };

        let end = first_failure as isize - lookahead as isize + 1;
        let start = end - sequence_length as isize;
        if start > 0 {
            let start = start as usize;
            out.extend(
                rows[start..start + sequence_length]
                    .iter()
                    .map(|r| (*r).clone()),
            );
            created += 1;
        }
    }
    info!(
        "Created {created} sequences of data for {} failed disks",
        failed.len()
    );

    Dataset::new(dataset.fields().to_vec(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Field;
    use pretty_assertions::assert_eq;

    fn day(d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(2017, 1, d).unwrap())
    }

    fn timeline(rows: &[(&str, u32, i64, f64)]) -> Dataset {
        Dataset::new(
            vec![
                Field::new(DATE, ValueKind::Date),
                Field::new(SERIAL_NUMBER, ValueKind::Categorical),
                Field::new(FAILURE, ValueKind::Integer),
                Field::new("smart_5_raw", ValueKind::Float),
            ],
            rows.iter()
                .map(|(s, d, f, v)| vec![day(*d), Value::from(*s), Value::Integer(*f), Value::Float(*v)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn gaps_are_forward_filled() {
        let ds = timeline(&[("A", 4, 0, 2.0), ("B", 1, 0, 9.0), ("A", 1, 0, 1.0)]);
        let filled = fill_date_gaps(&ds, &[Value::from("A")]).unwrap();

        let expected = timeline(&[
            ("A", 1, 0, 1.0),
            ("A", 2, 0, 1.0),
            ("A", 3, 0, 1.0),
            ("A", 4, 0, 2.0),
        ]);
        assert_eq!(filled, expected);
    }

    #[test]
    fn gap_filling_needs_typed_dates() {
        let ds = Dataset::new(
            vec![
                Field::new(DATE, ValueKind::Categorical),
                Field::new(SERIAL_NUMBER, ValueKind::Categorical),
            ],
            Vec::new(),
        )
        .unwrap();
        assert!(matches!(
            fill_date_gaps(&ds, &[]),
            Err(IngestError::Schema(_))
        ));
    }

    #[test]
    fn failure_window_ends_lookahead_before_failure() {
        // failure on day 8 (index 7)
        let rows: Vec<(&str, u32, i64, f64)> = (1..=8)
            .map(|d| ("F", d, i64::from(d == 8), d as f64))
            .chain([("short", 1, 0, 0.0), ("short", 2, 1, 0.0)])
            .collect();
        let ds = timeline(&rows);

        let windows =
            failure_sequences(&ds, &[Value::from("F"), Value::from("short")], 3, 2).unwrap();
        // end = 7 - 2 + 1 = 6, start = 3 -> days 4..=6
        let days: Vec<&Value> = windows.column(DATE).unwrap();
        assert_eq!(days, vec![&day(4), &day(5), &day(6)]);
    }

    #[test]
    fn window_touching_first_record_is_skipped() {
        let rows: Vec<(&str, u32, i64, f64)> =
            (1..=6).map(|d| ("F", d, i64::from(d == 5), 0.0)).collect();
        let ds = timeline(&rows);
        // end = 4 - 0 + 1 = 5, start = 0
        let windows = failure_sequences(&ds, &[Value::from("F")], 5, 0).unwrap();
        assert!(windows.is_empty());
    }
}
