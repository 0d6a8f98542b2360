//! Drive selection and class balancing over a cleaned dataset.

use std::collections::{BTreeSet, HashMap};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::model::{Dataset, Value, FAILURE, SERIAL_NUMBER};
use crate::error::{IngestError, Result};

pub(crate) fn is_failure(v: &Value) -> bool {
    matches!(v, Value::Bool(true)) || v.as_f64() == Some(1.0)
}

/// Serial numbers split by outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSerials {
    /// Every drive with at least one failure record, ascending.
    pub failed: Vec<Value>,
    /// Drives that never failed, most observed first.
    pub normal: Vec<Value>,
}

/// Collect failed drives and the `num_normal` longest-observed healthy drives.
/// Ties in observation count are broken by serial number.
pub fn disk_serials(dataset: &Dataset, num_normal: usize) -> Result<DiskSerials> {
    let serial = dataset.require(SERIAL_NUMBER)?;
    let failure = dataset.require(FAILURE)?;

    let failed: BTreeSet<&Value> = dataset
        .records()
        .iter()
        .filter(|r| is_failure(&r[failure]))
        .map(|r| &r[serial])
        .collect();
    info!("Number of failed disks: {}", failed.len());

    let mut counts: HashMap<&Value, usize> = HashMap::new();
    for record in dataset.records() {
        if !failed.contains(&record[serial]) {
            *counts.entry(&record[serial]).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&Value, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let normal: Vec<Value> = ranked
        .into_iter()
        .take(num_normal)
        .map(|(s, _)| s.clone())
        .collect();
    info!("Number of normal disks: {}", normal.len());

    Ok(DiskSerials {
        failed: failed.into_iter().cloned().collect(),
        normal,
    })
}

/// Downsample healthy records to `ratio` times the number of failure records.
///
/// All failure records are kept.  Healthy records are drawn without
/// replacement from a generator seeded with `seed`, so the same input and
/// seed always give the same output.  Record order is preserved.
pub fn balance(dataset: &Dataset, ratio: f64, seed: u64) -> Result<Dataset> {
    if !ratio.is_finite() || ratio < 0.0 {
        return Err(IngestError::Config(format!(
            "balance ratio must be a non-negative number, got {ratio}"
        )));
    }
    let failure = dataset.require(FAILURE)?;

    let (failed, normal): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| is_failure(&dataset.records()[i][failure]));

    let target = (failed.len() as f64 * ratio) as usize;
    let n_normal = if target > normal.len() {
        warn!(
            "Requested {target} normal samples but only {} exist; keeping all",
            normal.len()
        );
        normal.len()
    } else {
        target
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut keep = failed.clone();
    keep.extend(
        rand::seq::index::sample(&mut rng, normal.len(), n_normal)
            .iter()
            .map(|i| normal[i]),
    );
    keep.sort_unstable();

    info!("Original dataset size: {}", dataset.len());
    info!("Balanced dataset size: {}", keep.len());
    info!("Number of failed samples: {}", failed.len());
    info!("Number of normal samples: {n_normal}");

    Ok(dataset.take(&keep))
}

/// Split into (features, target) around the `label` column.
pub fn feature_target_split(dataset: &Dataset, label: &str) -> Result<(Dataset, Dataset)> {
    dataset.require(label)?;
    let features = dataset.select_columns(|_, f| f.name != label);
    let target = dataset.select_columns(|_, f| f.name == label);
    Ok((features, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Field, ValueKind};

    fn drives(rows: &[(&str, i64)]) -> Dataset {
        Dataset::new(
            vec![
                Field::new(SERIAL_NUMBER, ValueKind::Categorical),
                Field::new(FAILURE, ValueKind::Integer),
            ],
            rows.iter()
                .map(|(s, f)| vec![Value::from(*s), Value::Integer(*f)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn serials_split_by_outcome_and_rank_by_count() {
        let ds = drives(&[
            ("C", 0),
            ("A", 0),
            ("A", 0),
            ("F", 0),
            ("F", 1),
            ("B", 0),
            ("B", 0),
            ("D", 0),
        ]);
        let serials = disk_serials(&ds, 2).unwrap();
        assert_eq!(serials.failed, vec![Value::from("F")]);
        assert_eq!(serials.normal, vec![Value::from("A"), Value::from("B")]);
    }

    #[test]
    fn balance_is_seeded_and_keeps_every_failure() {
        let mut rows = vec![("F1", 1), ("F2", 1)];
        rows.extend(std::iter::repeat(("N", 0)).take(20));
        let ds = drives(&rows);

        let a = balance(&ds, 1.5, 7).unwrap();
        let b = balance(&ds, 1.5, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        let failures = a
            .column(FAILURE)
            .unwrap()
            .into_iter()
            .filter(|v| is_failure(v))
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn balance_clamps_to_available_normals() {
        let ds = drives(&[("F", 1), ("F", 1), ("N", 0)]);
        assert_eq!(balance(&ds, 10.0, 1).unwrap().len(), 3);
        assert!(balance(&ds, -1.0, 1).is_err());
    }

    #[test]
    fn split_separates_label() {
        let ds = drives(&[("A", 0)]);
        let (x, y) = feature_target_split(&ds, FAILURE).unwrap();
        assert_eq!(x.column_names(), vec![SERIAL_NUMBER]);
        assert_eq!(y.column_names(), vec![FAILURE]);
        assert!(matches!(
            feature_target_split(&ds, "label"),
            Err(IngestError::Schema(_))
        ));
    }
}
