use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::Deserialize;

use super::model::{coerce_cell, Dataset, Field, Value, ValueKind, DATE, FAILURE, SERIAL_NUMBER};
use crate::error::{IngestError, Result};

// ---------------------------------------------------------------------------
// Column matchers and rule pieces
// ---------------------------------------------------------------------------

/// Selects columns by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMatcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl ColumnMatcher {
    pub fn exact(name: impl Into<String>) -> Self {
        ColumnMatcher::Exact(name.into())
    }

    pub fn prefix(p: impl Into<String>) -> Self {
        ColumnMatcher::Prefix(p.into())
    }

    pub fn suffix(s: impl Into<String>) -> Self {
        ColumnMatcher::Suffix(s.into())
    }

    pub fn matches(&self, column: &str) -> bool {
        match self {
            ColumnMatcher::Exact(n) => column == n,
            ColumnMatcher::Prefix(p) => column.starts_with(p.as_str()),
            ColumnMatcher::Suffix(s) => column.ends_with(s.as_str()),
        }
    }
}

/// How missing values left after pruning and coercion are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Remove every record holding a null in any column.
    Drop,
    /// Numeric nulls become 0, boolean nulls `false`.
    #[default]
    ZeroFill,
    /// Leave nulls in optional columns untouched.
    Keep,
}

impl FromStr for MissingPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "drop" => Ok(MissingPolicy::Drop),
            "zero_fill" | "zero" => Ok(MissingPolicy::ZeroFill),
            "keep" => Ok(MissingPolicy::Keep),
            other => Err(IngestError::Config(format!("unknown missing-value policy '{other}'"))),
        }
    }
}

/// Keep only records whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetainFilter {
    pub column: String,
    pub value: Value,
}

/// Replace `from` by `to`, multiplying every value by `factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    pub from: String,
    pub to: String,
    pub factor: f64,
}

// ---------------------------------------------------------------------------
// CleaningRules – the rule set applied uniformly to every record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CleaningRules {
    /// Columns that must exist and must end up without nulls.
    pub mandatory: Vec<String>,
    pub retain: Vec<RetainFilter>,
    pub drop: Vec<ColumnMatcher>,
    pub units: Vec<UnitConversion>,
    /// Drop optional columns in which every value is null.
    pub drop_empty_columns: bool,
    /// First matching entry wins.
    pub types: Vec<(ColumnMatcher, ValueKind)>,
    pub missing: MissingPolicy,
    pub sort_by: Vec<String>,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            mandatory: Vec::new(),
            retain: Vec::new(),
            drop: Vec::new(),
            units: Vec::new(),
            drop_empty_columns: false,
            types: Vec::new(),
            missing: MissingPolicy::Drop,
            sort_by: Vec::new(),
        }
    }
}

impl CleaningRules {
    /// Rules for the Backblaze drive-stats export: keep raw SMART values as
    /// `f64`, drop the normalized duplicates and per-model constants, fill
    /// gaps with 0 and order by day then drive.
    pub fn backblaze() -> Self {
        Self {
            mandatory: vec![DATE.into(), SERIAL_NUMBER.into(), FAILURE.into()],
            retain: Vec::new(),
            drop: vec![
                ColumnMatcher::exact("model"),
                ColumnMatcher::exact("capacity_bytes"),
                ColumnMatcher::suffix("normalized"),
            ],
            units: Vec::new(),
            drop_empty_columns: false,
            types: vec![
                (ColumnMatcher::exact(DATE), ValueKind::Date),
                (ColumnMatcher::exact(SERIAL_NUMBER), ValueKind::Categorical),
                (ColumnMatcher::exact(FAILURE), ValueKind::Integer),
                (ColumnMatcher::prefix("smart_"), ValueKind::Float),
            ],
            missing: MissingPolicy::ZeroFill,
            sort_by: vec![DATE.into(), SERIAL_NUMBER.into()],
        }
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    /// Restrict to one drive model, e.g. `ST4000DM000`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.retain.push(RetainFilter {
            column: "model".into(),
            value: Value::String(model.into()),
        });
        self
    }

    pub fn with_empty_columns_dropped(mut self) -> Self {
        self.drop_empty_columns = true;
        self
    }

    fn is_mandatory(&self, column: &str) -> bool {
        self.mandatory.iter().any(|m| m == column)
    }

    fn declared_kind(&self, column: &str) -> Option<ValueKind> {
        self.types
            .iter()
            .find(|(m, _)| m.matches(column))
            .map(|(_, k)| *k)
    }
}

// ---------------------------------------------------------------------------
// DatasetKind – which rule set a dataset gets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    BackblazeHardDrive,
    /// Any table: drop records with missing values, nothing else.
    Generic,
}

impl DatasetKind {
    pub fn rules(self) -> CleaningRules {
        match self {
            DatasetKind::BackblazeHardDrive => CleaningRules::backblaze(),
            DatasetKind::Generic => CleaningRules::default(),
        }
    }
}

impl FromStr for DatasetKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        match key.as_str() {
            "backblaze hard drive" | "backblaze harddrive" | "backblaze" => {
                Ok(DatasetKind::BackblazeHardDrive)
            }
            "generic" => Ok(DatasetKind::Generic),
            _ => Err(IngestError::Config(format!("unknown dataset kind '{s}'"))),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::BackblazeHardDrive => f.write_str("backblaze hard drive"),
            DatasetKind::Generic => f.write_str("generic"),
        }
    }
}

// ---------------------------------------------------------------------------
// clean
// ---------------------------------------------------------------------------

/// Apply `rules` to `dataset`, returning a new dataset.
///
/// Steps, in order: mandatory-column check, row filters, column drops, unit
/// conversions, empty-column pruning, type coercion, missing values, sort.
/// Each step leaves already-clean input unchanged, so cleaning twice is the
/// same as cleaning once.
pub fn clean(dataset: &Dataset, rules: &CleaningRules) -> Result<Dataset> {
    for name in &rules.mandatory {
        dataset.require(name)?;
    }

    let mut ds = dataset.clone();

    for filter in &rules.retain {
        match ds.index_of(&filter.column) {
            Some(idx) => {
                let before = ds.len();
                ds = ds.filter_records(|r| r[idx] == filter.value);
                info!(
                    "Kept {} of {before} rows where {} = {}",
                    ds.len(),
                    filter.column,
                    filter.value
                );
            }
            None => debug!("Column '{}' absent, row filter skipped", filter.column),
        }
    }

    let dropped: Vec<&str> = ds
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .filter(|n| !rules.is_mandatory(n) && rules.drop.iter().any(|m| m.matches(n)))
        .collect();
    if dropped.is_empty() {
        info!("No columns to drop");
    } else {
        info!("Dropping columns: {dropped:?}");
        let dropped: Vec<String> = dropped.into_iter().map(String::from).collect();
        ds = ds.select_columns(|_, f| !dropped.contains(&f.name));
    }

    for conversion in &rules.units {
        ds = convert_units(ds, conversion)?;
    }

    // with no records every column looks empty
    if rules.drop_empty_columns && !ds.is_empty() {
        let empty: Vec<String> = ds
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, f)| {
                !rules.is_mandatory(&f.name) && ds.records().iter().all(|r| r[*i].is_null())
            })
            .map(|(_, f)| f.name.clone())
            .collect();
        if !empty.is_empty() {
            info!("Dropping {} columns without any value", empty.len());
            ds = ds.select_columns(|_, f| !empty.contains(&f.name));
        }
    }

    ds = coerce_types(ds, rules)?;
    ds = resolve_missing(ds, rules)?;

    if !rules.sort_by.is_empty() {
        let keys = rules
            .sort_by
            .iter()
            .map(|k| ds.require(k))
            .collect::<Result<Vec<_>>>()?;
        info!("Sorting by {:?}", rules.sort_by);
        let (fields, mut records) = ds.into_parts();
        records.sort_by(|a, b| {
            keys.iter()
                .map(|&k| a[k].cmp(&b[k]))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ds = Dataset::new(fields, records)?;
    }

    Ok(ds)
}

/// Clean with the rule set registered for `kind`.
pub fn clean_as(dataset: &Dataset, kind: DatasetKind) -> Result<Dataset> {
    clean(dataset, &kind.rules())
}

fn convert_units(ds: Dataset, conversion: &UnitConversion) -> Result<Dataset> {
    let Some(src) = ds.index_of(&conversion.from) else {
        return Ok(ds);
    };
    if ds.index_of(&conversion.to).is_some() {
        return Err(IngestError::Schema(format!(
            "cannot convert '{}': column '{}' already exists",
            conversion.from, conversion.to
        )));
    }
    info!(
        "Converting '{}' to '{}' (x{})",
        conversion.from, conversion.to, conversion.factor
    );

    let (mut fields, mut records) = ds.into_parts();
    let from_field = fields[src].clone();
    if !from_field.kind.is_numeric() {
        return Err(IngestError::Schema(format!(
            "cannot convert units of {} column '{}'",
            from_field.kind, from_field.name
        )));
    }
    fields[src] = Field::new(conversion.to.clone(), ValueKind::Float);
    for record in &mut records {
        record[src] = match record[src].as_f64() {
            Some(v) => Value::Float(v * conversion.factor),
            None => Value::Null,
        };
    }
    Dataset::new(fields, records)
}

fn coerce_types(ds: Dataset, rules: &CleaningRules) -> Result<Dataset> {
    let (mut fields, mut records) = ds.into_parts();
    let mut converted = 0usize;
    for (idx, field) in fields.iter_mut().enumerate() {
        let Some(kind) = rules.declared_kind(&field.name) else {
            continue;
        };
        if field.kind == kind {
            continue;
        }
        debug!("Casting '{}' from {} to {kind}", field.name, field.kind);
        field.kind = kind;
        for record in &mut records {
            record[idx] = coerce_cell(&record[idx], field)?;
        }
        converted += 1;
    }
    if converted > 0 {
        info!("Converted {converted} columns to their declared types");
    }
    for (matcher, _) in &rules.types {
        if let ColumnMatcher::Prefix(p) = matcher {
            if !fields.iter().any(|f| matcher.matches(&f.name)) {
                warn!("No {p}* columns found");
            }
        }
    }
    Dataset::new(fields, records)
}

fn resolve_missing(ds: Dataset, rules: &CleaningRules) -> Result<Dataset> {
    let ds = match rules.missing {
        MissingPolicy::Drop => {
            let before = ds.len();
            let kept = ds.filter_records(|r| r.iter().all(|v| !v.is_null()));
            if kept.len() < before {
                info!("Dropped {} rows with missing values", before - kept.len());
            }
            kept
        }
        MissingPolicy::ZeroFill => {
            let (fields, mut records) = ds.into_parts();
            let mut filled = 0usize;
            for record in &mut records {
                for (value, field) in record.iter_mut().zip(&fields) {
                    if !value.is_null() {
                        continue;
                    }
                    let zero = match field.kind {
                        ValueKind::Integer => Value::Integer(0),
                        ValueKind::Float => Value::Float(0.0),
                        ValueKind::Boolean => Value::Bool(false),
                        ValueKind::Categorical | ValueKind::Date => continue,
                    };
                    *value = zero;
                    filled += 1;
                }
            }
            if filled > 0 {
                info!("Filled {filled} missing values with 0");
            }
            Dataset::new(fields, records)?
        }
        MissingPolicy::Keep => ds,
    };

    for name in &rules.mandatory {
        let nulls = ds.null_count(name)?;
        if nulls > 0 {
            return Err(IngestError::DataQuality(format!(
                "mandatory column '{name}' has {nulls} missing values and no rule resolves them"
            )));
        }
    }
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn raw() -> Dataset {
        let fields = vec![
            Field::new("date", ValueKind::Categorical),
            Field::new("serial_number", ValueKind::Categorical),
            Field::new("model", ValueKind::Categorical),
            Field::new("capacity_bytes", ValueKind::Integer),
            Field::new("failure", ValueKind::Integer),
            Field::new("smart_5_raw", ValueKind::Integer),
            Field::new("smart_5_normalized", ValueKind::Integer),
            Field::new("smart_9_raw", ValueKind::Integer),
        ];
        let row = |date: &str, serial: &str, model: &str, failure: i64, s5: Option<i64>| {
            vec![
                Value::from(date),
                Value::from(serial),
                Value::from(model),
                Value::Integer(4_000_787_030_016),
                Value::Integer(failure),
                Value::from(s5),
                Value::Integer(100),
                Value::Null,
            ]
        };
        Dataset::new(
            fields,
            vec![
                row("2017-01-02", "B", "ST4000DM000", 0, Some(3)),
                row("2017-01-01", "B", "ST4000DM000", 0, None),
                row("2017-01-01", "A", "ST8000DM002", 1, Some(8)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn backblaze_rules_prune_cast_fill_and_sort() {
        let cleaned = clean_as(&raw(), DatasetKind::BackblazeHardDrive).unwrap();

        assert_eq!(
            cleaned.column_names(),
            vec!["date", "serial_number", "failure", "smart_5_raw", "smart_9_raw"]
        );
        assert_eq!(cleaned.field("date").unwrap().kind, ValueKind::Date);
        assert_eq!(cleaned.field("smart_5_raw").unwrap().kind, ValueKind::Float);

        let d = |day| Value::Date(NaiveDate::from_ymd_opt(2017, 1, day).unwrap());
        assert_eq!(
            cleaned.records(),
            &[
                vec![d(1), Value::from("A"), Value::Integer(1), Value::Float(8.0), Value::Float(0.0)],
                vec![d(1), Value::from("B"), Value::Integer(0), Value::Float(0.0), Value::Float(0.0)],
                vec![d(2), Value::from("B"), Value::Integer(0), Value::Float(3.0), Value::Float(0.0)],
            ]
        );
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let rules = CleaningRules::backblaze()
            .with_model("ST4000DM000")
            .with_empty_columns_dropped();
        let once = clean(&raw(), &rules).unwrap();
        let twice = clean(&once, &rules).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
        assert!(once.index_of("smart_9_raw").is_none());
    }

    #[test]
    fn cleaning_to_no_rows_keeps_columns_on_second_pass() {
        let ds = Dataset::new(
            vec![
                Field::new("date", ValueKind::Categorical),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
                Field::new("smart_5_raw", ValueKind::Integer),
                Field::new("smart_9_raw", ValueKind::Integer),
            ],
            vec![
                vec![
                    Value::from("2017-01-01"),
                    Value::from("A"),
                    Value::Integer(0),
                    Value::Null,
                    Value::Integer(7),
                ],
                vec![
                    Value::from("2017-01-01"),
                    Value::from("B"),
                    Value::Integer(0),
                    Value::Integer(2),
                    Value::Null,
                ],
            ],
        )
        .unwrap();
        let rules = CleaningRules::backblaze()
            .with_missing(MissingPolicy::Drop)
            .with_empty_columns_dropped();

        let once = clean(&ds, &rules).unwrap();
        let twice = clean(&once, &rules).unwrap();
        assert!(once.is_empty());
        assert_eq!(
            once.column_names(),
            vec!["date", "serial_number", "failure", "smart_5_raw", "smart_9_raw"]
        );
        assert_eq!(once, twice);
    }

    #[test]
    fn drop_policy_removes_incomplete_rows() {
        let rules = CleaningRules::backblaze().with_missing(MissingPolicy::Drop);
        let mut ds = raw();
        ds = ds.select_columns(|_, f| f.name != "smart_9_raw");
        let cleaned = clean(&ds, &rules).unwrap();
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned.null_count("smart_5_raw").unwrap(), 0);
    }

    #[test]
    fn missing_mandatory_column_is_a_schema_error() {
        let ds = raw().select_columns(|_, f| f.name != "serial_number");
        let err = clean_as(&ds, DatasetKind::BackblazeHardDrive).unwrap_err();
        assert!(matches!(err, IngestError::Schema(msg) if msg.contains("serial_number")));
    }

    #[test]
    fn unparseable_value_is_a_schema_error() {
        let ds = Dataset::new(
            vec![
                Field::new("date", ValueKind::Categorical),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
            ],
            vec![vec![Value::from("not a date"), Value::from("A"), Value::Integer(0)]],
        )
        .unwrap();
        let err = clean_as(&ds, DatasetKind::BackblazeHardDrive).unwrap_err();
        assert!(matches!(err, IngestError::Schema(_)));
    }

    #[test]
    fn unfillable_mandatory_null_is_a_data_quality_error() {
        let ds = Dataset::new(
            vec![
                Field::new("date", ValueKind::Categorical),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
            ],
            vec![vec![Value::from("2017-01-01"), Value::Null, Value::Integer(0)]],
        )
        .unwrap();
        let err = clean_as(&ds, DatasetKind::BackblazeHardDrive).unwrap_err();
        assert!(matches!(err, IngestError::DataQuality(_)));
    }

    #[test]
    fn keep_policy_still_rejects_mandatory_nulls() {
        let ds = Dataset::new(
            vec![
                Field::new("date", ValueKind::Categorical),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
            ],
            vec![vec![Value::from("2017-01-01"), Value::from("A"), Value::Null]],
        )
        .unwrap();
        let rules = CleaningRules::backblaze().with_missing(MissingPolicy::Keep);
        let err = clean(&ds, &rules).unwrap_err();
        assert!(matches!(err, IngestError::DataQuality(msg) if msg.contains("failure")));
    }

    #[test]
    fn zero_fill_leaves_optional_text_nulls_alone() {
        let ds = Dataset::new(
            vec![
                Field::new("date", ValueKind::Categorical),
                Field::new("serial_number", ValueKind::Categorical),
                Field::new("failure", ValueKind::Integer),
                Field::new("firmware", ValueKind::Categorical),
                Field::new("smart_5_raw", ValueKind::Integer),
            ],
            vec![vec![
                Value::from("2017-01-01"),
                Value::from("A"),
                Value::Integer(0),
                Value::Null,
                Value::Null,
            ]],
        )
        .unwrap();
        let cleaned = clean_as(&ds, DatasetKind::BackblazeHardDrive).unwrap();
        assert_eq!(cleaned.column("firmware").unwrap(), vec![&Value::Null]);
        assert_eq!(cleaned.column("smart_5_raw").unwrap(), vec![&Value::Float(0.0)]);
    }

    #[test]
    fn unit_conversion_renames_and_scales_once() {
        let rules = CleaningRules {
            units: vec![UnitConversion {
                from: "capacity_bytes".into(),
                to: "capacity_tb".into(),
                factor: 1e-12,
            }],
            missing: MissingPolicy::Keep,
            ..CleaningRules::default()
        };
        let once = clean(&raw(), &rules).unwrap();
        let twice = clean(&once, &rules).unwrap();
        assert_eq!(once, twice);
        let tb = once.column("capacity_tb").unwrap()[0].as_f64().unwrap();
        assert!((tb - 4.000787030016).abs() < 1e-9);
        assert!(once.index_of("capacity_bytes").is_none());
    }

    #[test]
    fn generic_rules_only_drop_incomplete_rows() {
        let cleaned = clean_as(&raw(), DatasetKind::Generic).unwrap();
        // smart_9_raw is null everywhere
        assert!(cleaned.is_empty());
        assert_eq!(cleaned.width(), raw().width());
    }

    #[test]
    fn parses_kind_and_policy_names() {
        assert_eq!(
            "backblaze hard drive".parse::<DatasetKind>().unwrap(),
            DatasetKind::BackblazeHardDrive
        );
        assert_eq!("Backblaze_HardDrive".parse::<DatasetKind>().unwrap(), DatasetKind::BackblazeHardDrive);
        assert!("turbofan".parse::<DatasetKind>().is_err());
        assert_eq!("zero-fill".parse::<MissingPolicy>().unwrap(), MissingPolicy::ZeroFill);
    }
}
