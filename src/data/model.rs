use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{IngestError, Result};

/// Column holding the observation day.
pub const DATE: &str = "date";
/// Column identifying the drive.
pub const SERIAL_NUMBER: &str = "serial_number";
/// Column holding the failure label (1 on the day a drive failed).
pub const FAILURE: &str = "failure";

// ---------------------------------------------------------------------------
// Value – a single cell of a record
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the dtypes found in SMART exports.
/// Rows are sorted and serials collected into ordered sets, so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

// -- Manual Eq/Ord so rows can be sorted and values put in a BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as an `f64` where that is lossless enough for analysis.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The kind this value naturally belongs to, `None` for nulls.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::String(_) => Some(ValueKind::Categorical),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Date(_) => Some(ValueKind::Date),
            Value::Null => None,
        }
    }

    /// Convert to `kind`, returning `None` when the value has no meaning there.
    ///
    /// Nulls stay null. Coercing a value that already has the target kind
    /// returns it unchanged, which keeps repeated cleaning a no-op.
    pub fn coerce(&self, kind: ValueKind) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }
        match kind {
            ValueKind::Float => match self {
                Value::Float(v) => Some(Value::Float(*v)),
                Value::Integer(i) => Some(Value::Float(*i as f64)),
                Value::Bool(b) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::String(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            ValueKind::Integer => match self {
                Value::Integer(i) => Some(Value::Integer(*i)),
                // i64::MAX as f64 rounds up to 2^63, hence the half-open range
                Value::Float(v)
                    if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(v) =>
                {
                    Some(Value::Integer(*v as i64))
                }
                Value::Bool(b) => Some(Value::Integer(i64::from(*b))),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
                _ => None,
            },
            ValueKind::Boolean => match self {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::Integer(0) => Some(Value::Bool(false)),
                Value::Integer(1) => Some(Value::Bool(true)),
                Value::String(s) => match s.trim() {
                    "true" | "1" => Some(Value::Bool(true)),
                    "false" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ValueKind::Categorical => Some(Value::String(self.to_string())),
            ValueKind::Date => match self {
                Value::Date(d) => Some(Value::Date(*d)),
                Value::String(s) => parse_date(s).map(Value::Date),
                _ => None,
            },
        }
    }
}

/// Parse `YYYY-MM-DD`, or a date-time whose day is kept.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

// ---------------------------------------------------------------------------
// ValueKind / Field – the schema
// ---------------------------------------------------------------------------

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Integer,
    Float,
    Categorical,
    Date,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Float)
    }

    /// Smallest kind able to hold values of both `self` and `other`.
    pub fn unify(self, other: ValueKind) -> ValueKind {
        use ValueKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            (Boolean, Float) | (Float, Boolean) => Float,
            (Boolean, Integer) | (Integer, Boolean) => Integer,
            _ => Categorical,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "bool",
            ValueKind::Integer => "i64",
            ValueKind::Float => "f64",
            ValueKind::Categorical => "str",
            ValueKind::Date => "date",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: ValueKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Field {
            name: name.into(),
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Record / Dataset
// ---------------------------------------------------------------------------

/// One row: a (device, day) observation, one value per field.
pub type Record = Vec<Value>;

/// An ordered collection of records sharing one schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    fields: Vec<Field>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset, checking that names are unique and every record
    /// matches the schema width and kinds.
    pub fn new(fields: Vec<Field>, records: Vec<Record>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(IngestError::Schema(format!(
                    "duplicate column '{}'",
                    field.name
                )));
            }
        }
        for (row, record) in records.iter().enumerate() {
            if record.len() != fields.len() {
                return Err(IngestError::Schema(format!(
                    "row {row} has {} values but the schema has {} columns",
                    record.len(),
                    fields.len()
                )));
            }
            for (value, field) in record.iter().zip(&fields) {
                if let Some(kind) = value.kind() {
                    if kind != field.kind {
                        return Err(IngestError::Schema(format!(
                            "row {row}, column '{}': {kind} value in {} column",
                            field.name, field.kind
                        )));
                    }
                }
            }
        }
        Ok(Dataset { fields, records })
    }

    pub fn empty(fields: Vec<Field>) -> Result<Self> {
        Dataset::new(fields, Vec::new())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_parts(self) -> (Vec<Field>, Vec<Record>) {
        (self.fields, self.records)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Like [`Dataset::index_of`] but a missing column is a schema error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| IngestError::Schema(format!("missing required column '{name}'")))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>> {
        let idx = self.require(name)?;
        Ok(self.records.iter().map(|r| &r[idx]).collect())
    }

    pub fn null_count(&self, name: &str) -> Result<usize> {
        Ok(self.column(name)?.iter().filter(|v| v.is_null()).count())
    }

    /// The first `n` records.
    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            fields: self.fields.clone(),
            records: self.records.iter().take(n).cloned().collect(),
        }
    }

    /// Records at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            fields: self.fields.clone(),
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }

    pub fn filter_records(&self, mut keep: impl FnMut(&Record) -> bool) -> Dataset {
        Dataset {
            fields: self.fields.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Keep only the columns whose index satisfies `keep`.
    pub fn select_columns(&self, keep: impl Fn(usize, &Field) -> bool) -> Dataset {
        let kept: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(i, f)| keep(*i, *f))
            .map(|(i, _)| i)
            .collect();
        Dataset {
            fields: kept.iter().map(|&i| self.fields[i].clone()).collect(),
            records: self
                .records
                .iter()
                .map(|r| kept.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        }
    }

    /// Append `other` below `self`, widening the schema to the union of both
    /// column sets. Columns absent from one side are null there and shared
    /// columns take the unified kind.
    pub fn concat_relaxed(self, other: Dataset) -> Result<Dataset> {
        let mut fields = self.fields.clone();
        for field in &other.fields {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => existing.kind = existing.kind.unify(field.kind),
                None => fields.push(field.clone()),
            }
        }

        let mut records = Vec::with_capacity(self.records.len() + other.records.len());
        for part in [self, other] {
            let mapping: Vec<Option<usize>> =
                fields.iter().map(|f| part.index_of(&f.name)).collect();
            for record in part.records {
                let mut widened = Vec::with_capacity(fields.len());
                for (field, src) in fields.iter().zip(&mapping) {
                    let value = match src {
                        Some(i) => coerce_cell(&record[*i], field)?,
                        None => Value::Null,
                    };
                    widened.push(value);
                }
                records.push(widened);
            }
        }
        Ok(Dataset { fields, records })
    }
}

/// Coerce one cell into its field's kind, or explain why it cannot be.
pub(crate) fn coerce_cell(value: &Value, field: &Field) -> Result<Value> {
    value.coerce(field.kind).ok_or_else(|| {
        IngestError::Schema(format!(
            "column '{}': cannot interpret '{value}' as {}",
            field.name, field.kind
        ))
    })
}
