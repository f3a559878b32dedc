// In-memory tabular dataset: named, typed columns with row order preserved

use crate::error::DataError;
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The numeric value of a cell. NaN counts as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a cell. Arrays and objects have no cell form.
    pub fn from_json(value: &JsonValue) -> Option<Value> {
        match value {
            JsonValue::Null => Some(Value::Null),
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::Number(n) => n.as_f64().map(Value::Number),
            JsonValue::String(s) => Some(Value::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Number(n) => json!(n),
            Value::Text(s) => json!(s),
            Value::Bool(b) => json!(b),
            Value::Timestamp(ts) => json!(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Value::Null => JsonValue::Null,
        }
    }

    /// Total ordering used when grouping: nulls last, then by kind, then by value.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Bool(_) => 0,
                Value::Number(_) => 1,
                Value::Timestamp(_) => 2,
                Value::Text(_) => 3,
                Value::Null => 4,
            }
        }
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
            Value::Null => Ok(()),
        }
    }
}

/// Render a timestamp without a time part when it falls on midnight.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.time() == chrono::NaiveTime::default() {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Parse ISO-8601 dates and datetimes (with or without offset).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Column type, derived from the non-null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    Text,
    Boolean,
    Timestamp,
    /// Non-null cells of more than one kind
    Mixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<Value>,
    kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let kind = infer_kind(&values);
        Self {
            name: name.into(),
            values,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn kind(&self) -> ColumnType {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnType::Numeric
    }

    pub fn is_timestamp(&self) -> bool {
        self.kind == ColumnType::Timestamp
    }

    /// Numeric cells with nulls dropped. Fails for non-numeric columns.
    pub fn numbers(&self) -> Result<Vec<f64>> {
        if !self.is_numeric() {
            return Err(anyhow!("Column '{}' is not numeric", self.name));
        }
        Ok(self.values.iter().filter_map(Value::as_f64).collect())
    }
}

/// An all-null (or empty) column counts as numeric, like a column of NaN.
fn infer_kind(values: &[Value]) -> ColumnType {
    let mut kind: Option<ColumnType> = None;
    for value in values {
        let cell_kind = match value {
            Value::Null => continue,
            Value::Number(_) => ColumnType::Numeric,
            Value::Text(_) => ColumnType::Text,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Timestamp(_) => ColumnType::Timestamp,
        };
        match kind {
            None => kind = Some(cell_kind),
            Some(k) if k != cell_kind => return ColumnType::Mixed,
            Some(_) => {}
        }
    }
    kind.unwrap_or(ColumnType::Numeric)
}

/// Ordered sequence of equal-length named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> std::result::Result<Self, DataError> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(DataError::RaggedColumns {
                    column: bad.name.clone(),
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Build a dataset from row-major cells.
    pub fn from_rows(
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> std::result::Result<Self, DataError> {
        let mut cols: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); headers.len()];
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != headers.len() {
                return Err(DataError::RaggedColumns {
                    column: format!("row {}", row_idx + 1),
                    expected: headers.len(),
                    actual: row.len(),
                });
            }
            for (col, value) in cols.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Self::new(
            headers
                .into_iter()
                .zip(cols)
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
    }

    /// Read CSV text, inferring each column's type from its cells.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (row_idx, record) in rdr.records().enumerate() {
            let record =
                record.with_context(|| format!("Failed to read CSV row {}", row_idx + 1))?;
            for (col, field) in raw.iter_mut().zip(record.iter()) {
                col.push(field.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, cells)| Column::new(name, infer_cells(cells)))
            .collect();
        Ok(Self::new(columns)?)
    }

    /// Build a dataset from a JSON array of objects. Keys of the first
    /// object define the columns; missing keys become nulls.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let array = value
            .as_array()
            .ok_or_else(|| anyhow!("Input data must be a JSON array of objects"))?;

        let headers: Vec<String> = match array.first() {
            Some(first) => first
                .as_object()
                .ok_or_else(|| anyhow!("Items in array must be objects"))?
                .keys()
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let mut cols: Vec<Vec<Value>> = vec![Vec::with_capacity(array.len()); headers.len()];
        for item in array {
            let obj = item
                .as_object()
                .ok_or_else(|| anyhow!("Items in array must be objects"))?;
            for (header, col) in headers.iter().zip(cols.iter_mut()) {
                let cell = match obj.get(header) {
                    Some(v) => Value::from_json(v).ok_or_else(|| {
                        anyhow!("Unsupported value type for field '{}'", header)
                    })?,
                    None => Value::Null,
                };
                col.push(cell);
            }
        }

        let columns = headers
            .into_iter()
            .zip(cols)
            .map(|(name, values)| Column::new(name, promote_timestamps(values)))
            .collect();
        Ok(Self::new(columns)?)
    }

    /// Read the first worksheet of a workbook. The first row holds the
    /// column names; every following row is a record.
    pub fn from_spreadsheet(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| anyhow!("Failed to open workbook '{}': {}", path.display(), e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("Workbook '{}' has no worksheets", path.display()))?
            .map_err(|e| anyhow!("Failed to read first worksheet of '{}': {}", path.display(), e))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header) => header
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell.as_string() {
                    Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                    Some(_) => format!("Unnamed: {}", i),
                    None if cell.is_empty() => format!("Unnamed: {}", i),
                    None => cell.to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        let mut cols: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
        for row in rows {
            for (i, col) in cols.iter_mut().enumerate() {
                col.push(row.get(i).map(sheet_cell).unwrap_or(Value::Null));
            }
        }
        log::debug!(
            "Read {} rows x {} columns from '{}'",
            cols.first().map(Vec::len).unwrap_or(0),
            headers.len(),
            path.display()
        );

        let columns = headers
            .into_iter()
            .zip(cols)
            .map(|(name, values)| Column::new(name, promote_timestamps(values)))
            .collect();
        Ok(Self::new(columns)?)
    }

    /// Load a dataset from disk, choosing the reader by file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        match ext.as_str() {
            ".csv" => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open '{}'", path.display()))?;
                Self::from_csv(file)
                    .with_context(|| format!("Failed to parse '{}'", path.display()))
            }
            ".json" => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open '{}'", path.display()))?;
                let value: JsonValue = serde_json::from_reader(file)
                    .with_context(|| format!("Failed to parse '{}'", path.display()))?;
                Self::from_json(&value)
            }
            ".xlsx" | ".xlsm" | ".xls" => Self::from_spreadsheet(path),
            _ => Err(DataError::UnsupportedFileType(ext).into()),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }

    /// Keep the rows where `mask` is true, preserving row and column order.
    pub fn select_rows(&self, mask: &[bool]) -> std::result::Result<Dataset, DataError> {
        if mask.len() != self.n_rows() {
            return Err(DataError::MaskLength {
                expected: self.n_rows(),
                actual: mask.len(),
            });
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect(),
                kind: c.kind,
            })
            .collect();
        Ok(Dataset { columns })
    }

    /// All rows as JSON objects keyed by column name.
    pub fn records(&self) -> Vec<JsonValue> {
        self.head_records(self.n_rows())
    }

    /// The first `n` rows as JSON objects, for previews.
    pub fn head_records(&self, n: usize) -> Vec<JsonValue> {
        (0..self.n_rows().min(n))
            .map(|row| {
                let obj: Map<String, JsonValue> = self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values[row].to_json()))
                    .collect();
                JsonValue::Object(obj)
            })
            .collect()
    }
}

/// Field spellings read as a missing value.
const MISSING_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(field: &str) -> bool {
    MISSING_TOKENS.contains(&field.trim())
}

/// Type a column of raw CSV fields as a whole: a column only becomes
/// numeric/boolean/timestamp when every non-missing field parses as such.
fn infer_cells(cells: Vec<String>) -> Vec<Value> {
    let typed = |parse: &dyn Fn(&str) -> Option<Value>| -> Option<Vec<Value>> {
        cells
            .iter()
            .map(|c| {
                if is_missing(c) {
                    Some(Value::Null)
                } else {
                    parse(c.trim())
                }
            })
            .collect()
    };

    let number = |c: &str| match c.parse::<f64>() {
        Ok(n) if n.is_nan() => Some(Value::Null),
        Ok(n) => Some(Value::Number(n)),
        Err(_) => None,
    };
    if let Some(values) = typed(&number) {
        return values;
    }
    if let Some(values) = typed(&|c: &str| parse_bool(c).map(Value::Bool)) {
        return values;
    }
    if let Some(values) = typed(&|c: &str| parse_timestamp(c).map(Value::Timestamp)) {
        return values;
    }
    cells
        .into_iter()
        .map(|c| if is_missing(&c) { Value::Null } else { Value::Text(c) })
        .collect()
}

fn sheet_cell(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) if f.is_nan() => Value::Null,
        Data::Float(f) => Value::Number(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if is_missing(s) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(_) => cell.as_datetime().map(Value::Timestamp).unwrap_or(Value::Null),
        Data::DateTimeIso(s) => parse_timestamp(s)
            .map(Value::Timestamp)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Promote an all-text column whose cells are ISO timestamps.
fn promote_timestamps(values: Vec<Value>) -> Vec<Value> {
    let all_timestamps = values.iter().any(|v| !v.is_null())
        && values.iter().all(|v| match v {
            Value::Null => true,
            Value::Text(s) => parse_timestamp(s).is_some(),
            _ => false,
        });
    if !all_timestamps {
        return values;
    }
    values
        .into_iter()
        .map(|v| match v {
            Value::Text(s) => parse_timestamp(&s).map(Value::Timestamp).unwrap_or(Value::Text(s)),
            other => other,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shorthand for building test datasets.
    pub(crate) fn dataset(columns: Vec<(&str, Vec<Value>)>) -> Dataset {
        Dataset::new(
            columns
                .into_iter()
                .map(|(name, values)| Column::new(name, values))
                .collect(),
        )
        .unwrap()
    }

    pub(crate) fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|&v| Value::Number(v)).collect()
    }

    pub(crate) fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::Text(v.to_string())).collect()
    }

    #[test]
    fn test_from_csv_infers_column_types() {
        let csv = "date,cat,val,flag,note\n\
                   2024-01-01,a,10,true,x\n\
                   2024-01-02,b,,false,1\n";
        let ds = Dataset::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.column("date").unwrap().kind(), ColumnType::Timestamp);
        assert_eq!(ds.column("cat").unwrap().kind(), ColumnType::Text);
        assert_eq!(ds.column("val").unwrap().kind(), ColumnType::Numeric);
        assert_eq!(ds.column("val").unwrap().values()[1], Value::Null);
        assert_eq!(ds.column("flag").unwrap().kind(), ColumnType::Boolean);
        // "x" and "1" disagree, so the whole column stays text
        assert_eq!(ds.column("note").unwrap().values()[1], Value::Text("1".into()));
    }

    #[test]
    fn test_from_json_preserves_key_order() {
        let value = serde_json::json!([
            {"zeta": 1, "alpha": "a", "when": "2024-03-01"},
            {"zeta": 2, "alpha": null, "when": "2024-03-02T10:00:00"}
        ]);
        let ds = Dataset::from_json(&value).unwrap();
        assert_eq!(ds.column_names(), vec!["zeta", "alpha", "when"]);
        assert!(ds.column("zeta").unwrap().is_numeric());
        assert!(ds.column("when").unwrap().is_timestamp());
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        let result = Dataset::from_json(&serde_json::json!({"a": 1}));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JSON array"));
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = Dataset::new(vec![
            Column::new("a", nums(&[1.0, 2.0])),
            Column::new("b", nums(&[1.0])),
        ]);
        assert!(matches!(result, Err(DataError::RaggedColumns { .. })));
    }

    #[test]
    fn test_select_rows_preserves_order() {
        let ds = dataset(vec![
            ("cat", texts(&["a", "b", "c"])),
            ("val", nums(&[1.0, 2.0, 3.0])),
        ]);
        let out = ds.select_rows(&[true, false, true]).unwrap();
        assert_eq!(out.column_names(), vec!["cat", "val"]);
        assert_eq!(out.column("cat").unwrap().values(), texts(&["a", "c"]).as_slice());
    }

    #[test]
    fn test_select_rows_mask_length_mismatch() {
        let ds = dataset(vec![("val", nums(&[1.0, 2.0]))]);
        assert!(matches!(
            ds.select_rows(&[true]),
            Err(DataError::MaskLength { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_all_null_column_counts_as_numeric() {
        let col = Column::new("empty", vec![Value::Null, Value::Null]);
        assert!(col.is_numeric());
    }

    #[test]
    fn test_mixed_column_kind() {
        let col = Column::new("m", vec![Value::Number(1.0), Value::Text("x".into())]);
        assert_eq!(col.kind(), ColumnType::Mixed);
    }

    #[test]
    fn test_head_records() {
        let ds = dataset(vec![("val", nums(&[1.0, 2.0, 3.0]))]);
        let head = ds.head_records(2);
        assert_eq!(head.len(), 2);
        assert_eq!(head[1]["val"], serde_json::json!(2.0));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = Dataset::load("report.parquet").unwrap_err();
        assert!(err.to_string().contains("Unsupported file type: .parquet"));
    }

    #[test]
    fn test_from_csv_missing_tokens_are_null() {
        let csv = "v,w,label\n1,NA,x\nNaN,2,N/A\n2,null,\n";
        let ds = Dataset::from_csv(csv.as_bytes()).unwrap();
        let v = ds.column("v").unwrap();
        assert!(v.is_numeric());
        assert_eq!(v.values()[1], Value::Null);
        assert_eq!(v.numbers().unwrap(), vec![1.0, 2.0]);
        let w = ds.column("w").unwrap();
        assert!(w.is_numeric());
        assert_eq!(w.numbers().unwrap(), vec![2.0]);
        assert_eq!(ds.column("label").unwrap().values(), &[Value::Text("x".into()), Value::Null, Value::Null]);
    }

    #[test]
    fn test_numbers_skip_nan_cells() {
        let col = Column::new("v", vec![Value::Number(1.0), Value::Number(f64::NAN), Value::Null]);
        assert!(col.is_numeric());
        assert_eq!(col.numbers().unwrap(), vec![1.0]);
        assert_eq!(Value::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn test_load_spreadsheet_first_worksheet() {
        let ds = Dataset::load("test/sales.xlsx").unwrap();
        assert_eq!(ds.column_names(), vec!["date", "region", "product", "units", "revenue"]);
        assert_eq!(ds.n_rows(), 6);
        assert!(ds.column("date").unwrap().is_timestamp());
        assert_eq!(
            ds.column("date").unwrap().values()[0],
            Value::Timestamp(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(ds.column("region").unwrap().kind(), ColumnType::Text);
        assert_eq!(ds.column("units").unwrap().numbers().unwrap(), vec![10.0, 4.0, 7.0, 3.0, 12.0, 5.0]);
        // the empty revenue cell on the fourth row
        assert_eq!(ds.column("revenue").unwrap().values()[3], Value::Null);
    }

    #[test]
    fn test_sheet_cells() {
        assert_eq!(sheet_cell(&Data::Int(3)), Value::Number(3.0));
        assert_eq!(sheet_cell(&Data::String("n/a".into())), Value::Null);
        assert_eq!(sheet_cell(&Data::Empty), Value::Null);
        assert_eq!(sheet_cell(&Data::Bool(true)), Value::Bool(true));
        assert!(matches!(sheet_cell(&Data::DateTimeIso("2024-03-01".into())), Value::Timestamp(_)));
    }
}
