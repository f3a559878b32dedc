// Predicate evaluator: column conditions -> row mask -> filtered dataset

use crate::data::{parse_timestamp, Column, Dataset, Value};
use crate::error::DataError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single `column OP value` predicate. Conditions are combined with AND.
///
/// `op` is kept as the caller sent it: an unrecognised operator is not a
/// request error, the condition is simply skipped during filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(rename = "col", alias = "column")]
    pub column: String,
    pub op: String,
    #[serde(default)]
    pub value: JsonValue,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, op: impl Into<String>, value: JsonValue) -> Self {
        Self {
            column: column.into(),
            op: op.into(),
            value,
        }
    }
}

/// The closed operator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    In,
}

impl FromStr for FilterOp {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "gt" => Ok(FilterOp::Gt),
            "lt" => Ok(FilterOp::Lt),
            "ge" => Ok(FilterOp::Ge),
            "le" => Ok(FilterOp::Le),
            "contains" => Ok(FilterOp::Contains),
            "in" => Ok(FilterOp::In),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Gt => "gt",
            FilterOp::Lt => "lt",
            FilterOp::Ge => "ge",
            FilterOp::Le => "le",
            FilterOp::Contains => "contains",
            FilterOp::In => "in",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown filter operator '{0}'")]
pub struct UnknownOperator(pub String);

/// Why a single condition could not be evaluated. Never leaves this module.
#[derive(Debug, Clone, PartialEq, Error)]
enum FilterError {
    #[error("cannot compare {cell} with {target}")]
    TypeMismatch { cell: String, target: String },

    #[error("malformed value for '{op}': {value}")]
    MalformedValue { op: FilterOp, value: String },
}

/// Apply `conditions` conjunctively.
///
/// With no conditions the input is returned as-is. Conditions naming an
/// unknown column or operator, or whose comparison fails on a type mismatch,
/// are skipped: they neither exclude rows nor abort the pass.
pub fn apply_filters<'a>(
    dataset: &'a Dataset,
    conditions: &[FilterCondition],
) -> Result<Cow<'a, Dataset>, DataError> {
    if conditions.is_empty() {
        return Ok(Cow::Borrowed(dataset));
    }

    let mut mask = vec![true; dataset.n_rows()];
    for cond in conditions {
        let Some(column) = dataset.column(&cond.column) else {
            log::warn!("Skipping filter on unknown column '{}'", cond.column);
            continue;
        };
        let op = match cond.op.parse::<FilterOp>() {
            Ok(op) => op,
            Err(e) => {
                log::warn!("Skipping filter on '{}': {}", cond.column, e);
                continue;
            }
        };
        match evaluate(op, column, &cond.value) {
            Ok(hits) => {
                for (keep, hit) in mask.iter_mut().zip(hits) {
                    *keep &= hit;
                }
            }
            Err(e) => {
                log::warn!("Skipping filter '{} {} {}': {}", cond.column, op, cond.value, e);
            }
        }
    }

    let filtered = dataset.select_rows(&mask)?;
    log::debug!(
        "Filtered {} rows down to {}",
        dataset.n_rows(),
        filtered.n_rows()
    );
    Ok(Cow::Owned(filtered))
}

/// Evaluate one operator over a column, producing one boolean per row.
fn evaluate(op: FilterOp, column: &Column, value: &JsonValue) -> Result<Vec<bool>, FilterError> {
    match op {
        FilterOp::Eq => equality(column, value, op),
        FilterOp::Ne => equality(column, value, op).map(|v| v.into_iter().map(|eq| !eq).collect()),
        FilterOp::Gt => ordering(column, value, op, |o| o == Ordering::Greater),
        FilterOp::Lt => ordering(column, value, op, |o| o == Ordering::Less),
        FilterOp::Ge => ordering(column, value, op, |o| o != Ordering::Less),
        FilterOp::Le => ordering(column, value, op, |o| o != Ordering::Greater),
        FilterOp::Contains => Ok(contains(column, value)),
        FilterOp::In => membership(column, value, op),
    }
}

fn scalar(value: &JsonValue, op: FilterOp) -> Result<Value, FilterError> {
    Value::from_json(value).ok_or_else(|| FilterError::MalformedValue {
        op,
        value: value.to_string(),
    })
}

/// Element-wise equality. Cells of an incomparable kind are simply unequal;
/// null never equals anything.
fn equality(column: &Column, value: &JsonValue, op: FilterOp) -> Result<Vec<bool>, FilterError> {
    let target = scalar(value, op)?;
    Ok(column
        .values()
        .iter()
        .map(|cell| matches!(compare(cell, &target), Ok(Some(Ordering::Equal))))
        .collect())
}

/// Element-wise ordering. A null cell never matches; any non-null cell that
/// cannot be ordered against the target fails the whole condition.
fn ordering(
    column: &Column,
    value: &JsonValue,
    op: FilterOp,
    accept: impl Fn(Ordering) -> bool,
) -> Result<Vec<bool>, FilterError> {
    let target = scalar(value, op)?;
    if target.is_null() {
        return Err(FilterError::TypeMismatch {
            cell: format!("{:?}", column.kind()),
            target: "null".to_string(),
        });
    }
    column
        .values()
        .iter()
        .map(|cell| compare(cell, &target).map(|o| o.map(&accept).unwrap_or(false)))
        .collect()
}

/// Case-insensitive substring match on the text form of each cell.
///
/// Numbers use their shortest text form, so an integral `10.0` reads as
/// `10` and never matches `".0"`.
fn contains(column: &Column, value: &JsonValue) -> Vec<bool> {
    let needle = match value {
        JsonValue::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };
    column
        .values()
        .iter()
        .map(|cell| !cell.is_null() && cell.to_string().to_lowercase().contains(&needle))
        .collect()
}

/// Membership against a list, or against a single scalar treated as a
/// one-element list. A null entry matches null cells.
fn membership(column: &Column, value: &JsonValue, op: FilterOp) -> Result<Vec<bool>, FilterError> {
    let candidates: Vec<Value> = match value {
        JsonValue::Array(items) => items
            .iter()
            .map(|v| scalar(v, op))
            .collect::<Result<_, _>>()?,
        other => vec![scalar(other, op)?],
    };
    Ok(column
        .values()
        .iter()
        .map(|cell| {
            candidates.iter().any(|c| match (cell, c) {
                (Value::Null, Value::Null) => true,
                _ => matches!(compare(cell, c), Ok(Some(Ordering::Equal))),
            })
        })
        .collect())
}

/// Order a cell against a target. `Ok(None)` means the cell is null or the
/// pair is unordered (NaN); `Err` means the kinds cannot be compared.
fn compare(cell: &Value, target: &Value) -> Result<Option<Ordering>, FilterError> {
    let mismatch = || FilterError::TypeMismatch {
        cell: kind_name(cell).to_string(),
        target: kind_name(target).to_string(),
    };
    match (cell, target) {
        (Value::Null, _) | (_, Value::Null) => Ok(None),
        (Value::Number(a), Value::Number(b)) => Ok(a.partial_cmp(b)),
        (Value::Text(a), Value::Text(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Number(b)) => Ok(bool_number(*a).partial_cmp(b)),
        (Value::Number(a), Value::Bool(b)) => Ok(a.partial_cmp(&bool_number(*b))),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ok(Some(a.cmp(b))),
        (Value::Timestamp(a), Value::Text(s)) => parse_timestamp(s)
            .map(|b| Some(a.cmp(&b)))
            .ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

fn bool_number(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "number",
        Value::Text(_) => "text",
        Value::Bool(_) => "boolean",
        Value::Timestamp(_) => "timestamp",
        Value::Null => "null",
    }
}
