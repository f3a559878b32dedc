// Aggregations and statistics shared by both rendering backends

use crate::data::{Column, Dataset, Value};
use crate::spec::YColumns;
use anyhow::{anyhow, bail, Result};

/// Look up a column, failing with a message naming it.
pub fn require_column<'a>(data: &'a Dataset, name: &str) -> Result<&'a Column> {
    data.column(name)
        .ok_or_else(|| anyhow!("Column '{}' not found", name))
}

/// One labelled value of an aggregate (a pie slice, a bar per column).
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

impl Slice {
    fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Share of the total per slice, in percent.
pub fn percentages(slices: &[Slice]) -> Vec<f64> {
    let total: f64 = slices.iter().map(|s| s.value).sum();
    slices
        .iter()
        .map(|s| if total == 0.0 { 0.0 } else { s.value / total * 100.0 })
        .collect()
}

/// Sum of `y` per distinct `x`, groups in sorted key order. Rows with a
/// null key are dropped; null values do not contribute to the sum.
pub fn group_sum(data: &Dataset, x: &str, y: &str) -> Result<Vec<Slice>> {
    let keys = require_column(data, x)?;
    let values = require_column(data, y)?;
    if !values.is_numeric() {
        bail!("Cannot sum non-numeric column '{}'", y);
    }

    let mut groups: Vec<(&Value, f64)> = Vec::new();
    for (key, value) in keys.values().iter().zip(values.values()) {
        if key.is_null() {
            continue;
        }
        let amount = value.as_f64().unwrap_or(0.0);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, total)) => *total += amount,
            None => groups.push((key, amount)),
        }
    }
    groups.sort_by(|a, b| a.0.sort_cmp(b.0));

    Ok(groups
        .into_iter()
        .map(|(key, total)| Slice::new(key.to_string(), total))
        .collect())
}

/// Frequency of each distinct non-null value, most frequent first
/// (ties keep first-appearance order).
pub fn value_counts(data: &Dataset, x: &str) -> Result<Vec<Slice>> {
    let column = require_column(data, x)?;
    let mut counts: Vec<(&Value, f64)> = Vec::new();
    for value in column.values().iter().filter(|v| !v.is_null()) {
        match counts.iter_mut().find(|(k, _)| *k == value) {
            Some((_, n)) => *n += 1.0,
            None => counts.push((value, 1.0)),
        }
    }
    counts.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(counts
        .into_iter()
        .map(|(key, n)| Slice::new(key.to_string(), n))
        .collect())
}

/// Column sums for every numeric column, in column order.
pub fn numeric_totals(data: &Dataset) -> Vec<Slice> {
    data.numeric_columns()
        .map(|c| Slice::new(c.name(), c.values().iter().filter_map(Value::as_f64).sum()))
        .collect()
}

/// Pie slices: sum of y grouped by x, frequency of x, or numeric column
/// totals, depending on which axes are given.
pub fn pie_slices(data: &Dataset, x: Option<&str>, y: Option<&YColumns>) -> Result<Vec<Slice>> {
    match (x, y) {
        (Some(x), Some(YColumns::Single(y))) => group_sum(data, x, y),
        (Some(_), Some(YColumns::Many(_))) => bail!("pie accepts a single y column"),
        (Some(x), None) => value_counts(data, x),
        (None, _) => Ok(numeric_totals(data)),
    }
}

/// Columns a distribution chart (hist, box) draws: the given y columns,
/// or every numeric column.
pub fn distribution_targets<'a>(data: &'a Dataset, y: Option<&'a YColumns>) -> Vec<&'a str> {
    match y {
        Some(y) => y.names(),
        None => data.numeric_columns().map(Column::name).collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Equal-width bins over the value range. The last bin includes its upper
/// edge; a zero-width range is widened to one unit around the value.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let mut min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        min -= 0.5;
        max += 0.5;
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistBin> = (0..bins)
        .map(|i| HistBin {
            start: min + width * i as f64,
            end: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for &v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

/// Five-number summary with Tukey whiskers (1.5 × IQR).
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub lower_whisker: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;

        let inside: Vec<f64> = sorted
            .iter()
            .cloned()
            .filter(|v| *v >= low_fence && *v <= high_fence)
            .collect();
        let lower_whisker = inside.first().cloned().unwrap_or(q1);
        let upper_whisker = inside.last().cloned().unwrap_or(q3);
        let outliers = sorted
            .into_iter()
            .filter(|v| *v < low_fence || *v > high_fence)
            .collect();

        Some(Self {
            lower_whisker,
            q1,
            median,
            q3,
            upper_whisker,
            outliers,
        })
    }
}

/// Linear-interpolated quantile of sorted data.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::{dataset, nums, texts};

    fn sample() -> Dataset {
        dataset(vec![
            ("cat", texts(&["b", "a", "b", "c"])),
            ("val", nums(&[1.0, 2.0, 3.0, 4.0])),
            ("other", nums(&[10.0, 10.0, 10.0, 10.0])),
        ])
    }

    #[test]
    fn test_group_sum_sorted_keys() {
        let slices = group_sum(&sample(), "cat", "val").unwrap();
        assert_eq!(
            slices,
            vec![Slice::new("a", 2.0), Slice::new("b", 4.0), Slice::new("c", 4.0)]
        );
    }

    #[test]
    fn test_group_sum_rejects_text_values() {
        let err = group_sum(&sample(), "val", "cat").unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn test_group_sum_missing_column() {
        let err = group_sum(&sample(), "nope", "val").unwrap_err();
        assert!(err.to_string().contains("Column 'nope' not found"));
    }

    #[test]
    fn test_value_counts_most_frequent_first() {
        let slices = value_counts(&sample(), "cat").unwrap();
        assert_eq!(slices[0], Slice::new("b", 2.0));
        assert_eq!(slices.len(), 3);
    }

    #[test]
    fn test_numeric_totals() {
        let totals = numeric_totals(&sample());
        assert_eq!(totals, vec![Slice::new("val", 10.0), Slice::new("other", 40.0)]);
    }

    #[test]
    fn test_percentages() {
        let pct = percentages(&[Slice::new("a", 10.0), Slice::new("b", 5.0)]);
        assert!((pct[0] - 66.666).abs() < 0.01);
        assert!((pct[1] - 33.333).abs() < 0.01);
        assert_eq!(percentages(&[Slice::new("z", 0.0)]), vec![0.0]);
    }

    #[test]
    fn test_pie_slices_modes() {
        let ds = sample();
        let y = YColumns::Single("val".into());
        assert_eq!(pie_slices(&ds, Some("cat"), Some(&y)).unwrap().len(), 3);
        assert_eq!(pie_slices(&ds, Some("cat"), None).unwrap()[0].value, 2.0);
        assert_eq!(pie_slices(&ds, None, None).unwrap().len(), 2);
        let many = YColumns::Many(vec!["val".into(), "other".into()]);
        assert!(pie_slices(&ds, Some("cat"), Some(&many)).is_err());
    }

    #[test]
    fn test_distribution_targets() {
        let ds = sample();
        assert_eq!(distribution_targets(&ds, None), vec!["val", "other"]);
        let y = YColumns::Single("val".into());
        assert_eq!(distribution_targets(&ds, Some(&y)), vec!["val"]);
    }

    #[test]
    fn test_histogram_counts_every_value() {
        let bins = histogram(&[1.0, 2.0, 2.5, 4.0], 3);
        assert_eq!(bins.len(), 3);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 4);
        assert_eq!(bins[2].end, 4.0);
        assert_eq!(bins[2].count, 1);
    }

    #[test]
    fn test_histogram_constant_values() {
        let bins = histogram(&[5.0, 5.0], 2);
        assert_eq!(bins[0].start, 4.5);
        assert_eq!(bins[1].end, 5.5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn test_histogram_empty() {
        assert!(histogram(&[], 10).is_empty());
    }

    #[test]
    fn test_box_stats() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0, 100.0]).unwrap();
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.q1, 2.25);
        assert_eq!(stats.q3, 4.75);
        assert_eq!(stats.outliers, vec![100.0]);
        assert_eq!(stats.upper_whisker, 5.0);
        assert_eq!(stats.lower_whisker, 1.0);
        assert!(BoxStats::from_values(&[]).is_none());
    }
}
