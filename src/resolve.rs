// Chart-type resolution for "auto" requests

use crate::data::Dataset;
use crate::spec::{ChartType, YColumns};

/// Pick a concrete chart type from the axis references and column types.
///
/// The rules form a priority chain and the first match wins, so the order
/// below matters (a non-numeric x without y is a bar chart before the
/// histogram rule is ever considered):
///
/// 1. x and y, x is a timestamp column or its name contains "date" → line
/// 2. x and y, y is a list or a numeric column → line for timestamp x, else scatter
/// 3. x names an existing non-numeric column → bar
/// 4. at least one numeric column → hist
/// 5. otherwise → bar
pub fn resolve_chart_type(dataset: &Dataset, x: Option<&str>, y: Option<&YColumns>) -> ChartType {
    let x_col = x.and_then(|name| dataset.column(name));
    let x_is_timestamp = x_col.map(|c| c.is_timestamp()).unwrap_or(false);

    if let (Some(x), Some(y)) = (x, y) {
        if x_is_timestamp || x.to_lowercase().contains("date") {
            return ChartType::Line;
        }
        let y_numeric = match y {
            YColumns::Many(_) => true,
            YColumns::Single(name) => dataset.column(name).map(|c| c.is_numeric()).unwrap_or(false),
        };
        if y_numeric {
            return if x_is_timestamp { ChartType::Line } else { ChartType::Scatter };
        }
    }

    if let Some(col) = x_col {
        if !col.is_numeric() {
            return ChartType::Bar;
        }
    }

    if dataset.numeric_columns().next().is_some() {
        return ChartType::Hist;
    }

    ChartType::Bar
}
