// Interactive renderer: Vega-Lite specification embedded in an HTML page

use crate::data::{Column, ColumnType, Dataset};
use crate::error::RenderError;
use crate::palette;
use crate::spec::{ChartSpec, ChartType, YColumns};
use crate::transform::{self, Slice};
use crate::RenderOptions;
use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value as JsonValue};

/// Vega-Lite schema URL
pub const VEGALITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v6.json";

/// Field holding the row number when no x column is given.
const INDEX_FIELD: &str = "index";
/// Fields produced when several columns are folded into one long table.
const SERIES_FIELD: &str = "series";
const VALUE_FIELD: &str = "value";

/// Render `data` as a self-contained HTML page.
pub fn render_document(
    data: &Dataset,
    spec: &ChartSpec,
    options: &RenderOptions,
) -> std::result::Result<String, RenderError> {
    let chart = build_chart(data, spec, options)?;
    let json = serde_json::to_string(&chart).context("Failed to serialize chart")?;
    Ok(html_page(&json, spec.title.as_deref(), &options.cdn_base))
}

/// Build the Vega-Lite specification for a concrete chart type.
pub fn build_chart(
    data: &Dataset,
    spec: &ChartSpec,
    options: &RenderOptions,
) -> std::result::Result<JsonValue, RenderError> {
    spec.ensure_drawable()?;

    let body = match spec.chart_type {
        ChartType::Line => series_chart(data, spec, "line"),
        ChartType::Bar => series_chart(data, spec, "bar"),
        ChartType::Scatter => series_chart(data, spec, "point"),
        ChartType::Pie => pie_chart(data, spec),
        ChartType::Hist => hist_chart(data, spec, options.bin_count(spec.bins)?),
        ChartType::Box => box_chart(data, spec),
        ChartType::Auto => return Err(RenderError::UnsupportedChartType(spec.chart_type.to_string())),
    }?;

    let (width, height) = options.pixel_size(spec.figsize)?;
    let mut chart = json!({
        "$schema": VEGALITE_SCHEMA,
        "width": width,
        "height": height,
    });
    if let Some(title) = &spec.title {
        chart["title"] = json!(title);
    }
    if let (Some(obj), JsonValue::Object(body)) = (chart.as_object_mut(), body) {
        obj.extend(body);
    }
    Ok(chart)
}

/// Line, bar and scatter: one encoding per y column, folded into a `series`
/// colour channel when there is more than one.
fn series_chart(data: &Dataset, spec: &ChartSpec, mark: &str) -> Result<JsonValue> {
    let mut transforms = Vec::new();
    let x = match spec.x.as_deref() {
        Some(name) => {
            let col = transform::require_column(data, name)?;
            channel(name, field_type(col))
        }
        None => {
            transforms.push(json!({"window": [{"op": "row_number", "as": INDEX_FIELD}]}));
            channel(INDEX_FIELD, "quantitative")
        }
    };

    // without y every numeric column becomes a series
    let targets: Vec<&str> = match &spec.y {
        Some(y) => y.names(),
        None => data.numeric_columns().map(Column::name).collect(),
    };
    for name in &targets {
        transform::require_column(data, name)?;
    }

    let mut encoding = Map::new();
    encoding.insert("x".into(), x);
    let mut mark = mark_def(mark, spec);
    match (targets.as_slice(), &spec.y) {
        ([single], Some(YColumns::Single(_))) => {
            encoding.insert("y".into(), channel(single, "quantitative"));
        }
        _ => {
            transforms.push(fold(&targets));
            encoding.insert("y".into(), channel(VALUE_FIELD, "quantitative"));
            encoding.insert("color".into(), series_color(spec));
            if targets.len() > 1 {
                if let Some(m) = mark.as_object_mut() {
                    m.remove("color");
                }
            }
        }
    }
    if mark["type"] == "bar" && targets.len() > 1 {
        encoding.insert("xOffset".into(), json!({"field": SERIES_FIELD}));
    }
    apply_axis_titles(&mut encoding, spec);

    Ok(json!({
        "data": {"values": data.records()},
        "transform": transforms,
        "mark": mark,
        "encoding": encoding,
    }))
}

/// Pie: aggregated slices as an arc mark. Without axes the numeric column
/// totals are laid out as `metric`/`value` rows.
fn pie_chart(data: &Dataset, spec: &ChartSpec) -> Result<JsonValue> {
    let slices = transform::pie_slices(data, spec.x.as_deref(), spec.y.as_ref())?;
    let (label_field, value_field) = match (spec.x.as_deref(), &spec.y) {
        (Some(x), Some(YColumns::Single(y))) => (x, y.as_str()),
        (Some(x), _) => (x, "count"),
        (None, _) => ("metric", "value"),
    };

    let values: Vec<JsonValue> = slices
        .iter()
        .map(|Slice { label, value }| {
            let mut row = Map::new();
            row.insert(label_field.to_string(), json!(label));
            row.insert(value_field.to_string(), json!(value));
            JsonValue::Object(row)
        })
        .collect();

    let mut encoding = Map::new();
    encoding.insert("theta".into(), channel(value_field, "quantitative"));
    let mut color = channel(label_field, "nominal");
    if !spec.legend {
        color["legend"] = JsonValue::Null;
    }
    encoding.insert("color".into(), color);
    encoding.insert(
        "tooltip".into(),
        json!([
            {"field": field_ref(label_field), "type": "nominal"},
            {"field": field_ref(value_field), "type": "quantitative"},
            {"field": "percent", "type": "quantitative", "format": ".1%"},
        ]),
    );

    Ok(json!({
        "data": {"values": values},
        "transform": [
            {"joinaggregate": [{"op": "sum", "field": field_ref(value_field), "as": "total"}]},
            {"calculate": format!("datum[{}] / datum.total", json!(value_field)), "as": "percent"},
        ],
        "mark": {"type": "arc", "tooltip": true},
        "encoding": encoding,
    }))
}

/// Histogram of y, or of the first numeric column only when y is absent.
fn hist_chart(data: &Dataset, spec: &ChartSpec, bins: usize) -> Result<JsonValue> {
    let targets: Vec<&str> = match &spec.y {
        Some(y) => y.names(),
        None => match data.numeric_columns().next() {
            Some(col) => vec![col.name()],
            None => bail!("hist needs at least one numeric column"),
        },
    };
    for name in &targets {
        transform::require_column(data, name)?;
    }

    let mut transforms = Vec::new();
    let mut encoding = Map::new();
    let mut mark = mark_def("bar", spec);
    let field = match targets.as_slice() {
        [single] => *single,
        _ => {
            transforms.push(fold(&targets));
            encoding.insert("color".into(), series_color(spec));
            mark["opacity"] = json!(0.5);
            if let Some(m) = mark.as_object_mut() {
                m.remove("color");
            }
            VALUE_FIELD
        }
    };
    let mut x = channel(field, "quantitative");
    x["bin"] = json!({"maxbins": bins});
    encoding.insert("x".into(), x);
    let mut y = json!({"aggregate": "count", "type": "quantitative"});
    if targets.len() > 1 {
        y["stack"] = JsonValue::Null;
    }
    encoding.insert("y".into(), y);
    apply_axis_titles(&mut encoding, spec);

    Ok(json!({
        "data": {"values": data.records()},
        "transform": transforms,
        "mark": mark,
        "encoding": encoding,
    }))
}

/// One box per target column (y, or every numeric column).
fn box_chart(data: &Dataset, spec: &ChartSpec) -> Result<JsonValue> {
    let targets = transform::distribution_targets(data, spec.y.as_ref());
    for name in &targets {
        let col = transform::require_column(data, name)?;
        if !col.is_numeric() {
            bail!("Column '{}' is not numeric", name);
        }
    }

    let mut mark = mark_def("boxplot", spec);
    mark["extent"] = json!(1.5);
    let mut encoding = Map::new();
    encoding.insert("x".into(), channel(SERIES_FIELD, "nominal"));
    encoding.insert("y".into(), channel(VALUE_FIELD, "quantitative"));
    apply_axis_titles(&mut encoding, spec);

    Ok(json!({
        "data": {"values": data.records()},
        "transform": [fold(&targets)],
        "mark": mark,
        "encoding": encoding,
    }))
}

fn channel(field: &str, kind: &str) -> JsonValue {
    json!({"field": field_ref(field), "type": kind, "title": field})
}

fn field_type(col: &Column) -> &'static str {
    match col.kind() {
        ColumnType::Numeric => "quantitative",
        ColumnType::Timestamp => "temporal",
        ColumnType::Text | ColumnType::Boolean | ColumnType::Mixed => "nominal",
    }
}

/// Escape characters Vega-Lite reads as nested field access.
fn field_ref(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '.' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn fold(columns: &[&str]) -> JsonValue {
    let fields: Vec<String> = columns.iter().map(|c| field_ref(c)).collect();
    json!({"fold": fields, "as": [SERIES_FIELD, VALUE_FIELD]})
}

fn series_color(spec: &ChartSpec) -> JsonValue {
    let mut color = json!({"field": SERIES_FIELD, "type": "nominal"});
    if !spec.legend {
        color["legend"] = JsonValue::Null;
    }
    color
}

fn mark_def(kind: &str, spec: &ChartSpec) -> JsonValue {
    let mut mark = json!({"type": kind, "tooltip": true});
    if let Some(color) = spec.color.as_deref().and_then(palette::parse_color) {
        mark["color"] = json!(palette::to_hex(color));
    }
    mark
}

fn apply_axis_titles(encoding: &mut Map<String, JsonValue>, spec: &ChartSpec) {
    for (axis, title) in [("x", &spec.xlabel), ("y", &spec.ylabel)] {
        if let (Some(title), Some(channel)) = (title, encoding.get_mut(axis)) {
            channel["title"] = json!(title);
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn html_page(spec_json: &str, title: Option<&str>, cdn_base: &str) -> String {
    let cdn = cdn_base.trim_end_matches('/');
    // keep the inline JSON from closing the script element
    let spec_json = spec_json.replace("</", "<\\/");
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{title}</title>
  <script src="{cdn}/vega@6"></script>
  <script src="{cdn}/vega-lite@6.4.1"></script>
  <script src="{cdn}/vega-embed@7"></script>
</head>
<body>
  <div id="vis"></div>
  <script type="text/javascript">
    const spec = {spec_json};
    vegaEmbed('#vis', spec, {{"actions": true}}).catch(console.error);
  </script>
</body>
</html>
"#,
        title = escape_html(title.unwrap_or("Chart")),
        cdn = cdn,
        spec_json = spec_json,
    )
}
