use serde_json::json;
use std::process::Command;
use tabplot::document::build_chart;
use tabplot::raster::{plan_figure, Body};
use tabplot::{
    apply_filters, render, render_request, resolve_chart_type, ChartSpec, ChartType, Dataset,
    FilterCondition, OutputFormat, PlotRequest, RenderError, RenderOptions, RenderOutput,
};

/// Helper function to run the tabplot binary with arguments
fn run_tabplot(args: &[&str]) -> Result<Vec<u8>, String> {
    let output = Command::new(env!("CARGO_BIN_EXE_tabplot"))
        .args(args)
        .output()
        .map_err(|e| format!("Failed to spawn process: {}", e))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

fn is_valid_jpeg(bytes: &[u8]) -> bool {
    bytes.len() > 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF]
}

fn load(path: &str) -> Dataset {
    Dataset::load(path).expect("Failed to load fixture")
}

fn image_bytes(output: RenderOutput) -> Vec<u8> {
    match output {
        RenderOutput::Image { bytes, .. } => bytes,
        RenderOutput::Document(_) => panic!("expected an image"),
    }
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn test_end_to_end_filtered_pie() {
    let data = load("test/records.json");
    let req: PlotRequest = serde_json::from_value(json!({
        "chart_type": "pie",
        "x": "cat",
        "y": "val",
        "filters": [{"col": "val", "op": "ge", "value": 5}]
    }))
    .unwrap();

    let filtered = apply_filters(&data, req.conditions()).unwrap();
    assert_eq!(filtered.n_rows(), 2);

    let spec = ChartSpec::try_from(&req).unwrap();
    match &plan_figure(&filtered, &spec, &RenderOptions::default()).unwrap().body {
        Body::Pie { slices } => {
            let pct = tabplot::transform::percentages(slices);
            assert_eq!(slices[0].label, "a");
            assert_eq!(format!("{:.1}", pct[0]), "66.7");
            assert_eq!(slices[1].label, "b");
            assert_eq!(format!("{:.1}", pct[1]), "33.3");
        }
        other => panic!("expected a pie, got {:?}", other),
    }

    let output = render_request(&data, &req, &RenderOptions::default()).unwrap();
    assert_eq!(output.mime_type(), "image/png");
    assert!(is_valid_png(&image_bytes(output)));
}

#[test]
fn test_auto_line_for_date_column() {
    let data = load("test/sales.csv");
    let spec = ChartSpec::new(ChartType::Auto).x("date").y("units");
    assert_eq!(
        resolve_chart_type(&data, spec.x.as_deref(), spec.y.as_ref()),
        ChartType::Line
    );
    let output = render(&data, &[], &spec, &RenderOptions::default()).unwrap();
    assert!(is_valid_png(&image_bytes(output)));
}

#[test]
fn test_jpeg_output() {
    let data = load("test/measurements.csv");
    let spec = ChartSpec::new(ChartType::Scatter)
        .x("height")
        .y("weight")
        .format(OutputFormat::Jpeg)
        .figsize(4.0, 3.0);
    let output = render(&data, &[], &spec, &RenderOptions::default()).unwrap();
    assert_eq!(output.mime_type(), "image/jpeg");
    assert!(is_valid_jpeg(&image_bytes(output)));
}

#[test]
fn test_every_static_chart_type_renders() {
    let data = load("test/sales.csv");
    let specs = vec![
        ChartSpec::new(ChartType::Line).x("date").ys(&["units", "revenue"]),
        ChartSpec::new(ChartType::Bar).x("region").y("units").title("Units by region"),
        ChartSpec::new(ChartType::Bar),
        ChartSpec::new(ChartType::Pie).x("region"),
        ChartSpec::new(ChartType::Hist).bins(5),
        ChartSpec::new(ChartType::Box).labels("column", "value"),
    ];
    for spec in specs {
        let output = render(&data, &[], &spec, &RenderOptions::default())
            .unwrap_or_else(|e| panic!("{:?} failed: {}", spec.chart_type, e));
        assert!(is_valid_png(&image_bytes(output)));
    }
}

#[test]
fn test_hist_defaults_differ_between_backends() {
    let data = load("test/measurements.csv");
    let spec = ChartSpec::new(ChartType::Hist);
    let options = RenderOptions::default();

    // static: one histogram per numeric column
    let figure = plan_figure(&data, &spec, &options).unwrap();
    match &figure.body {
        Body::Cartesian { series, .. } => {
            let labels: Vec<&str> = series.iter().map(|s| s.label.as_str()).collect();
            assert_eq!(labels, vec!["height", "weight"]);
        }
        other => panic!("expected cartesian body, got {:?}", other),
    }

    // interactive: the first numeric column only
    let chart = build_chart(&data, &spec.format(OutputFormat::Document), &options).unwrap();
    assert_eq!(chart["encoding"]["x"]["field"], "height");
    assert!(chart["encoding"].get("color").is_none());
    assert!(chart["transform"].as_array().unwrap().is_empty());
}

#[test]
fn test_pie_defaults_differ_between_backends() {
    let data = load("test/measurements.csv");
    let spec = ChartSpec::new(ChartType::Pie);
    let options = RenderOptions::default();

    match &plan_figure(&data, &spec, &options).unwrap().body {
        Body::Pie { slices } => assert_eq!(slices[0].label, "height"),
        other => panic!("expected a pie, got {:?}", other),
    }

    let chart = build_chart(&data, &spec.format(OutputFormat::Document), &options).unwrap();
    assert_eq!(chart["data"]["values"][0]["metric"], "height");
    assert!(chart["data"]["values"][0]["value"].is_number());
}

#[test]
fn test_contains_filter_is_case_insensitive() {
    let data = load("test/sales.csv");
    let conditions = vec![FilterCondition::new("product", "contains", json!("APP"))];
    let filtered = apply_filters(&data, &conditions).unwrap();
    assert_eq!(filtered.n_rows(), 3);
    assert_eq!(filtered.column("units").unwrap().values()[1].as_f64(), Some(3.0));
}

#[test]
fn test_spreadsheet_and_csv_load_alike() {
    let csv = load("test/sales.csv");
    let xlsx = load("test/sales.xlsx");
    assert_eq!(xlsx.column_names(), csv.column_names());
    assert_eq!(xlsx.column("units"), csv.column("units"));
    assert_eq!(xlsx.column("revenue"), csv.column("revenue"));
    assert_eq!(xlsx.column("date"), csv.column("date"));

    let spec = ChartSpec::new(ChartType::Auto).x("date").y("revenue");
    let output = render(&xlsx, &[], &spec, &RenderOptions::default()).unwrap();
    assert!(is_valid_png(&image_bytes(output)));
}

#[test]
fn test_unbounded_figure_requests_fail_cleanly() {
    let data = load("test/measurements.csv");
    let options = RenderOptions::default();
    let spec = ChartSpec::new(ChartType::Hist).figsize(1e9, 1e9);
    assert!(matches!(
        render(&data, &[], &spec, &options),
        Err(RenderError::RenderFailure(_))
    ));
    let spec = ChartSpec::new(ChartType::Hist).bins(usize::MAX);
    assert!(matches!(
        render(&data, &[], &spec, &options),
        Err(RenderError::RenderFailure(_))
    ));
}

#[test]
fn test_invalid_conditions_do_not_filter() {
    let data = load("test/sales.csv");
    let conditions = vec![
        FilterCondition::new("nope", "eq", json!(1)),
        FilterCondition::new("units", "like", json!(1)),
        FilterCondition::new("region", "gt", json!(3)),
    ];
    let filtered = apply_filters(&data, &conditions).unwrap();
    assert_eq!(*filtered, data);
}

#[test]
fn test_scatter_without_y_fails_in_both_backends() {
    let data = load("test/measurements.csv");
    for format in [OutputFormat::Png, OutputFormat::Document] {
        let spec = ChartSpec::new(ChartType::Scatter).x("height").format(format);
        let err = render(&data, &[], &spec, &RenderOptions::default()).unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingAxis {
                chart: "scatter".to_string(),
                axis: "y".to_string()
            }
        );
    }
}

#[test]
fn test_document_is_self_contained_html() {
    let data = load("test/sales.csv");
    let spec = ChartSpec::new(ChartType::Line)
        .x("date")
        .y("units")
        .format(OutputFormat::Document);
    match render(&data, &[], &spec, &RenderOptions::default()).unwrap() {
        RenderOutput::Document(html) => {
            assert!(html.contains("<!DOCTYPE html>"));
            assert!(html.contains("vega-lite@6.4.1"));
            assert!(html.contains(r#""type":"temporal""#));
        }
        other => panic!("expected a document, got {:?}", other),
    }
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn test_cli_png_to_stdout() {
    let result = run_tabplot(&["test/sales.csv", "--chart", "bar", "-x", "region", "-y", "units"]);
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()));
}

#[test]
fn test_cli_filter_and_html_to_file() {
    let out = std::env::temp_dir().join(format!("tabplot-cli-{}.html", std::process::id()));
    let out_str = out.to_str().unwrap();
    let result = run_tabplot(&[
        "test/sales.csv",
        "--chart",
        "line",
        "-x",
        "date",
        "-y",
        "units",
        "-y",
        "revenue",
        "--filter",
        "region == north",
        "--format",
        "html",
        "-o",
        out_str,
    ]);
    assert!(result.is_ok(), "Failed: {:?}", result.err());

    let html = std::fs::read_to_string(&out).unwrap();
    std::fs::remove_file(&out).ok();
    assert!(html.contains(r#""fold":["units","revenue"]"#));
    assert!(html.contains(r#""region":"north""#));
    assert!(!html.contains(r#""region":"south""#));
}

#[test]
fn test_cli_request_json() {
    let request = r#"{"chart_type": "hist", "y": ["height", "weight"], "bins": 4, "format": "jpg"}"#;
    let result = run_tabplot(&["test/measurements.csv", "--request", request]);
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_jpeg(&result.unwrap()));
}

#[test]
fn test_cli_preview() {
    let result = run_tabplot(&["test/labels.csv", "--preview", "2"]).unwrap();
    let preview: serde_json::Value = serde_json::from_slice(&result).unwrap();
    assert_eq!(preview["columns"], json!(["name", "kind"]));
    assert_eq!(preview["rows"].as_array().unwrap().len(), 2);
    assert_eq!(preview["rows"][1]["name"], "beta");
}

#[test]
fn test_cli_unsupported_chart_type() {
    let result = run_tabplot(&["test/labels.csv", "--chart", "unsupported_value"]);
    let err = result.unwrap_err();
    assert!(err.contains("Unsupported chart_type: unsupported_value"), "stderr: {}", err);
}

#[test]
fn test_cli_unsupported_format() {
    let result = run_tabplot(&["test/labels.csv", "--chart", "bar", "--format", "svg"]);
    assert!(result.unwrap_err().contains("Unsupported format: svg"));
}

#[test]
fn test_cli_spreadsheet_input() {
    let result = run_tabplot(&["test/sales.xlsx", "--preview", "3"]).unwrap();
    let preview: serde_json::Value = serde_json::from_slice(&result).unwrap();
    assert_eq!(
        preview["columns"],
        json!(["date", "region", "product", "units", "revenue"])
    );
    assert_eq!(preview["rows"][2]["product"], "Cherry");

    let result = run_tabplot(&[
        "test/sales.xlsx",
        "--chart",
        "bar",
        "-x",
        "region",
        "-y",
        "units",
        "--filter",
        "units >= 5",
    ]);
    assert!(result.is_ok(), "Failed: {:?}", result.err());
    assert!(is_valid_png(&result.unwrap()));
}

#[test]
fn test_cli_rejects_unknown_file_type() {
    let result = run_tabplot(&["test/sales.parquet"]);
    assert!(result.unwrap_err().contains("Unsupported file type: .parquet"));
}

#[test]
fn test_cli_bad_filter_expression() {
    let result = run_tabplot(&["test/sales.csv", "--filter", ">= 3"]);
    assert!(result.unwrap_err().contains("Invalid filter expression"));
}
