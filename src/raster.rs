// Static renderer: chart spec -> figure plan -> raster image

use crate::data::{Column, Dataset, Value};
use crate::error::RenderError;
use crate::graph::Canvas;
use crate::palette;
use crate::spec::{ChartSpec, ChartType, YColumns};
use crate::transform::{self, BoxStats, Slice};
use crate::RenderOptions;
use anyhow::{bail, Context, Result};
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use std::ops::Range;

const FONT: &str = "sans-serif";

// =============================================================================
// Figure plan
// =============================================================================

/// Everything needed to draw one chart, with the data already extracted.
#[derive(Debug, Clone)]
pub struct Figure {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub show_legend: bool,
    pub body: Body,
}

#[derive(Debug, Clone)]
pub enum Body {
    Cartesian { x_axis: XAxis, series: Vec<Series> },
    Pie { slices: Vec<Slice> },
}

/// How x positions map back to tick labels.
#[derive(Debug, Clone, PartialEq)]
pub enum XAxis {
    Numeric,
    /// Seconds since the epoch
    Timestamps,
    /// Position i is category i
    Categories(Vec<String>),
    /// Row number
    Index,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub color: RGBColor,
    pub mark: Mark,
}

#[derive(Debug, Clone)]
pub enum Mark {
    Line(Vec<(f64, f64)>),
    Points { points: Vec<(f64, f64)>, alpha: f64 },
    Bars { bars: Vec<Bar>, alpha: f64 },
    Box { center: f64, stats: BoxStats },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

const BAR_WIDTH: f64 = 0.8;
const BOX_WIDTH: f64 = 0.5;

/// Render `data` as a raster image. The chart type must already be concrete.
pub fn render_static(
    data: &Dataset,
    spec: &ChartSpec,
    options: &RenderOptions,
) -> std::result::Result<Vec<u8>, RenderError> {
    let format = spec
        .output_format
        .raster()
        .ok_or_else(|| RenderError::UnsupportedFormat(spec.output_format.to_string()))?;
    let figure = plan_figure(data, spec, options)?;

    let (width, height) = options.pixel_size(spec.figsize)?;
    let mut canvas = Canvas::new(width, height)?;
    canvas.draw(|root| draw_figure(root, &figure))?;
    Ok(canvas.encode(format, options.jpeg_quality)?)
}

/// Extract series for the requested chart type.
pub fn plan_figure(
    data: &Dataset,
    spec: &ChartSpec,
    options: &RenderOptions,
) -> std::result::Result<Figure, RenderError> {
    spec.ensure_drawable()?;

    let body = match spec.chart_type {
        ChartType::Line => plan_line(data, spec),
        ChartType::Bar => plan_bar(data, spec),
        ChartType::Pie => transform::pie_slices(data, spec.x.as_deref(), spec.y.as_ref())
            .map(|slices| Body::Pie { slices }),
        ChartType::Hist => plan_hist(data, spec, options.bin_count(spec.bins)?),
        ChartType::Scatter => plan_scatter(data, spec),
        ChartType::Box => plan_box(data, spec),
        ChartType::Auto => return Err(RenderError::UnsupportedChartType(spec.chart_type.to_string())),
    }?;

    let series_count = match &body {
        Body::Cartesian { series, .. } => series.len(),
        Body::Pie { .. } => 0,
    };
    // Boxes are labelled on the axis, never in a legend
    let boxed = spec.chart_type == ChartType::Box;

    Ok(Figure {
        title: spec.title.clone(),
        xlabel: spec.xlabel.clone(),
        ylabel: spec.ylabel.clone(),
        show_legend: spec.legend && series_count > 1 && !boxed,
        body,
    })
}

fn plan_line(data: &Dataset, spec: &ChartSpec) -> Result<Body> {
    let y_names = spec.y_names();
    if y_names.is_empty() {
        // every numeric column against the row number
        let columns: Vec<&Column> = data.numeric_columns().collect();
        let x: Vec<Option<f64>> = (0..data.n_rows()).map(|i| Some(i as f64)).collect();
        let series = columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                Ok(Series {
                    label: col.name().to_string(),
                    color: palette::pick(i, columns.len(), spec.color.as_deref()),
                    mark: Mark::Line(pair_up(&x, &y_positions(col)?)),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Body::Cartesian { x_axis: XAxis::Index, series });
    }

    let (x, x_axis) = x_positions(data, spec.x.as_deref())?;
    let series = y_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let col = transform::require_column(data, name)?;
            Ok(Series {
                label: name.to_string(),
                color: palette::pick(i, y_names.len(), spec.color.as_deref()),
                mark: Mark::Line(pair_up(&x, &y_positions(col)?)),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Body::Cartesian { x_axis, series })
}

fn plan_bar(data: &Dataset, spec: &ChartSpec) -> Result<Body> {
    let y_names = spec.y_names();
    if y_names.is_empty() {
        // one bar per numeric column: its total
        let totals = transform::numeric_totals(data);
        let labels: Vec<String> = totals.iter().map(|s| s.label.clone()).collect();
        let series = totals
            .iter()
            .enumerate()
            .map(|(i, total)| Series {
                label: total.label.clone(),
                color: palette::pick(i, totals.len(), spec.color.as_deref()),
                mark: Mark::Bars {
                    bars: vec![bar_at(i as f64, BAR_WIDTH, total.value)],
                    alpha: 1.0,
                },
            })
            .collect();
        return Ok(Body::Cartesian {
            x_axis: XAxis::Categories(labels),
            series,
        });
    }

    let (x, x_axis) = x_positions(data, spec.x.as_deref())?;
    let n = y_names.len();
    let slot = BAR_WIDTH / n as f64;
    let series = y_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let col = transform::require_column(data, name)?;
            // side by side around the x position
            let offset = (i as f64 - (n as f64 - 1.0) / 2.0) * slot;
            let bars = pair_up(&x, &y_positions(col)?)
                .into_iter()
                .map(|(x, y)| bar_at(x + offset, slot, y))
                .collect();
            Ok(Series {
                label: name.to_string(),
                color: palette::pick(i, n, spec.color.as_deref()),
                mark: Mark::Bars { bars, alpha: 1.0 },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Body::Cartesian { x_axis, series })
}

fn plan_hist(data: &Dataset, spec: &ChartSpec, bins: usize) -> Result<Body> {
    let targets = transform::distribution_targets(data, spec.y.as_ref());
    // a list of targets is overlaid, so it is drawn translucent
    let alpha = if matches!(spec.y, Some(YColumns::Single(_))) {
        1.0
    } else {
        0.5
    };

    let series = targets
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = transform::require_column(data, name)?.numbers()?;
            let bars = transform::histogram(&values, bins)
                .into_iter()
                .map(|b| Bar {
                    x0: b.start,
                    x1: b.end,
                    y0: 0.0,
                    y1: b.count as f64,
                })
                .collect();
            Ok(Series {
                label: name.to_string(),
                color: palette::pick(i, targets.len(), spec.color.as_deref()),
                mark: Mark::Bars { bars, alpha },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Body::Cartesian {
        x_axis: XAxis::Numeric,
        series,
    })
}

fn plan_scatter(data: &Dataset, spec: &ChartSpec) -> Result<Body> {
    let (x, x_axis) = x_positions(data, spec.x.as_deref())?;
    let y_names = spec.y_names();
    let series = y_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let col = transform::require_column(data, name)?;
            Ok(Series {
                label: name.to_string(),
                color: palette::pick(i, y_names.len(), spec.color.as_deref()),
                mark: Mark::Points {
                    points: pair_up(&x, &y_positions(col)?),
                    alpha: 0.7,
                },
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Body::Cartesian { x_axis, series })
}

fn plan_box(data: &Dataset, spec: &ChartSpec) -> Result<Body> {
    let targets = transform::distribution_targets(data, spec.y.as_ref());
    let mut series = Vec::new();
    for (i, name) in targets.iter().enumerate() {
        let values = transform::require_column(data, name)?.numbers()?;
        // an all-null column keeps its slot on the axis but draws nothing
        if let Some(stats) = BoxStats::from_values(&values) {
            series.push(Series {
                label: name.to_string(),
                color: palette::pick(i, targets.len(), spec.color.as_deref()),
                mark: Mark::Box {
                    center: i as f64,
                    stats,
                },
            });
        }
    }
    Ok(Body::Cartesian {
        x_axis: XAxis::Categories(targets.iter().map(|s| s.to_string()).collect()),
        series,
    })
}

/// X positions per row: row numbers without x, raw values for numeric x,
/// epoch seconds for timestamps, first-appearance category index otherwise.
fn x_positions(data: &Dataset, x: Option<&str>) -> Result<(Vec<Option<f64>>, XAxis)> {
    let Some(name) = x else {
        return Ok(((0..data.n_rows()).map(|i| Some(i as f64)).collect(), XAxis::Index));
    };
    let col = transform::require_column(data, name)?;

    if col.is_numeric() {
        return Ok((col.values().iter().map(Value::as_f64).collect(), XAxis::Numeric));
    }
    if col.is_timestamp() {
        let secs = col
            .values()
            .iter()
            .map(|v| match v {
                Value::Timestamp(ts) => Some(ts.and_utc().timestamp() as f64),
                _ => None,
            })
            .collect();
        return Ok((secs, XAxis::Timestamps));
    }

    let mut categories: Vec<String> = Vec::new();
    let positions = col
        .values()
        .iter()
        .map(|v| {
            if v.is_null() {
                return None;
            }
            let label = v.to_string();
            let idx = match categories.iter().position(|c| *c == label) {
                Some(idx) => idx,
                None => {
                    categories.push(label);
                    categories.len() - 1
                }
            };
            Some(idx as f64)
        })
        .collect();
    Ok((positions, XAxis::Categories(categories)))
}

fn y_positions(col: &Column) -> Result<Vec<Option<f64>>> {
    if !col.is_numeric() {
        bail!("Column '{}' is not numeric", col.name());
    }
    Ok(col.values().iter().map(Value::as_f64).collect())
}

/// Zip x and y, dropping rows where either is missing.
fn pair_up(x: &[Option<f64>], y: &[Option<f64>]) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect()
}

fn bar_at(center: f64, width: f64, height: f64) -> Bar {
    Bar {
        x0: center - width / 2.0,
        x1: center + width / 2.0,
        y0: 0.0,
        y1: height,
    }
}

// =============================================================================
// Drawing
// =============================================================================

type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_figure(root: &DrawingArea<BitMapBackend, Shift>, figure: &Figure) -> Result<()> {
    match &figure.body {
        Body::Pie { slices } => draw_pie(root, figure, slices),
        Body::Cartesian { x_axis, series } => draw_cartesian(root, figure, x_axis, series),
    }
}

fn draw_cartesian(
    root: &DrawingArea<BitMapBackend, Shift>,
    figure: &Figure,
    x_axis: &XAxis,
    series: &[Series],
) -> Result<()> {
    let (x_range, y_range) = data_ranges(x_axis, series);

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50);
    if let Some(title) = &figure.title {
        builder.caption(title, (FONT, 20));
    }
    let mut chart = builder
        .build_cartesian_2d(x_range, y_range)
        .context("Failed to build chart")?;

    let category_label = |x: &f64| -> String {
        match x_axis {
            XAxis::Categories(labels) => {
                let idx = x.round();
                if (x - idx).abs() > 1e-6 || idx < 0.0 {
                    return String::new();
                }
                labels.get(idx as usize).cloned().unwrap_or_default()
            }
            XAxis::Timestamps => chrono::DateTime::from_timestamp(*x as i64, 0)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            XAxis::Numeric | XAxis::Index => format!("{}", x),
        }
    };

    {
        let mut mesh = chart.configure_mesh();
        if let XAxis::Categories(labels) = x_axis {
            mesh.x_labels(labels.len().max(1)).disable_x_mesh();
        }
        if !matches!(x_axis, XAxis::Numeric | XAxis::Index) {
            mesh.x_label_formatter(&category_label);
        }
        if let Some(xlabel) = &figure.xlabel {
            mesh.x_desc(xlabel.as_str());
        }
        if let Some(ylabel) = &figure.ylabel {
            mesh.y_desc(ylabel.as_str());
        }
        mesh.draw().context("Failed to draw mesh")?;
    }

    for s in series {
        draw_series(&mut chart, s)?;
    }

    if figure.show_legend {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .context("Failed to draw legend")?;
    }
    Ok(())
}

fn draw_series(chart: &mut Chart, series: &Series) -> Result<()> {
    let color = series.color;
    let label = series.label.clone();
    match &series.mark {
        Mark::Line(points) => {
            chart
                .draw_series(LineSeries::new(points.iter().cloned(), color.stroke_width(2)))
                .context("Failed to draw line series")?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
        Mark::Points { points, alpha } => {
            let style = color.mix(*alpha).filled();
            chart
                .draw_series(points.iter().map(|&p| Circle::new(p, 4, style)))
                .context("Failed to draw point series")?
                .label(label)
                .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
        }
        Mark::Bars { bars, alpha } => {
            let style = color.mix(*alpha).filled();
            chart
                .draw_series(
                    bars.iter()
                        .map(|b| Rectangle::new([(b.x0, b.y0), (b.x1, b.y1)], style)),
                )
                .context("Failed to draw bars")?
                .label(label)
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }
        Mark::Box { center, stats } => draw_box(chart, *center, stats, color)?,
    }
    Ok(())
}

fn draw_box(chart: &mut Chart, x: f64, stats: &BoxStats, color: RGBColor) -> Result<()> {
    let half = BOX_WIDTH / 2.0;
    let cap = BOX_WIDTH * 0.2;

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(x - half, stats.q3), (x + half, stats.q1)],
            color.mix(0.3).filled(),
        )))
        .context("Failed to draw box")?;
    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(x - half, stats.q3), (x + half, stats.q1)],
            color.stroke_width(1),
        )))
        .context("Failed to draw box outline")?;

    let segments = [
        vec![(x - half, stats.median), (x + half, stats.median)],
        vec![(x, stats.q1), (x, stats.lower_whisker)],
        vec![(x, stats.q3), (x, stats.upper_whisker)],
        vec![(x - cap, stats.lower_whisker), (x + cap, stats.lower_whisker)],
        vec![(x - cap, stats.upper_whisker), (x + cap, stats.upper_whisker)],
    ];
    chart
        .draw_series(
            segments
                .into_iter()
                .map(|points| PathElement::new(points, color.stroke_width(2))),
        )
        .context("Failed to draw whiskers")?;

    chart
        .draw_series(
            stats
                .outliers
                .iter()
                .map(|&v| Circle::new((x, v), 3, color.stroke_width(1))),
        )
        .context("Failed to draw outliers")?;
    Ok(())
}

fn draw_pie(root: &DrawingArea<BitMapBackend, Shift>, figure: &Figure, slices: &[Slice]) -> Result<()> {
    if slices.iter().any(|s| s.value < 0.0) {
        bail!("Pie chart values must not be negative");
    }
    let total: f64 = slices.iter().map(|s| s.value).sum();
    if total <= 0.0 {
        bail!("Pie chart needs a positive total");
    }

    let area = match &figure.title {
        Some(title) => root
            .titled(title, (FONT, 20))
            .context("Failed to draw title")?,
        None => root.clone(),
    };
    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = f64::from(w.min(h)) * 0.35;

    let sizes: Vec<f64> = slices.iter().map(|s| s.value).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(palette::series_color).collect();
    let labels: Vec<String> = slices.iter().map(|s| s.label.clone()).collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(-90.0);
    pie.label_style((FONT, 14).into_font().color(&BLACK));
    pie.percentages((FONT, 12).into_font().color(&BLACK));
    area.draw(&pie).context("Failed to draw pie")?;
    Ok(())
}

/// Axis ranges covering every mark, padded by 5%. Category and row axes
/// centre each position in a unit-wide slot; bars always include zero.
fn data_ranges(x_axis: &XAxis, series: &[Series]) -> (Range<f64>, Range<f64>) {
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for s in series {
        match &s.mark {
            Mark::Line(points) | Mark::Points { points, .. } => {
                for &(x, y) in points {
                    xs.push(x);
                    ys.push(y);
                }
            }
            Mark::Bars { bars, .. } => {
                for b in bars {
                    xs.extend([b.x0, b.x1]);
                    ys.extend([b.y0, b.y1]);
                }
            }
            Mark::Box { center, stats } => {
                xs.push(*center);
                ys.extend([stats.lower_whisker, stats.upper_whisker]);
                ys.extend(stats.outliers.iter().cloned());
            }
        }
    }

    let x_range = match x_axis {
        XAxis::Categories(labels) => -0.5..(labels.len().max(1) as f64 - 0.5),
        _ => padded(&xs),
    };
    (x_range, padded(&ys))
}

fn padded(values: &[f64]) -> Range<f64> {
    let finite = values.iter().cloned().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min > max {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 1.0)..(max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}
