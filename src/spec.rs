// Chart specification: what to draw and how to encode it

use crate::error::RenderError;
use crate::filter::FilterCondition;
use crate::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Hist,
    Scatter,
    Box,
    /// Resolved to a concrete type from the data before rendering
    Auto,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Hist => "hist",
            ChartType::Scatter => "scatter",
            ChartType::Box => "box",
            ChartType::Auto => "auto",
        }
    }
}

impl FromStr for ChartType {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(ChartType::Line),
            "bar" => Ok(ChartType::Bar),
            "pie" => Ok(ChartType::Pie),
            "hist" => Ok(ChartType::Hist),
            "scatter" => Ok(ChartType::Scatter),
            "box" => Ok(ChartType::Box),
            "auto" => Ok(ChartType::Auto),
            other => Err(RenderError::UnsupportedChartType(other.to_string())),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The y reference: one column, or an ordered list for multi-series charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YColumns {
    Single(String),
    Many(Vec<String>),
}

impl YColumns {
    pub fn names(&self) -> Vec<&str> {
        match self {
            YColumns::Single(name) => vec![name.as_str()],
            YColumns::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, YColumns::Many(_))
    }

    /// Empty names and empty lists mean "no y".
    fn non_empty(self) -> Option<Self> {
        match &self {
            YColumns::Single(name) if name.is_empty() => None,
            YColumns::Many(names) if names.is_empty() => None,
            _ => Some(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub x: Option<String>,
    pub y: Option<YColumns>,
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub legend: bool,
    /// Figure size in inches
    pub figsize: Option<(f64, f64)>,
    pub bins: Option<usize>,
    /// Single colour override for single-series charts
    pub color: Option<String>,
    pub output_format: OutputFormat,
}

impl ChartSpec {
    pub fn new(chart_type: ChartType) -> Self {
        Self {
            chart_type,
            x: None,
            y: None,
            title: None,
            xlabel: None,
            ylabel: None,
            legend: true,
            figsize: None,
            bins: None,
            color: None,
            output_format: OutputFormat::Png,
        }
    }

    pub fn x(mut self, column: impl Into<String>) -> Self {
        self.x = Some(column.into());
        self
    }

    pub fn y(mut self, column: impl Into<String>) -> Self {
        self.y = Some(YColumns::Single(column.into()));
        self
    }

    pub fn ys(mut self, columns: &[&str]) -> Self {
        self.y = Some(YColumns::Many(columns.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn labels(mut self, xlabel: impl Into<String>, ylabel: impl Into<String>) -> Self {
        self.xlabel = Some(xlabel.into());
        self.ylabel = Some(ylabel.into());
        self
    }

    pub fn legend(mut self, legend: bool) -> Self {
        self.legend = legend;
        self
    }

    pub fn figsize(mut self, width: f64, height: f64) -> Self {
        self.figsize = Some((width, height));
        self
    }

    pub fn bins(mut self, bins: usize) -> Self {
        self.bins = Some(bins);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn y_names(&self) -> Vec<&str> {
        self.y.as_ref().map(YColumns::names).unwrap_or_default()
    }

    /// Fail early on chart types and axis combinations neither backend can draw.
    pub fn ensure_drawable(&self) -> Result<(), RenderError> {
        match self.chart_type {
            ChartType::Auto => Err(RenderError::UnsupportedChartType(self.chart_type.to_string())),
            ChartType::Scatter => {
                let missing = match (&self.x, &self.y) {
                    (None, _) => Some("x"),
                    (_, None) => Some("y"),
                    _ => None,
                };
                match missing {
                    Some(axis) => Err(RenderError::MissingAxis {
                        chart: self.chart_type.to_string(),
                        axis: axis.to_string(),
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

/// A render request as collaborators send it: chart type and format are
/// still plain strings and are validated when converted to a `ChartSpec`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlotRequest {
    pub chart_type: String,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<YColumns>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub xlabel: Option<String>,
    #[serde(default)]
    pub ylabel: Option<String>,
    #[serde(default = "default_legend")]
    pub legend: Option<bool>,
    #[serde(default)]
    pub figsize: Option<Vec<f64>>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub bins: Option<usize>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub filters: Option<Vec<FilterCondition>>,
}

fn default_legend() -> Option<bool> {
    Some(true)
}

fn default_format() -> String {
    "png".to_string()
}

impl PlotRequest {
    pub fn conditions(&self) -> &[FilterCondition] {
        self.filters.as_deref().unwrap_or(&[])
    }
}

impl TryFrom<&PlotRequest> for ChartSpec {
    type Error = RenderError;

    fn try_from(req: &PlotRequest) -> Result<Self, Self::Error> {
        let chart_type = req.chart_type.parse::<ChartType>()?;
        let output_format = req.format.parse::<OutputFormat>()?;
        let figsize = match req.figsize.as_deref() {
            Some([w, h]) => Some((*w, *h)),
            _ => None,
        };
        Ok(ChartSpec {
            chart_type,
            x: req.x.clone().filter(|x| !x.is_empty()),
            y: req.y.clone().and_then(YColumns::non_empty),
            title: req.title.clone(),
            xlabel: req.xlabel.clone(),
            ylabel: req.ylabel.clone(),
            // an explicit null disables the legend
            legend: req.legend.unwrap_or(false),
            figsize,
            bins: req.bins.filter(|b| *b > 0),
            color: req.color.clone(),
            output_format,
        })
    }
}
