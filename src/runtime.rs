// Render dispatcher: filter -> resolve -> backend

use crate::data::Dataset;
use crate::document;
use crate::error::{RenderError, Result};
use crate::filter::{apply_filters, FilterCondition};
use crate::raster;
use crate::resolve::resolve_chart_type;
use crate::spec::{ChartSpec, ChartType, PlotRequest};
use crate::{OutputFormat, RasterFormat, RenderOptions};
use std::borrow::Cow;

/// Output of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Image { bytes: Vec<u8>, format: RasterFormat },
    Document(String),
}

impl RenderOutput {
    pub fn mime_type(&self) -> &'static str {
        match self {
            RenderOutput::Image { format, .. } => format.mime_type(),
            RenderOutput::Document(_) => "text/html; charset=utf-8",
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RenderOutput::Image { bytes, .. } => bytes,
            RenderOutput::Document(html) => html.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RenderOutput::Image { bytes, .. } => bytes,
            RenderOutput::Document(html) => html.into_bytes(),
        }
    }
}

/// Filter `dataset`, resolve an automatic chart type and hand the result to
/// the backend matching the requested output format.
pub fn render(
    dataset: &Dataset,
    conditions: &[FilterCondition],
    spec: &ChartSpec,
    options: &RenderOptions,
) -> Result<RenderOutput> {
    let data = match apply_filters(dataset, conditions) {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Filtering failed, rendering unfiltered data: {}", e);
            Cow::Borrowed(dataset)
        }
    };

    let mut spec = Cow::Borrowed(spec);
    if spec.chart_type == ChartType::Auto {
        let resolved = resolve_chart_type(&data, spec.x.as_deref(), spec.y.as_ref());
        log::debug!("Resolved auto chart type to {}", resolved);
        spec.to_mut().chart_type = resolved;
    }

    log::debug!(
        "Rendering {} chart as {} from {} rows",
        spec.chart_type,
        spec.output_format,
        data.n_rows()
    );

    match spec.output_format {
        OutputFormat::Png | OutputFormat::Jpeg => {
            let bytes = raster::render_static(&data, &spec, options)?;
            let format = spec
                .output_format
                .raster()
                .ok_or_else(|| RenderError::UnsupportedFormat(spec.output_format.to_string()))?;
            Ok(RenderOutput::Image { bytes, format })
        }
        OutputFormat::Document => {
            let html = document::render_document(&data, &spec, options)?;
            Ok(RenderOutput::Document(html))
        }
    }
}

/// Render a request as collaborators send it. Chart type and format strings
/// are validated here, so unknown values surface as `UnsupportedChartType` or
/// `UnsupportedFormat`.
pub fn render_request(
    dataset: &Dataset,
    request: &PlotRequest,
    options: &RenderOptions,
) -> Result<RenderOutput> {
    let spec = ChartSpec::try_from(request)?;
    render(dataset, request.conditions(), &spec, options)
}
