// Library exports for tabplot

pub mod data;
pub mod document;
pub mod error;
pub mod filter;
pub mod graph;
pub mod palette;
pub mod parser;
pub mod raster;
pub mod resolve;
pub mod runtime;
pub mod spec;
pub mod transform;

pub use data::{Column, ColumnType, Dataset, Value};
pub use error::{DataError, RenderError};
pub use filter::{apply_filters, FilterCondition, FilterOp};
pub use resolve::resolve_chart_type;
pub use runtime::{render, render_request, RenderOutput};
pub use spec::{ChartSpec, ChartType, PlotRequest, YColumns};

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Encoding of a static render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Requested output: a raster image or an interactive HTML document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Document,
}

impl OutputFormat {
    /// The raster encoding, or `None` for the document backend.
    pub fn raster(&self) -> Option<RasterFormat> {
        match self {
            OutputFormat::Png => Some(RasterFormat::Png),
            OutputFormat::Jpeg => Some(RasterFormat::Jpeg),
            OutputFormat::Document => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "html" | "document" => Ok(OutputFormat::Document),
            _ => Err(RenderError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Document => "html",
        })
    }
}

/// Defaults applied when a chart spec leaves sizing or binning open.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderOptions {
    /// Pixels per inch of figure size
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    /// Figure size in inches
    #[serde(default = "default_figsize")]
    pub figsize: (f64, f64),
    #[serde(default = "default_bins")]
    pub bins: usize,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Base URL the interactive document loads its charting runtime from
    #[serde(default = "default_cdn_base")]
    pub cdn_base: String,
}

fn default_dpi() -> f64 { 100.0 }
fn default_figsize() -> (f64, f64) { (8.0, 5.0) }
fn default_bins() -> usize { 30 }
fn default_jpeg_quality() -> u8 { 90 }
fn default_cdn_base() -> String { "https://cdn.jsdelivr.net/npm".to_string() }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            figsize: default_figsize(),
            bins: default_bins(),
            jpeg_quality: default_jpeg_quality(),
            cdn_base: default_cdn_base(),
        }
    }
}

/// Largest width or height, in pixels, a figure may request.
pub const MAX_PIXELS_PER_SIDE: u32 = 65_536;

/// Largest histogram bin count a figure may request.
pub const MAX_BINS: usize = 10_000;

impl RenderOptions {
    /// Pixel size for a figure, falling back to the default figure size.
    ///
    /// Sizes that are not finite, not positive, or larger than
    /// [`MAX_PIXELS_PER_SIDE`] on either side are rejected.
    pub fn pixel_size(&self, figsize: Option<(f64, f64)>) -> Result<(u32, u32), RenderError> {
        let (w, h) = figsize.unwrap_or(self.figsize);
        let px = |inches: f64| -> Result<u32, RenderError> {
            let pixels = (inches * self.dpi).round();
            if !pixels.is_finite() || inches <= 0.0 || pixels > MAX_PIXELS_PER_SIDE as f64 {
                return Err(RenderError::RenderFailure(format!(
                    "Invalid figure size {}x{} at {} dpi (each side must be positive and at most {} pixels)",
                    w, h, self.dpi, MAX_PIXELS_PER_SIDE
                )));
            }
            Ok((pixels as u32).max(1))
        };
        Ok((px(w)?, px(h)?))
    }

    /// Histogram bin count, falling back to the default.
    pub fn bin_count(&self, bins: Option<usize>) -> Result<usize, RenderError> {
        match bins.unwrap_or(self.bins) {
            0 => Err(RenderError::RenderFailure("bins must be at least 1".to_string())),
            n if n > MAX_BINS => Err(RenderError::RenderFailure(format!(
                "bins must be at most {}, got {}",
                MAX_BINS, n
            ))),
            n => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("html".parse::<OutputFormat>().unwrap(), OutputFormat::Document);
        assert_eq!(
            "gif".parse::<OutputFormat>(),
            Err(RenderError::UnsupportedFormat("gif".to_string()))
        );
    }

    #[test]
    fn test_render_options_defaults_from_partial_json() {
        let opts: RenderOptions = serde_json::from_str(r#"{"dpi": 50}"#).unwrap();
        assert_eq!(opts.dpi, 50.0);
        assert_eq!(opts.bins, 30);
        assert_eq!(opts.pixel_size(None), Ok((400, 250)));
        assert_eq!(opts.pixel_size(Some((2.0, 1.0))), Ok((100, 50)));
    }

    #[test]
    fn test_pixel_size_rejects_unusable_figures() {
        let opts = RenderOptions::default();
        for figsize in [
            (1e9, 1e9),
            (700.0, 5.0),
            (f64::NAN, 5.0),
            (8.0, f64::INFINITY),
            (-8.0, 5.0),
            (0.0, 5.0),
        ] {
            assert!(
                matches!(opts.pixel_size(Some(figsize)), Err(RenderError::RenderFailure(_))),
                "accepted {:?}",
                figsize
            );
        }
        assert_eq!(opts.pixel_size(Some((655.36, 1.0))), Ok((65_536, 100)));
    }

    #[test]
    fn test_bin_count_bounds() {
        let opts = RenderOptions::default();
        assert_eq!(opts.bin_count(None), Ok(30));
        assert_eq!(opts.bin_count(Some(MAX_BINS)), Ok(MAX_BINS));
        assert!(opts.bin_count(Some(MAX_BINS + 1)).is_err());
        assert!(opts.bin_count(Some(usize::MAX)).is_err());
        assert!(opts.bin_count(Some(0)).is_err());
    }
}
