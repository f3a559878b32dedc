// Per-render drawing surface for the static backend

use crate::RasterFormat;
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;

/// An offscreen RGB surface owned by exactly one render call.
///
/// Every static render acquires its own `Canvas`, draws into it and encodes
/// it; the pixel buffer is released when the canvas is dropped, whichever
/// way the render exits. Nothing is shared between calls.
pub struct Canvas {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .with_context(|| format!("Drawing surface {}x{} is too large", width, height))?;
        log::trace!("Acquiring {}x{} drawing surface", width, height);
        Ok(Self {
            buffer: vec![255u8; len],
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Run `draw` against a white drawing area backed by this canvas.
    pub fn draw<F>(&mut self, draw: F) -> Result<()>
    where
        F: FnOnce(&DrawingArea<BitMapBackend, Shift>) -> Result<()>,
    {
        let root = BitMapBackend::with_buffer(&mut self.buffer, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).context("Failed to fill background")?;
        draw(&root)?;
        root.present().context("Failed to present drawing")?;
        Ok(())
    }

    /// Encode the finished surface, consuming the canvas.
    pub fn encode(self, format: RasterFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        match format {
            RasterFormat::Png => {
                image::codecs::png::PngEncoder::new(&mut bytes)
                    .write_image(&self.buffer, self.width, self.height, image::ColorType::Rgb8)
                    .context("Failed to encode PNG")?;
            }
            RasterFormat::Jpeg => {
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, jpeg_quality)
                    .write_image(&self.buffer, self.width, self.height, image::ColorType::Rgb8)
                    .context("Failed to encode JPEG")?;
            }
        }
        Ok(bytes)
    }
}

impl Drop for Canvas {
    fn drop(&mut self) {
        log::trace!("Releasing {}x{} drawing surface", self.width, self.height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_canvas_encodes_png() {
        let canvas = Canvas::new(20, 10).unwrap();
        let bytes = canvas.encode(RasterFormat::Png, 90).unwrap();
        assert_eq!(&bytes[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    }

    #[test]
    fn test_blank_canvas_encodes_jpeg() {
        let canvas = Canvas::new(20, 10).unwrap();
        let bytes = canvas.encode(RasterFormat::Jpeg, 90).unwrap();
        assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_draw_error_propagates() {
        let mut canvas = Canvas::new(20, 10).unwrap();
        let result = canvas.draw(|_| anyhow::bail!("boom"));
        assert!(result.unwrap_err().to_string().contains("boom"));
        assert_eq!(canvas.size(), (20, 10));
    }

    #[test]
    fn test_draw_rectangle() {
        let mut canvas = Canvas::new(20, 10).unwrap();
        canvas
            .draw(|root| {
                root.draw(&Rectangle::new([(0, 0), (5, 5)], BLACK.filled()))
                    .context("Failed to draw rectangle")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(&canvas.buffer[0..3], &[0, 0, 0]);
    }

    #[test]
    fn test_oversized_canvas_is_an_error() {
        assert!(Canvas::new(u32::MAX, u32::MAX).is_err());
    }
}
