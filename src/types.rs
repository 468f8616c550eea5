//! Core data types for matting results

use crate::error::{MattingError, Result};
use image::{RgbImage, RgbaImage};
use ndarray::Array3;

/// Per-pixel opacity estimate in the original image frame
///
/// Shape is `(height, width, 1)`, values nominally in `[0, 1]` where 1 is foreground.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array3<f32>,
}

impl Mask {
    /// Wrap a `(height, width, 1)` array
    ///
    /// # Errors
    /// - Trailing axis is not of length 1
    /// - Height or width is zero
    pub fn new(data: Array3<f32>) -> Result<Self> {
        let (height, width, channels) = data.dim();
        if channels != 1 {
            return Err(MattingError::processing(format!(
                "Mask must have a single channel, got {channels}"
            )));
        }
        if height == 0 || width == 0 {
            return Err(MattingError::processing(format!(
                "Mask must not be empty, got {width}x{height}"
            )));
        }
        Ok(Self { data })
    }

    /// Uniform mask of the given dimensions
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: Array3::from_elem((height as usize, width as usize, 1), value),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.data.dim().1 as u32
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.data.dim().0 as u32
    }

    /// `(width, height)` in the same order as `image::GenericImageView::dimensions`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Mask value at `(x, y)`, or `None` when out of bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.data.get([y as usize, x as usize, 0]).copied()
    }

    #[must_use]
    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

}

/// `round(value * 255)` clamped to the byte range
#[must_use]
pub fn mask_to_alpha(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// The two images produced by matting one input
#[derive(Debug, Clone)]
pub struct OutputPair {
    /// Alpha channel replicated across three channels
    pub mask_image: RgbImage,
    /// Foreground over white, with the alpha channel appended
    pub composited: RgbaImage,
}

impl OutputPair {
    /// `(width, height)` shared by both images
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.composited.dimensions()
    }
}
