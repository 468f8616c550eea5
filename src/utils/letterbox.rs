//! Letterbox transform between arbitrary images and the square model canvas
//!
//! The forward direction fits an image into an `S x S` canvas preserving aspect ratio, pads the
//! remainder with zeros and produces a normalized NCHW tensor. The inverse direction crops the
//! same region out of the model's mask and resizes it back to the original dimensions.

use crate::{
    error::{MattingError, Result},
    types::Mask,
};
use image::{imageops, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{s, Array3, Array4};

/// Geometry recorded by [`Letterbox::forward`] and needed by [`Letterbox::inverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxGeometry {
    /// Canvas side length S
    pub side: u32,
    /// Height of the resized image inside the canvas
    pub target_height: u32,
    /// Width of the resized image inside the canvas
    pub target_width: u32,
    /// Rows of padding above the image
    pub pad_top: u32,
    /// Columns of padding left of the image
    pub pad_left: u32,
    /// Height of the original image
    pub original_height: u32,
    /// Width of the original image
    pub original_width: u32,
}

impl LetterboxGeometry {
    /// Compute the geometry for an image of `(width, height)` on an `S x S` canvas
    ///
    /// The longer side maps to S and the shorter to `round(S * shorter / longer)`, never below 1.
    /// Offsets use floor division, so an odd remainder leaves the extra row or column of padding
    /// at the bottom or right.
    ///
    /// # Errors
    /// - Zero side length
    /// - Zero-sized image
    pub fn compute(width: u32, height: u32, side: u32) -> Result<Self> {
        if side == 0 {
            return Err(MattingError::processing("Canvas side must be positive"));
        }
        if width == 0 || height == 0 {
            return Err(MattingError::processing(format!(
                "Cannot letterbox an empty image ({width}x{height})"
            )));
        }

        let (target_height, target_width) = if height > width {
            (side, scale_shorter(side, width, height))
        } else if width > height {
            (scale_shorter(side, height, width), side)
        } else {
            (side, side)
        };

        Ok(Self {
            side,
            target_height,
            target_width,
            pad_top: (side - target_height) / 2,
            pad_left: (side - target_width) / 2,
            original_height: height,
            original_width: width,
        })
    }

    /// Rows of padding below the image
    #[must_use]
    pub fn pad_bottom(&self) -> u32 {
        self.side - self.target_height - self.pad_top
    }

    /// Columns of padding right of the image
    #[must_use]
    pub fn pad_right(&self) -> u32 {
        self.side - self.target_width - self.pad_left
    }
}

fn scale_shorter(side: u32, shorter: u32, longer: u32) -> u32 {
    let scaled = (f64::from(side) * f64::from(shorter) / f64::from(longer)).round();
    (scaled as u32).clamp(1, side)
}

/// Aspect-preserving square letterbox transform
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    side: u32,
}

impl Letterbox {
    #[must_use]
    pub fn new(side: u32) -> Self {
        Self { side }
    }

    #[must_use]
    pub fn side(&self) -> u32 {
        self.side
    }

    /// Produce the `(1, 3, S, S)` tensor for `image` and the geometry to undo it
    ///
    /// Bytes are normalized to `[0, 1]` before resizing with a triangle (bilinear) filter.
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    pub fn forward(&self, image: &RgbImage) -> Result<(Array4<f32>, LetterboxGeometry)> {
        let (width, height) = image.dimensions();
        let geometry = LetterboxGeometry::compute(width, height, self.side)?;

        let normalized: ImageBuffer<Rgb<f32>, Vec<f32>> =
            ImageBuffer::from_fn(width, height, |x, y| {
                let pixel = image.get_pixel(x, y);
                Rgb([
                    f32::from(pixel[0]) / 255.0,
                    f32::from(pixel[1]) / 255.0,
                    f32::from(pixel[2]) / 255.0,
                ])
            });

        let resized = imageops::resize(
            &normalized,
            geometry.target_width,
            geometry.target_height,
            imageops::FilterType::Triangle,
        );

        let side = self.side as usize;
        let top = geometry.pad_top as usize;
        let left = geometry.pad_left as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let row = top + y as usize;
            let col = left + x as usize;
            for channel in 0..3 {
                if let (Some(slot), Some(&value)) = (
                    tensor.get_mut([0, channel, row, col]),
                    pixel.0.get(channel),
                ) {
                    *slot = value;
                }
            }
        }

        Ok((tensor, geometry))
    }

    /// Map a `(1, 1, S, S)` raw mask back to a mask in the original frame
    ///
    /// # Errors
    /// - Raw mask shape does not match the recorded geometry
    pub fn inverse(&self, raw_mask: &Array4<f32>, geometry: &LetterboxGeometry) -> Result<Mask> {
        let side = geometry.side as usize;
        let (batch, channels, height, width) = raw_mask.dim();
        if batch != 1 || channels != 1 || height != side || width != side {
            return Err(MattingError::processing(format!(
                "Expected raw mask of shape (1, 1, {side}, {side}), got ({batch}, {channels}, {height}, {width})"
            )));
        }

        let top = geometry.pad_top as usize;
        let left = geometry.pad_left as usize;
        let crop = raw_mask.slice(s![
            0,
            0,
            top..top + geometry.target_height as usize,
            left..left + geometry.target_width as usize
        ]);

        let cropped: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(
            geometry.target_width,
            geometry.target_height,
            crop.iter().copied().collect(),
        )
        .ok_or_else(|| MattingError::internal("Cropped mask buffer has unexpected length"))?;

        let restored = imageops::resize(
            &cropped,
            geometry.original_width,
            geometry.original_height,
            imageops::FilterType::Triangle,
        );

        let data = Array3::from_shape_vec(
            (
                geometry.original_height as usize,
                geometry.original_width as usize,
                1,
            ),
            restored.into_raw(),
        )
        .map_err(|e| MattingError::processing(format!("Failed to shape restored mask: {e}")))?;

        Mask::new(data)
    }
}
