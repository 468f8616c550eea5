//! Matting pipeline
//!
//! This module provides the `MattingPipeline` that turns a decoded image into its mask and
//! white-backed composite: letterbox, model inference, inverse letterbox, compositing. It is used
//! by the batch worker and can be driven directly for single images.

use crate::{
    config::{EncodeParams, MattingConfig},
    error::{MattingError, Result},
    inference::InferenceSession,
    services::ImageCodec,
    types::{mask_to_alpha, Mask, OutputPair},
    utils::Letterbox,
};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use instant::Instant;
use log::debug;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{instrument, span, Level};

/// Extension used when the input path has none
const FALLBACK_EXTENSION: &str = "png";

/// Stem suffix of the mask output
pub const MASK_SUFFIX: &str = "_mask";

/// Stem suffix of the composited output
pub const COMPOSITED_SUFFIX: &str = "_img";

/// Destination paths for the two outputs of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// `<stem>_mask<ext>`
    pub mask: PathBuf,
    /// `<stem>_img<ext>`
    pub composited: PathBuf,
}

impl OutputPaths {
    /// Derive output paths for `input`
    ///
    /// Outputs go to `output_dir` when it is set and names an existing directory, otherwise next
    /// to the input. The input's extension is kept; inputs without one are written as PNG.
    ///
    /// # Errors
    /// - `input` has no file name
    pub fn derive(input: &Path, output_dir: Option<&Path>) -> Result<Self> {
        let stem = input.file_stem().ok_or_else(|| {
            MattingError::processing(format!("Input '{}' has no file name", input.display()))
        })?;
        let extension = input
            .extension()
            .map_or_else(|| OsString::from(FALLBACK_EXTENSION), OsString::from);

        let directory = match output_dir {
            Some(dir) if dir.is_dir() => dir,
            Some(dir) => {
                debug!(
                    "Output directory {} does not exist, writing next to the input",
                    dir.display()
                );
                input.parent().unwrap_or_else(|| Path::new(""))
            },
            None => input.parent().unwrap_or_else(|| Path::new("")),
        };

        let file_name = |suffix: &str| {
            let mut name = stem.to_os_string();
            name.push(suffix);
            name.push(".");
            name.push(&extension);
            directory.join(name)
        };

        Ok(Self {
            mask: file_name(MASK_SUFFIX),
            composited: file_name(COMPOSITED_SUFFIX),
        })
    }

    /// Whether `path` is named like an output of a previous run
    #[must_use]
    pub fn is_output_file(path: &Path) -> bool {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.ends_with(MASK_SUFFIX) || stem.ends_with(COMPOSITED_SUFFIX))
    }
}

/// Letterbox, inference and compositing around a shared [`InferenceSession`]
#[derive(Debug, Clone)]
pub struct MattingPipeline {
    session: Arc<InferenceSession>,
    letterbox: Letterbox,
    encode_params: EncodeParams,
}

impl MattingPipeline {
    /// Create a pipeline and its session from a configuration
    ///
    /// The model is not loaded until first use; call [`InferenceSession::ensure_loaded`] through
    /// [`MattingPipeline::session`] to load it eagerly.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: MattingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_session(Arc::new(InferenceSession::new(config))))
    }

    /// Create a pipeline around an existing session
    #[must_use]
    pub fn with_session(session: Arc<InferenceSession>) -> Self {
        let config = session.config();
        Self {
            letterbox: Letterbox::new(config.canvas_side),
            encode_params: config.encode_params,
            session,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<InferenceSession> {
        &self.session
    }

    #[must_use]
    pub fn encode_params(&self) -> &EncodeParams {
        &self.encode_params
    }

    /// Estimate the mask of `image` in its own frame
    ///
    /// # Errors
    /// - `MattingError::ModelLoad` if the session cannot be constructed
    /// - `MattingError::Inference` if the model call fails
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn compute_mask(&self, image: &RgbImage) -> Result<Mask> {
        let (tensor, geometry) = {
            let _span = span!(Level::DEBUG, "letterbox", side = self.letterbox.side()).entered();
            self.letterbox.forward(image)?
        };

        let raw_mask = {
            let _span = span!(Level::INFO, "inference").entered();
            let start = Instant::now();
            let output = self.session.run(&tensor)?;
            debug!(
                "Inference took {:.2}ms",
                start.elapsed().as_secs_f64() * 1000.0
            );
            output
        };

        let _span = span!(Level::DEBUG, "unletterbox").entered();
        self.letterbox.inverse(&raw_mask, &geometry)
    }

    /// Produce the mask image and the white-backed composite for `image`
    ///
    /// Nothing is written to disk.
    ///
    /// # Errors
    /// - Propagates errors from [`MattingPipeline::compute_mask`]
    pub fn matte(&self, image: &RgbImage) -> Result<OutputPair> {
        let mask = self.compute_mask(image)?;
        let _span = span!(Level::DEBUG, "composite").entered();
        Self::composite(image, &mask)
    }

    /// Blend `image` over white with `mask` as weight and attach the mask as alpha
    ///
    /// Each RGB channel becomes `round(m * p + (1 - m) * 255)` and alpha becomes
    /// `round(m * 255)`, both clamped to `[0, 255]`.
    ///
    /// # Errors
    /// - Mask dimensions differ from the image dimensions
    pub fn composite(image: &RgbImage, mask: &Mask) -> Result<OutputPair> {
        if image.dimensions() != mask.dimensions() {
            return Err(MattingError::processing(format!(
                "Mask is {:?} but image is {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }

        let (width, height) = image.dimensions();
        let mut composited = RgbaImage::new(width, height);
        let mut mask_image = RgbImage::new(width, height);

        for (x, y, pixel) in image.enumerate_pixels() {
            let m = mask.get(x, y).unwrap_or(0.0);
            let blend = |channel: u8| {
                (m * f32::from(channel) + (1.0 - m) * 255.0)
                    .round()
                    .clamp(0.0, 255.0) as u8
            };
            let alpha = mask_to_alpha(m);

            composited.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), alpha]),
            );
            mask_image.put_pixel(x, y, Rgb([alpha, alpha, alpha]));
        }

        Ok(OutputPair {
            mask_image,
            composited,
        })
    }

    /// Decode `input`, matte it and write both outputs
    ///
    /// Both writes are attempted even when the first one fails.
    ///
    /// # Errors
    /// - `MattingError::Decode`, `MattingError::Inference`, `MattingError::ModelLoad` from the
    ///   stages above
    /// - `MattingError::EncodeWrite` naming every output that could not be written
    #[instrument(skip(self, outputs), fields(input = %input.display()))]
    pub fn process_file(&self, input: &Path, outputs: &OutputPaths) -> Result<()> {
        let image = ImageCodec::decode(input)?;
        let pair = self.matte(&image)?;

        let mask_written = ImageCodec::encode_and_write(
            &outputs.mask,
            &DynamicImage::ImageRgb8(pair.mask_image),
            &self.encode_params,
        );
        let composite_written = ImageCodec::encode_and_write(
            &outputs.composited,
            &DynamicImage::ImageRgba8(pair.composited),
            &self.encode_params,
        );

        let failed: Vec<String> = [
            (mask_written, &outputs.mask),
            (composite_written, &outputs.composited),
        ]
        .iter()
        .filter(|(written, _)| !written)
        .map(|(_, path)| path.display().to_string())
        .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MattingError::encode_write(format!(
                "Could not write {}",
                failed.join(", ")
            )))
        }
    }
}
