//! Output format selection by file extension

use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Encodable output formats, selected from the destination path's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
    #[cfg(feature = "webp-support")]
    WebP,
}

impl OutputFormat {
    /// Match a lowercase or mixed-case extension (without the dot)
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            #[cfg(feature = "webp-support")]
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Format for the given destination path, `None` when the extension is missing or unknown
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    #[must_use]
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
            #[cfg(feature = "webp-support")]
            Self::WebP => ImageFormat::WebP,
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }

    /// Convert `image` into a color type the encoder accepts
    ///
    /// JPEG drops the alpha channel; every other format keeps the image as is.
    #[must_use]
    pub fn prepare(self, image: &DynamicImage) -> Option<DynamicImage> {
        if !self.supports_alpha() && image.color().has_alpha() {
            Some(DynamicImage::ImageRgb8(image.to_rgb8()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Bmp => write!(f, "BMP"),
            Self::Tiff => write!(f, "TIFF"),
            #[cfg(feature = "webp-support")]
            Self::WebP => write!(f, "WebP"),
        }
    }
}
