//! Image I/O operations service
//!
//! Decoding reads raw bytes first and sniffs the container from content, so any path the OS can
//! open works regardless of its encoding. Encoding picks the format from the destination
//! extension and replaces the destination atomically.

use crate::{
    config::EncodeParams,
    error::{MattingError, Result},
    services::format::OutputFormat,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, RgbImage};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Service for handling image file input/output operations
pub struct ImageCodec;

impl ImageCodec {
    /// Decode the image at `path` into an 8-bit RGB buffer
    ///
    /// # Errors
    /// - `MattingError::Decode` when the file cannot be read or is not a supported image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use abg_remover::services::ImageCodec;
    ///
    /// let image = ImageCodec::decode("input.png")?;
    /// println!("{}x{}", image.width(), image.height());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn decode<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
        let path_ref = path.as_ref();

        let data = std::fs::read(path_ref).map_err(|e| MattingError::decode_error(path_ref, e))?;

        let image = image::load_from_memory(&data).map_err(|e| {
            log::debug!(
                "Content-based decoding failed for {} ({} bytes): {}",
                path_ref.display(),
                data.len(),
                e
            );
            MattingError::decode_error(path_ref, e)
        })?;

        Ok(image.to_rgb8())
    }

    /// Encode `image` for the extension of `path` and write it, reporting success as a flag
    ///
    /// Failures are logged at error level and never propagate. On failure no partially written
    /// file is left at `path`.
    #[must_use]
    pub fn encode_and_write<P: AsRef<Path>>(
        path: P,
        image: &DynamicImage,
        params: &EncodeParams,
    ) -> bool {
        let path_ref = path.as_ref();
        match Self::try_encode_and_write(path_ref, image, params) {
            Ok(()) => {
                log::debug!("Saved {}", path_ref.display());
                true
            },
            Err(e) => {
                log::error!("{e}");
                false
            },
        }
    }

    /// Fallible core of [`ImageCodec::encode_and_write`]
    ///
    /// # Errors
    /// - `MattingError::EncodeWrite` for unknown extensions, encoder failures and I/O failures
    pub fn try_encode_and_write<P: AsRef<Path>>(
        path: P,
        image: &DynamicImage,
        params: &EncodeParams,
    ) -> Result<()> {
        let path_ref = path.as_ref();
        let format = OutputFormat::from_path(path_ref).ok_or_else(|| {
            MattingError::encode_write_error(path_ref, "unsupported output extension")
        })?;

        let bytes = Self::encode(image, format, params)
            .map_err(|e| MattingError::encode_write_error(path_ref, e))?;

        let parent = match path_ref.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut staged =
            NamedTempFile::new_in(parent).map_err(|e| MattingError::encode_write_error(path_ref, e))?;
        staged
            .write_all(&bytes)
            .and_then(|()| staged.flush())
            .map_err(|e| MattingError::encode_write_error(path_ref, e))?;
        staged
            .persist(path_ref)
            .map_err(|e| MattingError::encode_write_error(path_ref, e.error))?;

        Ok(())
    }

    /// Encode to an in-memory buffer in the given format
    ///
    /// # Errors
    /// - Encoder failures, reported as `MattingError::Processing`
    pub fn encode(
        image: &DynamicImage,
        format: OutputFormat,
        params: &EncodeParams,
    ) -> Result<Vec<u8>> {
        let converted = format.prepare(image);
        if converted.is_some() {
            log::debug!("{format} has no alpha channel, writing RGB only");
        }
        let image = converted.as_ref().unwrap_or(image);

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let result = match format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut cursor, params.jpeg_quality);
                image.write_with_encoder(encoder)
            },
            other => image.write_to(&mut cursor, other.image_format()),
        };
        result.map_err(|e| MattingError::processing(format!("Failed to encode {format}: {e}")))?;

        Ok(buffer)
    }

    /// Check if a file path has a supported image extension
    ///
    /// # Returns
    /// * `true` - If the file extension is supported
    /// * `false` - If the file extension is not supported or missing
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        OutputFormat::from_path(path).is_some()
    }
}
