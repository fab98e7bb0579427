use crate::config::{ClassificationConfig, PreprocessConfig, ResizeFilter};
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops, DynamicImage, ImageFormat, RgbImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Image not found or unreadable: {0}")]
    NotFound(PathBuf),
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Target dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// An encoded JPEG image ready to be sent to the device.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Bytes,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn encoding(&self) -> ImageFormat {
        ImageFormat::Jpeg
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Decodes the frame into a fresh RGB buffer.
    pub fn decode(&self) -> Result<RgbImage, image::ImageError> {
        image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg).map(|img| img.to_rgb8())
    }
}

/// Body of the classification `POST /predict` request.
#[derive(Debug, Clone, Serialize)]
pub struct PixelPayload {
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
    quality: u8,
    filter: ResizeFilter,
}

impl ImagePreprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            quality: config.quality,
            filter: config.filter,
        }
    }

    #[instrument(skip(self), fields(width = self.width, height = self.height))]
    pub fn prepare(&self, source: &Path) -> Result<Frame, PreprocessError> {
        let img = load_image(source)?;
        self.prepare_image(&img)
    }

    pub fn prepare_image(&self, img: &DynamicImage) -> Result<Frame, PreprocessError> {
        let resized = resize_rgb(img, self.width, self.height, self.filter)?;
        tracing::debug!("Image resized to {}x{}", self.width, self.height);

        let frame = encode_jpeg(&resized, self.quality)?;
        tracing::info!("Image encoded to JPEG, {} bytes", frame.len());
        Ok(frame)
    }
}

/// Loads `source`, converts it to RGB, resizes it to `width`x`height` and
/// encodes it as JPEG at `quality`.
pub fn prepare(
    source: &Path,
    width: u32,
    height: u32,
    quality: u8,
    filter: ResizeFilter,
) -> Result<Frame, PreprocessError> {
    ImagePreprocessor {
        width,
        height,
        quality,
        filter,
    }
    .prepare(source)
}

/// Builds the flattened row-major RGB payload used by the HTTP classifier.
pub fn prepare_pixels(
    source: &Path,
    config: &ClassificationConfig,
) -> Result<PixelPayload, PreprocessError> {
    let img = load_image(source)?;
    let resized = resize_rgb(&img, config.width, config.height, config.filter)?;
    Ok(PixelPayload {
        pixels: resized.into_raw(),
    })
}

fn load_image(source: &Path) -> Result<DynamicImage, PreprocessError> {
    let reader = image::ImageReader::open(source)
        .map_err(|_| PreprocessError::NotFound(source.to_path_buf()))?
        .with_guessed_format()
        .map_err(|_| PreprocessError::NotFound(source.to_path_buf()))?;

    reader.decode().map_err(|source_err| PreprocessError::Decode {
        path: source.to_path_buf(),
        source: source_err,
    })
}

// JPEG has no alpha channel, so everything goes through RGB8 first.
fn resize_rgb(
    img: &DynamicImage,
    width: u32,
    height: u32,
    filter: ResizeFilter,
) -> Result<RgbImage, PreprocessError> {
    if width == 0 || height == 0 {
        return Err(PreprocessError::InvalidDimensions { width, height });
    }

    let rgb = img.to_rgb8();
    if rgb.dimensions() == (width, height) {
        return Ok(rgb);
    }
    Ok(imageops::resize(&rgb, width, height, filter.into()))
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Frame, PreprocessError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(img)
        .map_err(PreprocessError::Encode)?;

    Ok(Frame {
        width: img.width(),
        height: img.height(),
        data: Bytes::from(buf),
    })
}
