//! Image ↔ face vector conversion.
//!
//! Faces are converted to 8-bit luma, resized to the engine's fixed
//! `width × height`, flattened row-major and scaled to `[0, 1]`.

use crate::error::{EigenfaceError, Result};
use crate::types::FaceVector;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use ndarray::{Array1, Array2};
use std::path::Path;

const MAX_INTENSITY: f64 = 255.0;

/// Converts decoded images into fixed-size face vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vectorizer {
    width: u32,
    height: u32,
}

impl Vectorizer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EigenfaceError::InvalidImageFormat(format!(
                "target size {width}x{height} has a zero dimension"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Vector length `D = width × height`.
    pub fn dimension(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Decode an encoded image (PNG, JPEG, ...) and vectorize it.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<FaceVector> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| EigenfaceError::InvalidImageFormat(format!("decode failed: {e}")))?;
        self.to_vector(&img)
    }

    /// Open an image file and vectorize it.
    pub fn from_path(&self, path: &Path) -> Result<FaceVector> {
        let img = image::open(path).map_err(|e| {
            EigenfaceError::InvalidImageFormat(format!("{}: {e}", path.display()))
        })?;
        self.to_vector(&img)
    }

    /// Convert a decoded image into a face vector.
    pub fn to_vector(&self, img: &DynamicImage) -> Result<FaceVector> {
        if img.width() == 0 || img.height() == 0 {
            return Err(EigenfaceError::InvalidImageFormat(format!(
                "image has zero dimensions ({}x{})",
                img.width(),
                img.height()
            )));
        }

        let mut gray = img.to_luma8();
        if gray.dimensions() != (self.width, self.height) {
            tracing::debug!(
                from_width = gray.width(),
                from_height = gray.height(),
                to_width = self.width,
                to_height = self.height,
                "resizing face image"
            );
            gray = image::imageops::resize(&gray, self.width, self.height, FilterType::Triangle);
        }

        let values: Array1<f64> = gray
            .as_raw()
            .iter()
            .map(|&p| p as f64 / MAX_INTENSITY)
            .collect();
        Ok(FaceVector::new(values))
    }
}

/// Reshape a face vector into a `height × width` intensity grid.
pub fn to_grid(vector: &FaceVector, width: usize, height: usize) -> Result<Array2<f64>> {
    if vector.len() != width * height {
        return Err(EigenfaceError::DimensionMismatch {
            context: "face vector to grid",
            expected: width * height,
            actual: vector.len(),
        });
    }
    let grid = Array2::from_shape_fn((height, width), |(y, x)| vector.view()[y * width + x]);
    Ok(grid)
}

/// Render a face vector as an 8-bit image, min-max stretched to 0–255.
///
/// Works for raw faces as well as eigenfaces, whose components are signed.
pub fn to_image(vector: &FaceVector, width: u32, height: u32) -> Result<GrayImage> {
    let grid = to_grid(vector, width as usize, height as usize)?;

    let (lo, hi) = grid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = hi - lo;

    let pixels: Vec<u8> = grid
        .iter()
        .map(|&v| {
            if span > 0.0 {
                ((v - lo) / span * MAX_INTENSITY).round().clamp(0.0, MAX_INTENSITY) as u8
            } else {
                0
            }
        })
        .collect();

    GrayImage::from_raw(width, height, pixels).ok_or(EigenfaceError::DimensionMismatch {
        context: "grayscale image buffer",
        expected: width as usize * height as usize,
        actual: vector.len(),
    })
}
