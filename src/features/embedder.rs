//! Image embedding via a pretrained ONNX network.
//!
//! The embedding network is a frozen black box: `embed(image) -> vector`.
//! Everything trainable in avilearn sits on top of these vectors, so the
//! session is wrapped behind the [`Embedder`] trait and tests substitute a
//! deterministic implementation.

use crate::constants::{IMAGENET_MEAN, IMAGENET_STD};
use crate::error::{Error, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array2, Array4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info, warn};

/// Produces fixed-length embedding vectors from crop images.
pub trait Embedder {
    /// Embedding dimensionality.
    fn dim(&self) -> usize;

    /// Embed a batch of images; output shape is `(images.len(), dim)`.
    fn embed_images(&mut self, images: &[RgbImage]) -> Result<Array2<f32>>;
}

/// [`Embedder`] backed by an ONNX Runtime session.
pub struct OnnxEmbedder {
    session: Session,
    input_size: u32,
    dim: usize,
}

impl OnnxEmbedder {
    /// Load the embedding network from an ONNX file.
    ///
    /// Runs one dummy batch to discover the output dimensionality.
    pub fn from_file(model_path: &Path, input_size: u32) -> Result<Self> {
        let builder = Session::builder().map_err(|e| Error::EmbedderBuild {
            reason: e.to_string(),
        })?;

        #[cfg(feature = "cuda")]
        let builder = builder
            .with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default().build(),
            ])
            .map_err(|e| Error::EmbedderBuild {
                reason: e.to_string(),
            })?;

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| Error::EmbedderBuild {
                reason: e.to_string(),
            })?
            .commit_from_file(model_path)
            .map_err(|e| Error::EmbedderBuild {
                reason: e.to_string(),
            })?;

        let mut embedder = Self {
            session,
            input_size,
            dim: 0,
        };

        // Probe the output width with a single zero image.
        let probe = RgbImage::new(input_size, input_size);
        let out = embedder.run_batch(&[probe])?;
        embedder.dim = out.ncols();

        info!(
            "Embedding network loaded: {} ({}x{} input, {}-d output)",
            model_path.display(),
            input_size,
            input_size,
            embedder.dim
        );

        Ok(embedder)
    }

    fn run_batch(&mut self, images: &[RgbImage]) -> Result<Array2<f32>> {
        let batch = preprocess(images, self.input_size);
        let input =
            ort::value::Tensor::from_array(batch).map_err(|e| Error::Embed {
                reason: e.to_string(),
            })?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| Error::Embed {
                reason: e.to_string(),
            })?;

        let view = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| Error::Embed {
                reason: e.to_string(),
            })?;

        // Networks that keep spatial dims (e.g. global-pool outputs of shape
        // N x D x 1 x 1) are flattened per image.
        let n = images.len();
        let flat: Vec<f32> = view.iter().copied().collect();
        if n == 0 || flat.len() % n != 0 {
            return Err(Error::Embed {
                reason: format!("unexpected output element count {} for batch {}", flat.len(), n),
            });
        }
        let dim = flat.len() / n;

        Array2::from_shape_vec((n, dim), flat).map_err(|e| Error::Embed {
            reason: e.to_string(),
        })
    }
}

impl Embedder for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_images(&mut self, images: &[RgbImage]) -> Result<Array2<f32>> {
        if images.is_empty() {
            return Ok(Array2::zeros((0, self.dim)));
        }
        let out = self.run_batch(images)?;
        debug!("Embedded batch of {} images", images.len());
        Ok(out)
    }
}

/// Resize and normalize images into an NCHW batch tensor.
fn preprocess(images: &[RgbImage], input_size: u32) -> Array4<f32> {
    let size = input_size as usize;
    let mut batch = Array4::<f32>::zeros((images.len(), 3, size, size));

    for (i, img) in images.iter().enumerate() {
        let resized = if img.width() == input_size && img.height() == input_size {
            img.clone()
        } else {
            image::imageops::resize(img, input_size, input_size, FilterType::Triangle)
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let v = f32::from(pixel.0[c]) / 255.0;
                batch[[i, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
    }

    batch
}

/// Load a crop image from disk.
///
/// Returns `None` for missing or undecodable files; the caller counts and
/// continues (data errors are never fatal here).
pub fn load_crop(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            warn!("Skipping crop '{}': {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shapes_and_normalization() {
        let mut img = RgbImage::new(4, 4);
        for p in img.pixels_mut() {
            p.0 = [255, 0, 128];
        }

        let batch = preprocess(&[img], 4);
        assert_eq!(batch.shape(), &[1, 3, 4, 4]);

        // Red channel: (1.0 - mean) / std.
        let expected = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        assert!((batch[[0, 0, 0, 0]] - expected).abs() < 1e-5);
        // Green channel: (0.0 - mean) / std is negative.
        assert!(batch[[0, 1, 0, 0]] < 0.0);
    }

    #[test]
    fn test_preprocess_resizes_to_input_size() {
        let img = RgbImage::new(10, 6);
        let batch = preprocess(&[img], 8);
        assert_eq!(batch.shape(), &[1, 3, 8, 8]);
    }

    #[test]
    fn test_load_crop_missing_file_is_none() {
        assert!(load_crop(Path::new("/nonexistent/crop.jpg")).is_none());
    }

    #[test]
    fn test_load_crop_reads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.png");
        RgbImage::new(6, 6).save(&path).unwrap();
        let img = load_crop(&path).unwrap();
        assert_eq!(img.dimensions(), (6, 6));
    }
}
