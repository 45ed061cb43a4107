//! Training dataset preparation.
//!
//! Cluster labels (or corrected labels) paired with crop paths become
//! train/validation/test embedding splits. Images are split before
//! augmentation so augmented copies of a held-out image can never leak
//! into the training partition, and only the training partition is
//! augmented.

use crate::config::TrainingConfig;
use crate::constants::DEFAULT_EMBED_BATCH_SIZE;
use crate::error::{Error, Result};
use crate::features::{load_crop, Embedder};
use crate::trainer::augment::augment_image;
use image::RgbImage;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use tracing::{info, warn};

/// Embedded train/validation/test splits.
pub struct Dataset {
    /// Training embeddings, including augmented copies.
    pub train_x: Array2<f32>,
    /// Training labels, parallel to `train_x` rows.
    pub train_y: Vec<usize>,
    /// Validation embeddings; may be empty for very small datasets.
    pub val_x: Array2<f32>,
    /// Validation labels.
    pub val_y: Vec<usize>,
    /// Test embeddings.
    pub test_x: Array2<f32>,
    /// Test labels.
    pub test_y: Vec<usize>,
    /// Number of classes, `max label + 1`.
    pub n_classes: usize,
}

/// Load, split, augment, and embed `samples` into a [`Dataset`].
///
/// Unreadable crop files are skipped with a warning. Labels must cover at
/// least 2 classes after skipping.
pub fn prepare_dataset(
    embedder: &mut dyn Embedder,
    samples: &[(PathBuf, usize)],
    config: &TrainingConfig,
    rng: &mut StdRng,
) -> Result<Dataset> {
    let mut images: Vec<RgbImage> = Vec::with_capacity(samples.len());
    let mut labels: Vec<usize> = Vec::with_capacity(samples.len());
    let mut skipped = 0usize;
    for (path, label) in samples {
        match load_crop(path) {
            Some(img) => {
                images.push(img);
                labels.push(*label);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("{} training crop(s) were missing or unreadable", skipped);
    }
    if images.is_empty() {
        return Err(Error::DatasetPrepare {
            message: "no readable crop images".to_string(),
        });
    }

    let n_classes = labels.iter().max().map_or(0, |m| m + 1);
    let distinct = {
        let mut seen = vec![false; n_classes];
        for &l in &labels {
            seen[l] = true;
        }
        seen.iter().filter(|&&s| s).count()
    };
    if distinct < 2 {
        return Err(Error::DatasetPrepare {
            message: format!("need at least 2 species, found {distinct}"),
        });
    }

    let (train_idx, val_idx, test_idx) =
        split_indices(&labels, n_classes, config.test_size, config.val_size, rng)?;

    // Augmented copies join only the training partition.
    let mut train_images: Vec<RgbImage> = Vec::with_capacity(train_idx.len() * (1 + config.augment_copies));
    let mut train_y: Vec<usize> = Vec::with_capacity(train_images.capacity());
    for &i in &train_idx {
        train_images.push(images[i].clone());
        train_y.push(labels[i]);
        for _ in 0..config.augment_copies {
            train_images.push(augment_image(&images[i], rng));
            train_y.push(labels[i]);
        }
    }

    let gather = |idx: &[usize]| -> (Vec<RgbImage>, Vec<usize>) {
        (
            idx.iter().map(|&i| images[i].clone()).collect(),
            idx.iter().map(|&i| labels[i]).collect(),
        )
    };
    let (val_images, val_y) = gather(&val_idx);
    let (test_images, test_y) = gather(&test_idx);

    let train_x = embed_all(embedder, &train_images)?;
    let val_x = embed_all(embedder, &val_images)?;
    let test_x = embed_all(embedder, &test_images)?;

    info!(
        "Prepared dataset: {} train (incl. {} augmented), {} val, {} test, {} classes",
        train_y.len(),
        train_y.len() - train_idx.len(),
        val_y.len(),
        test_y.len(),
        n_classes
    );

    Ok(Dataset {
        train_x,
        train_y,
        val_x,
        val_y,
        test_x,
        test_y,
        n_classes,
    })
}

/// Embed a list of images in batches, concatenating the results.
pub(crate) fn embed_all(embedder: &mut dyn Embedder, images: &[RgbImage]) -> Result<Array2<f32>> {
    let dim = embedder.dim();
    let mut out = Array2::<f32>::zeros((0, dim));
    for chunk in images.chunks(DEFAULT_EMBED_BATCH_SIZE) {
        let batch = embedder.embed_images(chunk)?;
        out.append(Axis(0), batch.view()).map_err(|e| Error::Internal {
            message: format!("embedding batch shape mismatch: {e}"),
        })?;
    }
    Ok(out)
}

/// Split sample indices into train/validation/test partitions.
///
/// When every class has at least 2 samples and there are at least 6 total,
/// the split is stratified per class. When stratification is not possible,
/// or its per-class rounding leaves train or test empty, the split falls
/// back to a plain shuffled one that guarantees a non-empty test partition.
fn split_indices(
    labels: &[usize],
    n_classes: usize,
    test_size: f32,
    val_size: f32,
    rng: &mut StdRng,
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>)> {
    let n = labels.len();
    if n < 3 {
        return Err(Error::DatasetPrepare {
            message: format!("need at least 3 samples to split, found {n}"),
        });
    }

    let mut class_counts = vec![0usize; n_classes];
    for &l in labels {
        class_counts[l] += 1;
    }
    let stratify = n >= 6 && class_counts.iter().all(|&c| c == 0 || c >= 2);

    if stratify {
        let mut train = Vec::new();
        let mut val = Vec::new();
        let mut test = Vec::new();

        for class in 0..n_classes {
            let mut idx: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
            if idx.is_empty() {
                continue;
            }
            idx.shuffle(rng);
            let len = idx.len();
            let mut n_test = ((len as f32) * test_size).round() as usize;
            n_test = n_test.min(len - 1);
            let mut n_val = ((len as f32) * val_size).round() as usize;
            n_val = n_val.min(len - n_test - 1);

            test.extend_from_slice(&idx[..n_test]);
            val.extend_from_slice(&idx[n_test..n_test + n_val]);
            train.extend_from_slice(&idx[n_test + n_val..]);
        }

        if !train.is_empty() && !test.is_empty() {
            return Ok((train, val, test));
        }
        warn!(
            "Stratified split left train or test empty for {} samples; \
             falling back to a random split",
            n
        );
    }

    // Plain shuffled split; n >= 3 guarantees non-empty train and test.
    let mut idx: Vec<usize> = (0..n).collect();
    idx.shuffle(rng);
    let n_test = (((n as f32) * test_size).round() as usize).clamp(1, n - 2);
    let n_val = (((n as f32) * val_size).round() as usize).min(n - n_test - 1);

    let test = idx[..n_test].to_vec();
    let val = idx[n_test..n_test + n_val].to_vec();
    let train = idx[n_test + n_val..].to_vec();
    Ok((train, val, test))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct MeanEmbedder;

    impl Embedder for MeanEmbedder {
        fn dim(&self) -> usize {
            3
        }

        fn embed_images(&mut self, images: &[RgbImage]) -> Result<Array2<f32>> {
            let mut out = Array2::zeros((images.len(), 3));
            for (i, img) in images.iter().enumerate() {
                let n = (img.width() * img.height()) as f32;
                for p in img.pixels() {
                    for c in 0..3 {
                        out[[i, c]] += f32::from(p.0[c]) / (255.0 * n);
                    }
                }
            }
            Ok(out)
        }
    }

    fn write_crops(dir: &std::path::Path, per_class: usize) -> Vec<(PathBuf, usize)> {
        let colors = [[220u8, 20, 20], [20, 220, 20]];
        let mut samples = Vec::new();
        for (class, color) in colors.iter().enumerate() {
            for i in 0..per_class {
                let path = dir.join(format!("c{class}_{i}.png"));
                RgbImage::from_pixel(8, 8, image::Rgb(*color)).save(&path).unwrap();
                samples.push((path, class));
            }
        }
        samples
    }

    #[test]
    fn test_prepare_produces_all_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let samples = write_crops(dir.path(), 10);
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut embedder = MeanEmbedder;

        let data = prepare_dataset(&mut embedder, &samples, &config, &mut rng).unwrap();

        assert_eq!(data.n_classes, 2);
        assert!(!data.train_y.is_empty());
        assert!(!data.val_y.is_empty());
        assert!(!data.test_y.is_empty());
        assert_eq!(data.train_x.nrows(), data.train_y.len());
        assert_eq!(data.test_x.nrows(), data.test_y.len());
        // 20 originals minus held-out, each training original brings
        // augment_copies extra rows.
        let held_out = data.val_y.len() + data.test_y.len();
        let train_originals = 20 - held_out;
        assert_eq!(data.train_y.len(), train_originals * (1 + config.augment_copies));
    }

    #[test]
    fn test_stratified_split_covers_both_classes_in_test() {
        let dir = tempfile::tempdir().unwrap();
        let samples = write_crops(dir.path(), 10);
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut embedder = MeanEmbedder;

        let data = prepare_dataset(&mut embedder, &samples, &config, &mut rng).unwrap();
        let mut seen = [false; 2];
        for &l in &data.test_y {
            seen[l] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn test_tiny_dataset_falls_back_to_plain_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut samples = write_crops(dir.path(), 2);
        samples.pop(); // 2 of class 0, 1 of class 1
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut embedder = MeanEmbedder;

        let data = prepare_dataset(&mut embedder, &samples, &config, &mut rng).unwrap();
        assert!(!data.train_y.is_empty());
        assert!(!data.test_y.is_empty());
    }

    #[test]
    fn test_two_samples_per_class_still_yields_a_test_partition() {
        // 3 classes x 2 samples: per-class test counts all round to zero,
        // so the stratified pass must give way to the random split.
        let dir = tempfile::tempdir().unwrap();
        let colors = [[220u8, 20, 20], [20, 220, 20], [20, 20, 220]];
        let mut samples = Vec::new();
        for (class, color) in colors.iter().enumerate() {
            for i in 0..2 {
                let path = dir.path().join(format!("s{class}_{i}.png"));
                RgbImage::from_pixel(8, 8, image::Rgb(*color)).save(&path).unwrap();
                samples.push((path, class));
            }
        }
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut embedder = MeanEmbedder;

        let data = prepare_dataset(&mut embedder, &samples, &config, &mut rng).unwrap();
        assert_eq!(data.n_classes, 3);
        assert!(!data.train_y.is_empty());
        assert!(!data.test_y.is_empty());
    }

    #[test]
    fn test_single_class_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<(PathBuf, usize)> = write_crops(dir.path(), 4)
            .into_iter()
            .filter(|(_, l)| *l == 0)
            .collect();
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut embedder = MeanEmbedder;

        assert!(matches!(
            prepare_dataset(&mut embedder, &samples, &config, &mut rng),
            Err(Error::DatasetPrepare { .. })
        ));
    }

    #[test]
    fn test_all_files_missing_is_rejected() {
        let samples = vec![
            (PathBuf::from("/nonexistent/a.png"), 0),
            (PathBuf::from("/nonexistent/b.png"), 1),
        ];
        let config = TrainingConfig::default();
        let mut rng = StdRng::seed_from_u64(4);
        let mut embedder = MeanEmbedder;

        assert!(matches!(
            prepare_dataset(&mut embedder, &samples, &config, &mut rng),
            Err(Error::DatasetPrepare { .. })
        ));
    }
}
