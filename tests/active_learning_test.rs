//! Full active-learning lifecycle: train, review, correct, retrain.

use avilearn::config::{Config, TrainingConfig};
use avilearn::error::Result;
use avilearn::features::Embedder;
use avilearn::model::load_checkpoint;
use avilearn::service::{LearningService, ReviewLog};
use avilearn::trainer::Trainer;
use image::RgbImage;
use ndarray::Array2;
use std::path::{Path, PathBuf};

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

fn write_crops(dir: &Path, per_class: usize) -> Vec<(PathBuf, usize)> {
    let colors = [[230u8, 20, 20], [20, 230, 20]];
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

fn lifecycle_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.objects_dir = dir.join("objects");
    config.paths.checkpoint_file = dir.join("classifier.json");
    config.paths.review_log_file = dir.join("corrections.json");
    config.training = TrainingConfig {
        phase1_epochs: 8,
        phase2_epochs: 3,
        batch_size: 8,
        augment_copies: 1,
        trunk_dim: 8,
        hidden_dim: 6,
        ..TrainingConfig::default()
    };
    config
}

#[test]
fn test_train_review_correct_retrain_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(dir.path());
    std::fs::create_dir_all(&config.paths.objects_dir).unwrap();
    let samples = write_crops(&config.paths.objects_dir, 8);

    // Initial training on pseudo-labels.
    let mut embedder = MeanEmbedder;
    let mut trainer = Trainer::new(config.training.clone());
    trainer.prepare_data(&mut embedder, &samples).unwrap();
    trainer.train_phase1().unwrap();
    trainer.train_phase2().unwrap();
    let report = trainer.evaluate().unwrap();
    assert!(report.accuracy > 0.8);
    trainer.save(&config.paths.checkpoint_file).unwrap();

    // Review surfaces unprocessed crops in manual mode.
    let mut review_config = config.clone();
    review_config.active.force_manual_mode = true;
    review_config.active.max_samples = 100;
    let mut service = LearningService::new(review_config.clone());
    let batch = service.get_uncertain_predictions(&mut embedder).unwrap();
    assert_eq!(batch.len(), 16);

    // Correct one crop, confirm another; both leave the review queue.
    let corrected = batch[0].image_path.clone();
    let confirmed = batch[1].image_path.clone();
    service
        .record_correction(&corrected, 1, "Great Tit", Some((0, batch[0].confidence)))
        .unwrap();
    service.confirm_prediction(&confirmed).unwrap();

    let remaining = service.get_uncertain_predictions(&mut embedder).unwrap();
    assert_eq!(remaining.len(), 14);
    assert!(remaining.iter().all(|s| s.image_path != corrected));
    assert!(remaining.iter().all(|s| s.image_path != confirmed));

    // Retraining folds the correction in and names the class.
    let summary = service.retrain_with_corrections(&mut embedder).unwrap();
    assert_eq!(summary.used, 1);
    assert_eq!(summary.n_classes, 2);

    let (model, history) = load_checkpoint(&config.paths.checkpoint_file).unwrap();
    assert_eq!(history.fine_tune_runs, 1);
    assert_eq!(model.class_names()[1], "Great Tit");

    let stats = service.stats().unwrap();
    assert_eq!(stats.total_corrections, 1);
    assert_eq!(stats.processed_images, 2);
    assert_eq!(stats.fine_tune_runs, Some(1));
}

#[test]
fn test_repeated_corrections_keep_log_history_but_latest_wins() {
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(dir.path());

    let mut service = LearningService::new(config.clone());
    let image = dir.path().join("crop.png");
    service.record_correction(&image, 0, "Robin", None).unwrap();
    service.record_correction(&image, 1, "Dunnock", None).unwrap();

    let log = ReviewLog::load(&config.paths.review_log_file).unwrap();
    assert_eq!(log.corrections.len(), 2);
    assert_eq!(log.processed_images.len(), 1);

    let latest = log.latest_by_image();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].corrected_class_id, 1);
    assert_eq!(latest[0].corrected_class_name, "Dunnock");
}

#[test]
fn test_review_log_survives_process_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = lifecycle_config(dir.path());

    {
        let mut service = LearningService::new(config.clone());
        service
            .record_correction(Path::new("a.png"), 2, "Wren", None)
            .unwrap();
    }

    // A fresh service sees the durable state.
    let mut service = LearningService::new(config);
    let stats = service.stats().unwrap();
    assert_eq!(stats.total_corrections, 1);
    assert_eq!(stats.corrected_classes, 1);
    assert!(stats.last_updated.is_some());
}
