//! Avilearn - incremental bird species classification.
//!
//! Discovers species groups among detector crops via hierarchical
//! clustering, trains a classifier on the discovered groups, and folds
//! human corrections back in through active-learning fine-tuning.

#![warn(missing_docs)]
#![allow(clippy::print_stdout)]

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod features;
pub mod model;
pub mod service;
pub mod store;
pub mod trainer;
pub mod utils;

use clap::Parser;
use cli::{Cli, Command, CommonArgs, ConfigAction};
use cluster::{write_summary_csv, ClusterEngine, ClusteringExperiment, Linkage};
use config::{
    config_file_path, load_default_config, save_default_config, validate_config, Config,
};
use features::{FeaturePipeline, OnnxEmbedder};
use service::LearningService;
use std::path::PathBuf;
use store::JsonObjectStore;
use trainer::Trainer;
use tracing::info;

pub use error::{Error, Result};

/// Main entry point for the avilearn CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.common.verbose, cli.common.quiet);

    let mut config = load_default_config()?;
    validate_config(&config)?;
    if let Some(path) = &cli.common.embed_model {
        config.features.model_path = Some(path.clone());
    }

    handle_command(cli.command, &config, &cli.common)
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    // ORT logging is suppressed by default; -v raises it alongside our own
    // level.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt().with_env_filter(filter).init();
}

fn handle_command(command: Command, config: &Config, common: &CommonArgs) -> Result<()> {
    match command {
        Command::Cluster {
            min_confidence,
            output,
            suggest_thresholds,
        } => cmd_cluster(config, common, min_confidence, output, suggest_thresholds),
        Command::Train { min_confidence } => cmd_train(config, common, min_confidence),
        Command::Review { all, max_samples } => cmd_review(config, all, max_samples),
        Command::Correct {
            image,
            class_id,
            class_name,
        } => cmd_correct(config, &image, class_id, &class_name),
        Command::Retrain => cmd_retrain(config),
        Command::Stats => cmd_stats(config),
        Command::Config { action } => handle_config_command(action),
    }
}

fn build_embedder(config: &Config) -> Result<OnnxEmbedder> {
    let model_path = config
        .features
        .model_path
        .as_ref()
        .ok_or_else(|| Error::ConfigValidation {
            message: "no embedding model configured (use --embed-model or set features.model_path)"
                .to_string(),
        })?;
    OnnxEmbedder::from_file(model_path, config.features.input_size)
}

fn cmd_cluster(
    config: &Config,
    common: &CommonArgs,
    min_confidence: Option<f32>,
    output: Option<PathBuf>,
    suggest_thresholds: bool,
) -> Result<()> {
    let mut embedder = build_embedder(config)?;
    let store = JsonObjectStore::new(&config.paths.metadata_file);
    let mut pipeline = FeaturePipeline::new(&store, &mut embedder, config.features.batch_size);

    let min_confidence = min_confidence.unwrap_or(config.features.min_confidence);
    let features = pipeline.extract_all_features(min_confidence, !common.quiet)?;
    let engine = ClusterEngine::fit(&features.embeddings)?;

    if suggest_thresholds {
        for linkage in [Linkage::Ward, Linkage::Average] {
            let analysis = engine.dendrogram(linkage)?;
            println!(
                "{} linkage: merge distances {:.2}..{:.2} (mean {:.2}, std {:.2})",
                linkage,
                analysis.stats.min,
                analysis.stats.max,
                analysis.stats.mean,
                analysis.stats.std
            );
            let formatted: Vec<String> = analysis
                .suggested_thresholds
                .iter()
                .map(|t| format!("{t:.2}"))
                .collect();
            println!("  suggested thresholds: {}", formatted.join(", "));
        }
        return Ok(());
    }

    let experiment = ClusteringExperiment::new(config.clustering.clone(), config.scoring);
    let results = experiment.run_all(&engine);
    let best = experiment.best(&results)?;

    println!(
        "Best configuration: {} ({} species, silhouette {:.3})",
        best.name, best.run.metrics.n_clusters, best.run.metrics.silhouette
    );
    let mut counts = vec![0usize; best.run.metrics.n_clusters];
    for &label in &best.run.labels {
        counts[label] += 1;
    }
    for (label, count) in counts.iter().enumerate() {
        println!("  species {label}: {count} crop(s)");
    }

    if let Some(path) = output {
        write_summary_csv(&results, &path)?;
        println!("Experiment summary written to {}", path.display());
    }
    Ok(())
}

fn cmd_train(config: &Config, common: &CommonArgs, min_confidence: Option<f32>) -> Result<()> {
    let mut embedder = build_embedder(config)?;
    let store = JsonObjectStore::new(&config.paths.metadata_file);

    let min_confidence = min_confidence.unwrap_or(config.features.min_confidence);
    let features = {
        let mut pipeline = FeaturePipeline::new(&store, &mut embedder, config.features.batch_size);
        pipeline.extract_all_features(min_confidence, !common.quiet)?
    };

    let engine = ClusterEngine::fit(&features.embeddings)?;
    let experiment = ClusteringExperiment::new(config.clustering.clone(), config.scoring);
    let results = experiment.run_all(&engine);
    let best = experiment.best(&results)?;
    info!(
        "Training labels come from clustering '{}' ({} species)",
        best.name, best.run.metrics.n_clusters
    );

    let samples: Vec<(PathBuf, usize)> = features
        .metadata
        .iter()
        .zip(&best.run.labels)
        .map(|(record, &label)| (record.image_path.clone(), label))
        .collect();

    let mut trainer = Trainer::new(config.training.clone());
    trainer.prepare_data(&mut embedder, &samples)?;
    trainer.train_phase1()?;
    trainer.train_phase2()?;
    let report = trainer.evaluate()?;
    trainer.save(&config.paths.checkpoint_file)?;

    println!(
        "Training complete: {:.1}% accuracy over {} test sample(s)",
        report.accuracy * 100.0,
        report.n_test
    );
    for class in &report.per_class {
        println!(
            "  {}: precision {:.2}, recall {:.2} ({} sample(s))",
            class.name, class.precision, class.recall, class.support
        );
    }
    println!(
        "Mean confidence {:.3}; review cutoff {:.3}",
        report.mean_confidence, report.low_confidence_cutoff
    );
    println!("Model saved to {}", config.paths.checkpoint_file.display());
    Ok(())
}

fn cmd_review(config: &Config, all: bool, max_samples: Option<usize>) -> Result<()> {
    let mut config = config.clone();
    if all {
        config.active.force_manual_mode = true;
    }
    if let Some(n) = max_samples {
        config.active.max_samples = n;
    }

    let mut embedder = build_embedder(&config)?;
    let mut service = LearningService::new(config);
    let samples = service.get_uncertain_predictions(&mut embedder)?;

    if samples.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    println!("{} sample(s) to review:", samples.len());
    for sample in &samples {
        println!("\n{}", sample.image_path.display());
        for p in &sample.predictions {
            println!(
                "  {:>5.1}%  [{}] {}",
                p.confidence * 100.0,
                p.class_id,
                p.class_name
            );
        }
    }
    println!("\nRecord a correction with:");
    println!("  avilearn correct <image> --class-id <id> --class-name <name>");
    Ok(())
}

fn cmd_correct(config: &Config, image: &std::path::Path, class_id: usize, class_name: &str) -> Result<()> {
    let mut service = LearningService::new(config.clone());
    service.record_correction(image, class_id, class_name, None)?;
    println!(
        "Correction recorded: {} -> [{}] {}",
        image.display(),
        class_id,
        class_name
    );
    Ok(())
}

fn cmd_retrain(config: &Config) -> Result<()> {
    let mut embedder = build_embedder(config)?;
    let mut service = LearningService::new(config.clone());
    let summary = service.retrain_with_corrections(&mut embedder)?;

    println!(
        "Retrained on {} correction(s), {} dropped.",
        summary.used, summary.dropped
    );
    if summary.expanded {
        println!("Model expanded to {} classes.", summary.n_classes);
    }
    println!("Model saved to {}", config.paths.checkpoint_file.display());
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let mut service = LearningService::new(config.clone());
    let stats = service.stats()?;

    println!("Review log:");
    println!("  corrections recorded: {}", stats.total_corrections);
    println!("  images corrected:     {}", stats.corrected_images);
    println!("  images reviewed:      {}", stats.processed_images);
    println!("  classes corrected:    {}", stats.corrected_classes);
    match (stats.model_classes, stats.fine_tune_runs) {
        (Some(classes), runs) => {
            println!("Model:");
            println!("  classes:          {classes}");
            println!("  fine-tune passes: {}", runs.unwrap_or(0));
        }
        (None, _) => println!("Model: not trained yet (run 'avilearn train')"),
    }
    if let Some(t) = stats.last_updated {
        println!("Last review activity: {t}");
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
            } else {
                let config = Config::default();
                let saved_path = save_default_config(&config)?;
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!("  avilearn cluster --embed-model <model.onnx>");
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_default_config()?;
            println!("{config:#?}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}
