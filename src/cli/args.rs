//! CLI argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Incremental bird species classification with human-in-the-loop review.
#[derive(Debug, Parser)]
#[command(name = "avilearn")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by all subcommands.
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Options shared by all subcommands.
///
/// Marked global so they are accepted before or after the subcommand.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Path to the ONNX embedding model (overrides config).
    #[arg(long, env = "AVILEARN_EMBED_MODEL", global = true)]
    pub embed_model: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: full trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover species groups among unlabeled crops.
    Cluster {
        /// Minimum detector confidence (0.0-1.0).
        #[arg(short = 'c', long, value_parser = parse_confidence)]
        min_confidence: Option<f32>,

        /// Write an experiment summary CSV to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print dendrogram threshold suggestions instead of clustering.
        #[arg(long)]
        suggest_thresholds: bool,
    },
    /// Train the species classifier from the best clustering.
    Train {
        /// Minimum detector confidence (0.0-1.0).
        #[arg(short = 'c', long, value_parser = parse_confidence)]
        min_confidence: Option<f32>,
    },
    /// Show the model's least confident predictions for review.
    Review {
        /// Surface every unreviewed crop regardless of confidence.
        #[arg(long)]
        all: bool,

        /// Maximum samples to show.
        #[arg(short = 'n', long)]
        max_samples: Option<usize>,
    },
    /// Record a correction for one crop image.
    Correct {
        /// Crop image path.
        image: PathBuf,

        /// Corrected class id.
        #[arg(long)]
        class_id: usize,

        /// Corrected class name.
        #[arg(long)]
        class_name: String,
    },
    /// Fine-tune the model on recorded corrections.
    Retrain,
    /// Show review and model statistics.
    Stats,
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Parse and validate confidence value.
fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "confidence must be between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}
