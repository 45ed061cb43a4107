//! Configuration validation.

use crate::config::{Config, LinkageThresholds};
use crate::error::{Error, Result};
use tracing::warn;

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_features(config)?;
    validate_clustering(config)?;
    validate_scoring(config)?;
    validate_training(config)?;
    validate_active(config)?;
    Ok(())
}

fn validate_features(config: &Config) -> Result<()> {
    let features = &config.features;

    if !(0.0..=1.0).contains(&features.min_confidence) {
        return Err(Error::ConfigValidation {
            message: format!(
                "features.min_confidence must be between 0.0 and 1.0, got {}",
                features.min_confidence
            ),
        });
    }

    if features.batch_size == 0 {
        return Err(Error::ConfigValidation {
            message: "features.batch_size must be at least 1".to_string(),
        });
    }

    if features.input_size == 0 {
        return Err(Error::ConfigValidation {
            message: "features.input_size must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn validate_clustering(config: &Config) -> Result<()> {
    validate_thresholds("ward", &config.clustering.ward)?;
    validate_thresholds("average", &config.clustering.average)?;
    Ok(())
}

fn validate_thresholds(name: &str, thresholds: &LinkageThresholds) -> Result<()> {
    if thresholds.conservative <= 0.0 || thresholds.balanced <= 0.0 || thresholds.permissive <= 0.0
    {
        return Err(Error::ConfigValidation {
            message: format!("clustering.{name} thresholds must be positive"),
        });
    }

    if !(thresholds.conservative <= thresholds.balanced
        && thresholds.balanced <= thresholds.permissive)
    {
        warn!(
            "clustering.{} thresholds not in ascending order (conservative <= balanced <= permissive)",
            name
        );
    }

    Ok(())
}

fn validate_scoring(config: &Config) -> Result<()> {
    let scoring = &config.scoring;

    if scoring.min_species < 1 {
        return Err(Error::ConfigValidation {
            message: "scoring.min_species must be at least 1".to_string(),
        });
    }

    if scoring.max_species <= scoring.min_species {
        return Err(Error::ConfigValidation {
            message: format!(
                "scoring.max_species ({}) must be greater than min_species ({})",
                scoring.max_species, scoring.min_species
            ),
        });
    }

    if scoring.sweet_spot_min > scoring.sweet_spot_max {
        return Err(Error::ConfigValidation {
            message: "scoring.sweet_spot_min must not exceed sweet_spot_max".to_string(),
        });
    }

    Ok(())
}

fn validate_training(config: &Config) -> Result<()> {
    let training = &config.training;

    if training.batch_size == 0 {
        return Err(Error::ConfigValidation {
            message: "training.batch_size must be at least 1".to_string(),
        });
    }

    for (name, value) in [
        ("test_size", training.test_size),
        ("val_size", training.val_size),
    ] {
        if !(0.0..1.0).contains(&value) {
            return Err(Error::ConfigValidation {
                message: format!("training.{name} must be in [0.0, 1.0), got {value}"),
            });
        }
    }

    if training.test_size + training.val_size >= 1.0 {
        return Err(Error::ConfigValidation {
            message: "training.test_size + val_size must leave room for a train split".to_string(),
        });
    }

    if training.trunk_dim == 0 || training.hidden_dim == 0 {
        return Err(Error::ConfigValidation {
            message: "training.trunk_dim and hidden_dim must be at least 1".to_string(),
        });
    }

    Ok(())
}

fn validate_active(config: &Config) -> Result<()> {
    let active = &config.active;

    if !(0.0..=1.0).contains(&active.uncertainty_threshold) {
        return Err(Error::ConfigValidation {
            message: format!(
                "active.uncertainty_threshold must be between 0.0 and 1.0, got {}",
                active.uncertainty_threshold
            ),
        });
    }

    if active.max_samples == 0 {
        return Err(Error::ConfigValidation {
            message: "active.max_samples must be at least 1".to_string(),
        });
    }

    if active.top_k == 0 {
        return Err(Error::ConfigValidation {
            message: "active.top_k must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let mut config = Config::default();
        config.features.min_confidence = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = Config::default();
        config.clustering.ward.balanced = -1.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_species_range_rejected_when_inverted() {
        let mut config = Config::default();
        config.scoring.min_species = 8;
        config.scoring.max_species = 4;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_oversized_splits_rejected() {
        let mut config = Config::default();
        config.training.test_size = 0.6;
        config.training.val_size = 0.5;
        assert!(validate_config(&config).is_err());
    }
}
