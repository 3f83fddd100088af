//! Training Configuration
//!
//! Hyperparameters and paths for producing a model artifact. The defaults
//! reproduce the configuration the published artifact was trained with.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TomatoError};

/// Sample cap applied by `train --quick`
pub const QUICK_MAX_SAMPLES: usize = 500;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Dataset root (`<data_dir>/<class_name>/*.jpg`)
    pub data_dir: PathBuf,

    /// Artifact root; each run writes a new numbered version below it
    pub output_dir: PathBuf,

    /// Explicit version to write (defaults to the next free number)
    pub version: Option<u32>,

    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training
    pub batch_size: usize,

    /// Learning rate
    pub learning_rate: f64,

    /// Weight decay (L2 regularization)
    pub weight_decay: f64,

    /// Fraction of every class held out for validation
    pub validation_fraction: f64,

    /// Input image size (square)
    pub image_size: usize,

    /// Apply random flip, rotation and contrast to training images
    pub augmentation: bool,

    /// Use at most this many images (quick runs)
    pub max_samples: Option<usize>,

    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/tomato"),
            output_dir: PathBuf::from("saved_model"),
            version: None,
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            weight_decay: 1e-4,
            validation_fraction: 0.1,
            image_size: crate::IMAGE_SIZE,
            augmentation: true,
            max_samples: None,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TomatoError::Config("epochs must be greater than 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(TomatoError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.learning_rate <= 0.0 {
            return Err(TomatoError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(TomatoError::Config(
                "validation_fraction must be in range [0.0, 1.0)".to_string(),
            ));
        }

        Ok(())
    }

    /// Banner for runs capped by `max_samples`
    pub fn sample_limit_notice(&self) -> Option<String> {
        self.max_samples.map(|max| format!("Quick test mode: using only {} samples", max))
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.image_size, 256);
        // Training and the network agree on the default resolution
        assert_eq!(
            config.image_size,
            crate::model::ResNetConfig::new().input_size
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sample_limit_notice_reports_configured_cap() {
        assert!(TrainingConfig::default().sample_limit_notice().is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        TrainingConfig {
            max_samples: Some(120),
            ..Default::default()
        }
        .save(&path)
        .unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(
            loaded.sample_limit_notice().as_deref(),
            Some("Quick test mode: using only 120 samples")
        );
    }

    #[test]
    fn test_training_config_validation() {
        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            validation_fraction: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_training_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.json");

        let config = TrainingConfig {
            epochs: 3,
            version: Some(7),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 3);
        assert_eq!(loaded.version, Some(7));
    }
}
