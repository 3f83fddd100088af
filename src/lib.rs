//! # Tomato Disease
//!
//! Tomato leaf disease classification with a ResNet-34 built on the Burn
//! framework, plus the pieces needed to train it and to serve it over HTTP.
//!
//! ## Modules
//!
//! - `model`: ResNet architecture, training configuration and the versioned artifact format
//! - `dataset`: Directory scanning, stratified splits, Burn batching and augmentation
//! - `training`: Supervised training loop
//! - `inference`: Image preprocessing and single-image prediction
//! - `utils`: Errors, logging and helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tomato_disease::inference::Predictor;
//! use tomato_disease::backend::{default_device, InferenceBackend};
//!
//! let predictor = Predictor::<InferenceBackend>::from_artifact(
//!     "saved_model".as_ref(),
//!     None,
//!     default_device(),
//! )?;
//! let prediction = predictor.predict_bytes(&bytes)?.to_prediction();
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{TomatoBatch, TomatoBatcher, TomatoBurnDataset, TomatoDataset, TomatoItem, CLASS_NAMES};
pub use inference::{Prediction, PredictionResult, Predictor};
pub use model::{ResNet, ResNetConfig, TrainingConfig};
pub use training::{run_training, TrainingSummary};
pub use utils::error::{Result, TomatoError};

/// Number of tomato leaf classes
pub const NUM_CLASSES: usize = dataset::NUM_CLASSES;

/// Default input resolution for training and `summary`
pub const IMAGE_SIZE: usize = 256;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
