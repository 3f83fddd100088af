//! Training module
//!
//! Supervised training of the ResNet classifier on a labelled image tree,
//! ending in a versioned model artifact.

pub mod supervised;

pub use supervised::{evaluate, run_training, TrainingSummary};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
