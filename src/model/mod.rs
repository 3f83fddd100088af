//! Model module for the residual network using the Burn framework
//!
//! This module provides:
//! - The ResNet architecture and its configuration
//! - Training hyperparameters
//! - The versioned on-disk artifact format

pub mod artifact;
pub mod config;
pub mod resnet;

// Re-export main types for convenience
pub use artifact::{load_artifact, save_artifact, ArtifactManifest, LoadedArtifact};
pub use config::{TrainingConfig, QUICK_MAX_SAMPLES};
pub use resnet::{ResNet, ResNetConfig, ResidualBlock};
