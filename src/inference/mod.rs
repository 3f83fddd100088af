//! Inference module for model prediction
//!
//! This module provides:
//! - Decoding and resizing of uploaded images
//! - Single image prediction with top-k ranking

pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use predictor::{round_confidence, Prediction, PredictionResult, Predictor, TOP_K};
pub use preprocess::{decode_image, image_to_chw, preprocess_bytes, to_batch_tensor};
