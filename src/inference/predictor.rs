//! Inference Predictor Module
//!
//! Runs a loaded ResNet on single images and maps the probability vector to
//! the tomato disease labels.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::tensor::{backend::Backend, Tensor};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::preprocess::{decode_image, image_to_chw, to_batch_tensor};
use crate::dataset::CLASS_NAMES;
use crate::model::{artifact::load_artifact, ResNet};
use crate::utils::error::{Result, TomatoError};

/// Number of ranked predictions kept in a [`PredictionResult`]
pub const TOP_K: usize = 3;

/// Round a probability to 4 decimal digits
pub fn round_confidence(probability: f32) -> f64 {
    ((probability as f64) * 10_000.0).round() / 10_000.0
}

/// The response shape of the prediction endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,

    /// Predicted class index
    pub predicted_class: usize,

    /// Predicted class name
    pub class_name: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Top-k predictions with their probabilities
    pub top_k: Vec<(usize, String, f32)>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Build a result from a probability vector (argmax + top-k)
    pub fn new(probabilities: Vec<f32>, class_names: &[String], inference_time: Duration) -> Self {
        let label = |idx: usize| {
            class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("Unknown_{}", idx))
        };

        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (predicted_class, confidence) = ranked.first().copied().unwrap_or((0, 0.0));

        let top_k = ranked
            .iter()
            .take(TOP_K)
            .map(|&(idx, prob)| (idx, label(idx), prob))
            .collect();

        Self {
            image_path: None,
            predicted_class,
            class_name: label(predicted_class),
            confidence,
            probabilities,
            top_k,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        }
    }

    /// The `{class, confidence}` pair returned to HTTP clients
    pub fn to_prediction(&self) -> Prediction {
        Prediction {
            class_name: self.class_name.clone(),
            confidence: round_confidence(self.confidence),
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }

        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.class_name, self.predicted_class
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str(&format!("\nTop-{} predictions:\n", self.top_k.len()));
        for (i, (idx, name, prob)) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                name,
                idx,
                prob * 100.0
            ));
        }

        output
    }
}

/// Predictor for running inference with a trained model
///
/// Use a non-autodiff backend: batch-norm then runs on its running
/// statistics.
#[derive(Debug, Clone)]
pub struct Predictor<B: Backend> {
    model: ResNet<B>,
    class_names: Vec<String>,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Wrap a model; the label list must match its output size
    pub fn new(model: ResNet<B>, class_names: Vec<String>, device: B::Device) -> Result<Self> {
        if class_names.len() != model.num_classes() {
            return Err(TomatoError::Config(format!(
                "{} class labels for a model with {} outputs",
                class_names.len(),
                model.num_classes()
            )));
        }

        Ok(Self {
            model,
            class_names,
            device,
        })
    }

    /// Load an artifact and pair it with the tomato label set
    pub fn from_artifact(root: &Path, version: Option<u32>, device: B::Device) -> Result<Self> {
        let artifact = load_artifact::<B>(root, version, &device)?;

        let labels: Vec<String> = CLASS_NAMES.iter().map(|s| s.to_string()).collect();
        if artifact.manifest.class_names != labels {
            tracing::warn!(
                "Artifact labels differ from the built-in label set; serving built-in labels"
            );
        }

        Self::new(artifact.model, labels, device)
    }

    /// Expected input resolution
    pub fn image_size(&self) -> usize {
        self.model.input_size()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Probability vector for a single-image batch
    pub fn probabilities(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        let output = self.model.forward(input);
        output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TomatoError::Inference(format!("failed to read probabilities: {:?}", e)))
    }

    /// Predict on a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionResult> {
        let size = self.image_size();
        let input = to_batch_tensor::<B>(image_to_chw(image, size), size, &self.device);

        let start = Instant::now();
        let probabilities = self.probabilities(input)?;
        let elapsed = start.elapsed();

        Ok(PredictionResult::new(probabilities, &self.class_names, elapsed))
    }

    /// Predict on raw uploaded bytes
    ///
    /// Undecodable bytes yield [`TomatoError::InvalidImage`].
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let image = decode_image(bytes)?;
        self.predict_image(&image)
    }

    /// Predict on an image from a file path
    pub fn predict_file(&self, path: &Path) -> Result<PredictionResult> {
        let image = image::open(path)
            .map_err(|e| TomatoError::ImageLoad(path.to_path_buf(), e.to_string()))?;
        let mut result = self.predict_image(&image)?;
        result.image_path = Some(path.to_path_buf());
        Ok(result)
    }
}
