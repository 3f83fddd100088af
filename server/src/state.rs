//! Application state for the inference server
//!
//! Holds the model loaded at startup. It is read-only afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use tomato_disease::backend::InferenceBackend;
use tomato_disease::inference::Predictor;

/// Largest accepted upload
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Artifact root containing numbered versions
    pub model_dir: PathBuf,
    /// Version to serve, the highest one when unset
    pub model_version: Option<u32>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_dir: PathBuf::from("saved_model"),
            model_version: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    predictor: Mutex<Predictor<InferenceBackend>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig, predictor: Predictor<InferenceBackend>) -> Self {
        Self {
            config,
            predictor: Mutex::new(predictor),
        }
    }

    /// A handle to the model for one request
    ///
    /// Cloning shares the weight tensors, so the forward pass can run on a
    /// blocking thread without holding the lock.
    pub async fn predictor(&self) -> Predictor<InferenceBackend> {
        self.predictor.lock().await.clone()
    }
}
