//! Dataset module for tomato leaf images
//!
//! This module provides functionality for:
//! - Scanning a class-per-directory image tree
//! - Stratified train/validation splitting
//! - Burn `Dataset` and `Batcher` integration
//! - Training-time augmentation

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{TomatoBatch, TomatoBatcher, TomatoBurnDataset, TomatoItem};
pub use loader::{DatasetStats, ImageSample, TomatoDataset};

/// Number of disease classes the classifier distinguishes
pub const NUM_CLASSES: usize = 10;

/// Class labels in model output order
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// Get the label index for a given class name
pub fn class_index(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_index() {
        assert_eq!(class_index("Tomato___Late_blight"), Some(2));
        assert_eq!(
            class_index("Tomato___Spider_mites Two-spotted_spider_mite"),
            Some(5)
        );
        assert_eq!(class_index("Apple___Apple_scab"), None);
    }
}
