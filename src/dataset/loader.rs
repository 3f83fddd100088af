//! Tomato Leaf Dataset Loader
//!
//! Scans a class-per-directory image tree and maps every directory onto the
//! fixed label set, then splits the samples for training and validation.

use std::path::{Path, PathBuf};

use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{class_index, CLASS_NAMES, NUM_CLASSES};
use crate::utils::error::{Result, TomatoError};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index (0-9)
    pub label: usize,
}

/// Tomato leaf dataset, images are loaded lazily
#[derive(Debug, Clone)]
pub struct TomatoDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples in the dataset
    pub samples: Vec<ImageSample>,
    /// Subdirectories that did not match a known class
    pub skipped_dirs: Vec<String>,
}

impl TomatoDataset {
    /// Scan a dataset directory
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── Tomato___Bacterial_spot/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// ├── Tomato___healthy/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading tomato dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(TomatoError::Dataset(format!(
                "dataset directory does not exist: {:?}",
                root_dir
            )));
        }

        let mut class_dirs: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_dirs.push(name.to_string());
                }
            }
        }
        class_dirs.sort();

        let mut samples = Vec::new();
        let mut skipped_dirs = Vec::new();

        for dir_name in class_dirs {
            let Some(label) = class_index(&dir_name) else {
                warn!("Skipping directory '{}': not a known class", dir_name);
                skipped_dirs.push(dir_name);
                continue;
            };

            let before = samples.len();
            let mut paths: Vec<PathBuf> = WalkDir::new(root_dir.join(&dir_name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|path| is_image_file(path))
                .collect();
            paths.sort();

            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
            debug!(
                "Class '{}' (label {}): {} samples",
                dir_name,
                label,
                samples.len() - before
            );
        }

        if samples.is_empty() {
            return Err(TomatoError::Dataset(format!(
                "no images found under {:?}",
                root_dir
            )));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            skipped_dirs,
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Keep a seeded random subset of at most `max_samples` images
    pub fn limit(&mut self, max_samples: usize, seed: u64) {
        if self.samples.len() <= max_samples {
            return;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.samples.shuffle(&mut rng);
        self.samples.truncate(max_samples);
        info!("Limited dataset to {} samples", max_samples);
    }

    /// Stratified train/validation split
    ///
    /// Every class contributes `round(n * validation_fraction)` images to
    /// validation, at least one when the class has two or more images.
    pub fn split(
        &self,
        validation_fraction: f64,
        seed: u64,
    ) -> Result<(Vec<ImageSample>, Vec<ImageSample>)> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(TomatoError::Config(format!(
                "validation fraction {} outside [0.0, 1.0)",
                validation_fraction
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train = Vec::new();
        let mut validation = Vec::new();

        for label in 0..NUM_CLASSES {
            let mut class_samples: Vec<ImageSample> = self
                .samples
                .iter()
                .filter(|s| s.label == label)
                .cloned()
                .collect();
            class_samples.shuffle(&mut rng);

            let n = class_samples.len();
            let mut n_val = (n as f64 * validation_fraction).round() as usize;
            if validation_fraction > 0.0 && n >= 2 {
                n_val = n_val.clamp(1, n - 1);
            } else {
                n_val = n_val.min(n.saturating_sub(1));
            }

            validation.extend(class_samples.drain(..n_val));
            train.extend(class_samples);
        }

        train.shuffle(&mut rng);

        info!(
            "Split dataset: {} training, {} validation",
            train.len(),
            validation.len()
        );

        Ok((train, validation))
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        DatasetStats::from_samples(&self.samples)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    pub fn from_samples(samples: &[ImageSample]) -> Self {
        let mut class_counts = vec![0usize; NUM_CLASSES];
        for sample in samples {
            if let Some(count) = class_counts.get_mut(sample.label) {
                *count += 1;
            }
        }

        Self {
            total_samples: samples.len(),
            class_counts,
        }
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("\n{}", "Dataset Statistics:".cyan().bold());
        println!("  Total samples: {}", self.total_samples);
        println!("\n  Samples per class:");

        for (idx, (name, count)) in CLASS_NAMES.iter().zip(&self.class_counts).enumerate() {
            let bar_len = if self.total_samples == 0 {
                0
            } else {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            };
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:48} {:5} {}", idx, name, count, bar.green());
        }
    }
}
