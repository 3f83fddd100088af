//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` and `Batcher` traits for the tomato images.
//! Items carry unscaled `[0, 255]` pixels, the network rescales them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::augmentation::Augmenter;
use super::loader::ImageSample;
use crate::inference::preprocess::image_to_chw;
use crate::utils::error::{Result, TomatoError};

/// A single image ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TomatoItem {
    /// Image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label (0-9)
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl TomatoItem {
    /// Load, resize and flatten an image file
    pub fn from_path(path: &Path, label: usize, image_size: usize) -> Result<Self> {
        let img = load_resized(path, image_size)?;
        Ok(Self::from_image(&img, label, path, image_size))
    }

    fn from_image(img: &DynamicImage, label: usize, path: &Path, image_size: usize) -> Self {
        Self {
            image: image_to_chw(img, image_size),
            label,
            path: path.to_string_lossy().to_string(),
        }
    }
}

fn load_resized(path: &Path, image_size: usize) -> Result<DynamicImage> {
    let img = image::open(path)
        .map_err(|e| TomatoError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    Ok(img.resize_exact(image_size as u32, image_size as u32, FilterType::CatmullRom))
}

/// Tomato dataset implementing Burn's Dataset trait
///
/// Images are loaded lazily unless the dataset was built with
/// [`TomatoBurnDataset::new_cached`]. With an augmenter attached, every
/// `get` draws a fresh random variant.
#[derive(Debug, Clone)]
pub struct TomatoBurnDataset {
    samples: Vec<(PathBuf, usize)>,
    image_size: usize,
    cached_images: Option<Vec<DynamicImage>>,
    augmenter: Option<Augmenter>,
    seed: u64,
    draws: Arc<AtomicU64>,
}

impl TomatoBurnDataset {
    /// Create a lazily loading dataset
    pub fn new(samples: &[ImageSample], image_size: usize) -> Self {
        Self {
            samples: samples.iter().map(|s| (s.path.clone(), s.label)).collect(),
            image_size,
            cached_images: None,
            augmenter: None,
            seed: 0,
            draws: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a dataset with every resized image held in memory
    pub fn new_cached(samples: &[ImageSample], image_size: usize) -> Result<Self> {
        let mut dataset = Self::new(samples, image_size);
        let images = dataset
            .samples
            .iter()
            .map(|(path, _)| load_resized(path, image_size))
            .collect::<Result<Vec<_>>>()?;
        info!("Cached {} images at {}x{}", images.len(), image_size, image_size);
        dataset.cached_images = Some(images);
        Ok(dataset)
    }

    /// Attach a training augmenter seeded for reproducibility
    pub fn with_augmenter(mut self, augmenter: Augmenter, seed: u64) -> Self {
        self.augmenter = Some(augmenter);
        self.seed = seed;
        self
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    fn load(&self, index: usize) -> Option<DynamicImage> {
        if let Some(cached) = &self.cached_images {
            return cached.get(index).cloned();
        }

        let (path, _) = self.samples.get(index)?;
        match load_resized(path, self.image_size) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }
}

impl Dataset<TomatoItem> for TomatoBurnDataset {
    fn get(&self, index: usize) -> Option<TomatoItem> {
        let (path, label) = self.samples.get(index)?;
        let mut img = self.load(index)?;

        if let Some(augmenter) = &self.augmenter {
            let draw = self.draws.fetch_add(1, Ordering::Relaxed);
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(draw));
            img = augmenter.augment(img, &mut rng);
        }

        Some(TomatoItem::from_image(&img, *label, path, self.image_size))
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images for training
#[derive(Clone, Debug)]
pub struct TomatoBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches
#[derive(Clone, Debug)]
pub struct TomatoBatcher {
    image_size: usize,
}

impl TomatoBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, TomatoItem, TomatoBatch<B>> for TomatoBatcher {
    fn batch(&self, items: Vec<TomatoItem>, device: &B::Device) -> TomatoBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        TomatoBatch { images, targets }
    }
}
