//! Supervised Training Implementation
//!
//! A custom Burn training loop rather than the high-level `LearnerBuilder`:
//! Adam with weight decay, cross-entropy on raw logits, per-epoch
//! validation on the inference copy of the model.

use std::path::PathBuf;

use burn::{
    backend::Autodiff,
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::Backend, ElementConversion},
};
use colored::Colorize;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{
    Augmenter, TomatoBatch, TomatoBatcher, TomatoBurnDataset, TomatoDataset, CLASS_NAMES,
    NUM_CLASSES,
};
use crate::model::{
    artifact::{next_version, save_artifact},
    ResNet, ResNetConfig, TrainingConfig,
};
use crate::utils::error::{Result, TomatoError};
use crate::utils::logging::TrainingLogger;

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub version: u32,
    pub artifact_dir: PathBuf,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub final_train_loss: f64,
    /// Best validation accuracy in percent, absent without a validation set
    pub best_validation_accuracy: Option<f64>,
    /// Epoch (1-based) whose weights were written
    pub best_epoch: usize,
}

/// Train a model on `Autodiff<B>` and write it as a new artifact version
pub fn run_training<B: Backend>(
    config: &TrainingConfig,
    model_config: &ResNetConfig,
    device: &B::Device,
) -> Result<TrainingSummary> {
    config.validate()?;
    model_config.validate()?;

    if model_config.num_classes != NUM_CLASSES {
        return Err(TomatoError::Config(format!(
            "model has {} outputs but the label set has {} classes",
            model_config.num_classes, NUM_CLASSES
        )));
    }
    if model_config.input_size != config.image_size {
        return Err(TomatoError::Config(format!(
            "image_size {} does not match the model input size {}",
            config.image_size, model_config.input_size
        )));
    }

    println!("{}", "Initializing Training...".green().bold());
    println!("  Device: {:?}", device);

    println!("{}", "Loading Dataset...".cyan());
    let mut dataset = TomatoDataset::new(&config.data_dir)?;
    if let Some(max) = config.max_samples {
        dataset.limit(max, config.seed);
    }
    dataset.get_stats().print();

    let (train_samples, val_samples) = dataset.split(config.validation_fraction, config.seed)?;
    if train_samples.is_empty() {
        return Err(TomatoError::Dataset("no training samples after split".to_string()));
    }

    println!();
    println!("{}", "Dataset Splits:".cyan().bold());
    println!("  Training samples:   {}", train_samples.len());
    println!("  Validation samples: {}", val_samples.len());

    let mut train_dataset = TomatoBurnDataset::new(&train_samples, config.image_size);
    if config.augmentation {
        train_dataset = train_dataset.with_augmenter(Augmenter::with_defaults(), config.seed);
    }

    println!("{}", "Pre-loading Validation Data...".cyan().bold());
    let val_dataset = TomatoBurnDataset::new_cached(&val_samples, config.image_size)?;

    let batcher = TomatoBatcher::new(config.image_size);

    let mut model: ResNet<Autodiff<B>> = model_config.init(device);
    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Epochs:        {}", config.epochs);
    println!("  Batch size:    {}", config.batch_size);
    println!("  Learning rate: {}", config.learning_rate);
    println!("  Weight decay:  {}", config.weight_decay);
    println!("  Augmentation:  {}", config.augmentation);
    println!();

    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut best: Option<(f64, usize, ResNet<B>)> = None;
    let mut final_train_loss = 0.0;

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);

        let mut epoch_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);
        let num_batches = indices.len().div_ceil(config.batch_size);

        for (batch_idx, chunk) in indices.chunks(config.batch_size).enumerate() {
            let items: Vec<_> = chunk.iter().filter_map(|&i| train_dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: TomatoBatch<Autodiff<B>> = batcher.batch(items, device);
            let batch_size = batch.targets.dims()[0];

            let logits = model.forward_logits(batch.images);
            let loss = loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss += loss_value;

            let predictions = logits.argmax(1).reshape([batch_size]);
            let batch_correct: i64 = predictions
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            seen += batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "Batch {:>4}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    100.0 * correct as f64 / seen.max(1) as f64
                );
            }
        }

        let avg_loss = epoch_loss / num_batches.max(1) as f64;
        let train_acc = 100.0 * correct as f64 / seen.max(1) as f64;
        final_train_loss = avg_loss;

        let inference_model = model.valid();
        let val_acc = evaluate(&inference_model, &val_dataset, &batcher, config.batch_size, device);
        logger.end_epoch(avg_loss, train_acc, val_acc);

        // Without a validation set the latest epoch wins
        let score = val_acc.unwrap_or(f64::NEG_INFINITY);
        let improved = match &best {
            None => true,
            Some((best_score, ..)) => val_acc.is_none() || score > *best_score,
        };
        if improved {
            if val_acc.is_some() {
                println!("  {} new best model", "→".cyan());
            }
            best = Some((score, epoch + 1, inference_model));
        }
    }

    let (best_score, best_epoch, best_model) = best.ok_or_else(|| {
        TomatoError::Training("training finished without producing a model".to_string())
    })?;
    let best_validation_accuracy = (!val_samples.is_empty()).then_some(best_score);
    logger.log_complete(best_validation_accuracy);

    let version = match config.version {
        Some(version) => version,
        None => next_version(&config.output_dir)?,
    };

    println!("{}", "Saving Model...".cyan());
    let artifact_dir = save_artifact(
        &best_model,
        model_config,
        &CLASS_NAMES,
        &config.output_dir,
        version,
        best_validation_accuracy,
    )?;
    config.save(&artifact_dir.join("training.json"))?;
    println!("  Saved to: {:?}", artifact_dir);

    info!(
        "Training complete: version {} from epoch {} written to {:?}",
        version, best_epoch, artifact_dir
    );

    Ok(TrainingSummary {
        version,
        artifact_dir,
        train_samples: train_samples.len(),
        validation_samples: val_samples.len(),
        final_train_loss,
        best_validation_accuracy,
        best_epoch,
    })
}

/// Accuracy in percent, or `None` for an empty dataset
pub fn evaluate<B: Backend>(
    model: &ResNet<B>,
    dataset: &TomatoBurnDataset,
    batcher: &TomatoBatcher,
    batch_size: usize,
    device: &B::Device,
) -> Option<f64> {
    let len = dataset.len();
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: TomatoBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];
        let predictions = model.forward_logits(batch.images).argmax(1).reshape([n]);

        let batch_correct: i64 = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem();

        correct += batch_correct as usize;
        total += n;
    }

    (total > 0).then(|| 100.0 * correct as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::artifact::load_artifact;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    type TestBackend = NdArray;

    fn tiny_model() -> ResNetConfig {
        ResNetConfig::new()
            .with_input_size(16)
            .with_stem_filters(4)
            .with_stage_widths(vec![4, 8])
            .with_stage_depths(vec![1, 1])
    }

    fn build_dataset(root: &Path) {
        for (label, class) in CLASS_NAMES.iter().enumerate().take(2) {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..4u8 {
                let shade = if label == 0 { 20 + i } else { 220 - i };
                RgbImage::from_pixel(20, 20, Rgb([shade, shade, shade]))
                    .save(dir.join(format!("{}.png", i)))
                    .unwrap();
            }
        }
    }

    fn training_config(data: &Path, out: &Path) -> TrainingConfig {
        TrainingConfig {
            data_dir: data.to_path_buf(),
            output_dir: out.to_path_buf(),
            epochs: 2,
            batch_size: 3,
            image_size: 16,
            validation_fraction: 0.25,
            ..Default::default()
        }
    }

    #[test]
    fn test_training_writes_loadable_artifact() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        build_dataset(data.path());

        let device = Default::default();
        let config = training_config(data.path(), out.path());
        let summary = run_training::<TestBackend>(&config, &tiny_model(), &device).unwrap();

        assert_eq!(summary.version, 1);
        assert_eq!(summary.train_samples, 6);
        assert_eq!(summary.validation_samples, 2);
        assert!(summary.final_train_loss.is_finite());
        let acc = summary.best_validation_accuracy.unwrap();
        assert!((0.0..=100.0).contains(&acc));
        assert!(summary.artifact_dir.join("training.json").exists());

        let loaded = load_artifact::<TestBackend>(out.path(), None, &device).unwrap();
        assert_eq!(loaded.manifest.num_classes, NUM_CLASSES);
        assert_eq!(loaded.manifest.validation_accuracy, Some(acc));

        // A second run writes the next version
        let summary = run_training::<TestBackend>(&config, &tiny_model(), &device).unwrap();
        assert_eq!(summary.version, 2);
    }

    #[test]
    fn test_mismatched_image_size_is_rejected() {
        let data = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            image_size: 32,
            ..training_config(data.path(), out.path())
        };

        let result = run_training::<TestBackend>(&config, &tiny_model(), &Default::default());
        assert!(matches!(result, Err(TomatoError::Config(_))));
    }

    #[test]
    fn test_evaluate_empty_dataset() {
        let device = Default::default();
        let model = tiny_model().init::<TestBackend>(&device);
        let dataset = TomatoBurnDataset::new(&[], 16);
        assert_eq!(
            evaluate(&model, &dataset, &TomatoBatcher::new(16), 4, &device),
            None
        );
    }
}
