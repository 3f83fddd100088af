//! Tomato Disease CLI
//!
//! Trains the ResNet classifier, runs one-off predictions against a saved
//! artifact and prints the network layout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::Module;
use burn::tensor::Tensor;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use tomato_disease::backend::{backend_name, default_device, DefaultBackend, InferenceBackend};
use tomato_disease::dataset::TomatoDataset;
use tomato_disease::inference::Predictor;
use tomato_disease::model::{ResNetConfig, TrainingConfig, QUICK_MAX_SAMPLES};
use tomato_disease::training::run_training;
use tomato_disease::utils::logging::{init_logging, LogConfig, LogLevel};
use tomato_disease::IMAGE_SIZE;

/// Tomato leaf disease classification with Burn
#[derive(Parser, Debug)]
#[command(name = "tomato_disease")]
#[command(version)]
#[command(about = "Tomato leaf disease classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging (debug level, module paths and thread ids)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, value_parser = LogLevel::parse, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the model and write a new artifact version
    Train {
        /// Path to the dataset directory (one subdirectory per class)
        #[arg(short, long, default_value = "data/tomato")]
        data_dir: PathBuf,

        /// Artifact root directory
        #[arg(short, long, default_value = "saved_model")]
        output_dir: PathBuf,

        /// Version to write (defaults to the next free number)
        #[arg(long)]
        version: Option<u32>,

        /// Number of training epochs
        #[arg(short, long, default_value = "10")]
        epochs: usize,

        /// Batch size for training
        #[arg(short, long, default_value = "32")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Fraction of every class held out for validation
        #[arg(long, default_value = "0.1")]
        validation_fraction: f64,

        /// Disable random flip, rotation and contrast
        #[arg(long, default_value = "false")]
        no_augmentation: bool,

        /// Quick test mode, capped at 500 samples
        #[arg(long, default_value = "false")]
        quick: bool,

        /// Load hyperparameters from a JSON file instead of flags
        #[arg(long)]
        config: Option<PathBuf>,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Classify a single image with a saved artifact
    Infer {
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,

        /// Artifact root directory
        #[arg(short, long, default_value = "saved_model")]
        model_dir: PathBuf,

        /// Artifact version (defaults to the highest)
        #[arg(long)]
        model_version: Option<u32>,
    },

    /// Print the network layout and parameter count
    Summary {
        /// Input image size (square)
        #[arg(long, default_value_t = IMAGE_SIZE)]
        image_size: usize,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/tomato")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::cli().from_flags(cli.log_level, cli.verbose);
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Train {
            data_dir,
            output_dir,
            version,
            epochs,
            batch_size,
            learning_rate,
            validation_fraction,
            no_augmentation,
            quick,
            config,
            seed,
        } => {
            let config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("Failed to read training config {:?}", path))?,
                None => TrainingConfig {
                    data_dir,
                    output_dir,
                    version,
                    epochs,
                    batch_size,
                    learning_rate,
                    validation_fraction,
                    augmentation: !no_augmentation,
                    max_samples: quick.then_some(QUICK_MAX_SAMPLES),
                    seed,
                    ..Default::default()
                },
            };
            cmd_train(&config)?;
        }

        Commands::Infer {
            image,
            model_dir,
            model_version,
        } => {
            cmd_infer(&image, &model_dir, model_version)?;
        }

        Commands::Summary { image_size } => {
            cmd_summary(image_size)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Training on {} backend", backend_name());

    if let Some(notice) = config.sample_limit_notice() {
        println!("{}", notice.yellow().bold());
    }

    let model_config = ResNetConfig::new().with_input_size(config.image_size);
    let summary = run_training::<DefaultBackend>(config, &model_config, &default_device())?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    if let Some(acc) = summary.best_validation_accuracy {
        println!("  Best validation accuracy: {:.2}% (epoch {})", acc, summary.best_epoch);
    }
    println!("  Artifact: {:?}", summary.artifact_dir);
    println!();
    println!("{}", "Next steps:".cyan().bold());
    println!(
        "  • Run inference: tomato_disease infer --model-dir {:?} --image <image>",
        config.output_dir
    );
    println!(
        "  • Serve: tomato_server --model-dir {:?} --model-version {}",
        config.output_dir, summary.version
    );

    Ok(())
}

fn cmd_infer(image: &Path, model_dir: &Path, version: Option<u32>) -> Result<()> {
    info!("Running inference on {:?}", image);

    let predictor =
        Predictor::<InferenceBackend>::from_artifact(model_dir, version, default_device())
            .with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    let result = predictor.predict_file(image)?;

    println!("{}", "Prediction:".green().bold());
    print!("{}", result.display());
    println!();
    println!("{}", serde_json::to_string(&result.to_prediction())?);

    Ok(())
}

fn cmd_summary(image_size: usize) -> Result<()> {
    let config = ResNetConfig::new().with_input_size(image_size);
    config.validate()?;

    let device = default_device();
    let model = config.init::<InferenceBackend>(&device);
    let input = Tensor::<InferenceBackend, 4>::zeros([1, 3, image_size, image_size], &device);

    println!("{}", "ResNet Summary".cyan().bold());
    println!("  Input:       [1, 3, {}, {}]", image_size, image_size);

    let shapes = model.stage_shapes(input);
    if let Some(stem) = shapes.first() {
        println!("  Stem + pool: {:?}", stem);
    }
    for (i, shape) in shapes.iter().skip(1).enumerate() {
        println!(
            "  Stage {} ({} blocks): {:?}",
            i + 1,
            config.stage_depths[i],
            shape
        );
    }
    let pooled = config.feature_map_size();
    println!("  Global pool: {}x{} -> 1x1", pooled, pooled);
    println!("  Head:        [1, {}] (softmax)", config.num_classes);
    println!("  Parameters:  {}", model.num_params());

    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    let dataset = TomatoDataset::new(data_dir)?;
    dataset.get_stats().print();

    if !dataset.skipped_dirs.is_empty() {
        println!();
        println!(
            "{} ignored directories: {}",
            "Note:".yellow(),
            dataset.skipped_dirs.join(", ")
        );
    }

    Ok(())
}
