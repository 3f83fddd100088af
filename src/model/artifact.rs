//! Serialized Model Artifact
//!
//! An artifact is a versioned directory:
//!
//! ```text
//! saved_model/
//! ├── 1/
//! └── 2/
//!     ├── manifest.json   (entry point, class list, format version)
//!     ├── config.json     (ResNetConfig)
//!     └── model.mpk.gz    (Burn CompactRecorder weights)
//! ```
//!
//! Artifacts are written once by training and loaded once at service startup.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{config::Config, module::Module, record::CompactRecorder, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::resnet::{ResNet, ResNetConfig};
use crate::utils::error::{Result, TomatoError};

/// Entry point name a serving artifact must declare
pub const SERVING_ENTRY_POINT: &str = "serving_default";

/// On-disk layout version written by this crate
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "model";

/// Metadata stored next to the weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub entry_point: String,
    pub version: u32,
    pub architecture: String,
    pub num_classes: usize,
    pub input_size: usize,
    pub class_names: Vec<String>,
    pub created_at: String,
    /// Best validation accuracy (percent) reached during training
    pub validation_accuracy: Option<f64>,
}

/// A model restored from disk together with its metadata
#[derive(Debug)]
pub struct LoadedArtifact<B: Backend> {
    pub model: ResNet<B>,
    pub config: ResNetConfig,
    pub manifest: ArtifactManifest,
    pub path: PathBuf,
}

/// Directory of one artifact version
pub fn version_dir(root: &Path, version: u32) -> PathBuf {
    root.join(version.to_string())
}

/// Numeric version directories under `root`, sorted ascending
pub fn list_versions(root: &Path) -> Result<Vec<u32>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut versions = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(version) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        {
            versions.push(version);
        }
    }

    versions.sort_unstable();
    Ok(versions)
}

/// Pick the requested version, or the highest one present
pub fn resolve_version(root: &Path, requested: Option<u32>) -> Result<u32> {
    match requested {
        Some(version) => {
            let dir = version_dir(root, version);
            if dir.is_dir() {
                Ok(version)
            } else {
                Err(TomatoError::Artifact(format!(
                    "model version {} not found at {:?}",
                    version, dir
                )))
            }
        }
        None => list_versions(root)?.last().copied().ok_or_else(|| {
            TomatoError::Artifact(format!("no model versions found under {:?}", root))
        }),
    }
}

/// Version number the next training run should write
pub fn next_version(root: &Path) -> Result<u32> {
    Ok(list_versions(root)?.last().map_or(1, |v| v + 1))
}

/// Write weights, config and manifest into `<root>/<version>/`
pub fn save_artifact<B: Backend>(
    model: &ResNet<B>,
    config: &ResNetConfig,
    class_names: &[&str],
    root: &Path,
    version: u32,
    validation_accuracy: Option<f64>,
) -> Result<PathBuf> {
    if class_names.len() != config.num_classes {
        return Err(TomatoError::Artifact(format!(
            "{} class names given for a model with {} outputs",
            class_names.len(),
            config.num_classes
        )));
    }

    let dir = version_dir(root, version);
    fs::create_dir_all(&dir)?;

    config.save(dir.join(CONFIG_FILE))?;

    model
        .clone()
        .save_file(dir.join(WEIGHTS_FILE), &CompactRecorder::new())
        .map_err(|e| TomatoError::Artifact(format!("failed to save weights: {:?}", e)))?;

    let manifest = ArtifactManifest {
        format_version: ARTIFACT_FORMAT_VERSION,
        entry_point: SERVING_ENTRY_POINT.to_string(),
        version,
        architecture: format!("resnet-{}", architecture_depth(config)),
        num_classes: config.num_classes,
        input_size: config.input_size,
        class_names: class_names.iter().map(|s| s.to_string()).collect(),
        created_at: chrono::Utc::now().to_rfc3339(),
        validation_accuracy,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

    info!("Saved model artifact version {} to {:?}", version, dir);
    Ok(dir)
}

/// Read only the manifest of an artifact version
pub fn read_manifest(dir: &Path) -> Result<ArtifactManifest> {
    let path = dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&path)
        .map_err(|e| TomatoError::Artifact(format!("cannot read {:?}: {}", path, e)))?;
    Ok(serde_json::from_str(&json)?)
}

/// Restore a model from `<root>/<version>/`
///
/// Rejects artifacts with a different entry point or format version, and
/// artifacts whose manifest disagrees with the stored config.
pub fn load_artifact<B: Backend>(
    root: &Path,
    requested_version: Option<u32>,
    device: &B::Device,
) -> Result<LoadedArtifact<B>> {
    let version = resolve_version(root, requested_version)?;
    let dir = version_dir(root, version);
    debug!("Loading model artifact from {:?}", dir);

    let manifest = read_manifest(&dir)?;

    if manifest.entry_point != SERVING_ENTRY_POINT {
        return Err(TomatoError::Artifact(format!(
            "unexpected entry point '{}', expected '{}'",
            manifest.entry_point, SERVING_ENTRY_POINT
        )));
    }

    if manifest.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(TomatoError::Artifact(format!(
            "unsupported artifact format version {}",
            manifest.format_version
        )));
    }

    let config = ResNetConfig::load(dir.join(CONFIG_FILE))
        .map_err(|e| TomatoError::Artifact(format!("invalid model config: {}", e)))?;
    config.validate()?;

    if manifest.num_classes != config.num_classes
        || manifest.class_names.len() != config.num_classes
    {
        return Err(TomatoError::Artifact(format!(
            "manifest lists {} classes ({} names) but the model has {} outputs",
            manifest.num_classes,
            manifest.class_names.len(),
            config.num_classes
        )));
    }

    let model = config
        .init::<B>(device)
        .load_file(dir.join(WEIGHTS_FILE), &CompactRecorder::new(), device)
        .map_err(|e| TomatoError::Artifact(format!("failed to load weights: {:?}", e)))?;

    info!(
        "Loaded {} v{} ({} classes, {}x{} input)",
        manifest.architecture, version, manifest.num_classes, config.input_size, config.input_size
    );

    Ok(LoadedArtifact {
        model,
        config,
        manifest,
        path: dir,
    })
}

/// Number of weighted layers: stem + two per block + head
fn architecture_depth(config: &ResNetConfig) -> usize {
    2 + 2 * config.stage_depths.iter().sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    const LABELS: [&str; 3] = ["a", "b", "c"];

    fn tiny_config() -> ResNetConfig {
        ResNetConfig::new()
            .with_num_classes(3)
            .with_input_size(16)
            .with_stem_filters(4)
            .with_stage_widths(vec![4, 8])
            .with_stage_depths(vec![1, 1])
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let path = save_artifact(&model, &config, &LABELS, dir.path(), 2, Some(91.5)).unwrap();
        assert!(path.join("manifest.json").exists());
        assert!(path.join("config.json").exists());

        let loaded = load_artifact::<TestBackend>(dir.path(), None, &device).unwrap();
        assert_eq!(loaded.manifest.version, 2);
        assert_eq!(loaded.manifest.entry_point, SERVING_ENTRY_POINT);
        assert_eq!(loaded.manifest.class_names, vec!["a", "b", "c"]);
        assert_eq!(loaded.config.stage_widths, vec![4, 8]);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 16, 16],
            Distribution::Uniform(0.0, 255.0),
            &device,
        );
        let expected: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.model.forward(input).into_data().to_vec().unwrap();

        // CompactRecorder stores half precision weights
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-2, "expected {}, got {}", e, a);
        }
    }

    #[test]
    fn test_resolve_version_picks_highest() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1", "3", "2", "notes"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("7"), b"not a directory").unwrap();

        assert_eq!(list_versions(dir.path()).unwrap(), vec![1, 2, 3]);
        assert_eq!(resolve_version(dir.path(), None).unwrap(), 3);
        assert_eq!(resolve_version(dir.path(), Some(2)).unwrap(), 2);
        assert!(resolve_version(dir.path(), Some(5)).is_err());
        assert_eq!(next_version(dir.path()).unwrap(), 4);
    }

    #[test]
    fn test_empty_root_has_no_version() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_version(dir.path(), None).is_err());
        assert_eq!(next_version(&dir.path().join("missing")).unwrap(), 1);
    }

    /// Save a tiny artifact as version 1, then edit its manifest on disk
    fn save_with_manifest(root: &Path, edit: impl FnOnce(&mut ArtifactManifest)) {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);
        let path = save_artifact(&model, &config, &LABELS, root, 1, None).unwrap();

        let mut manifest = read_manifest(&path).unwrap();
        edit(&mut manifest);
        fs::write(
            path.join("manifest.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_wrong_entry_point_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        save_with_manifest(dir.path(), |m| m.entry_point = "predict".to_string());

        let device = Default::default();
        let err = load_artifact::<TestBackend>(dir.path(), Some(1), &device).unwrap_err();
        assert!(err.to_string().contains("entry point"));
    }

    #[test]
    fn test_unsupported_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        save_with_manifest(dir.path(), |m| m.format_version = ARTIFACT_FORMAT_VERSION + 1);

        let device = Default::default();
        let err = load_artifact::<TestBackend>(dir.path(), Some(1), &device).unwrap_err();
        assert!(matches!(err, TomatoError::Artifact(_)));
        assert!(err.to_string().contains("format version 2"));
    }

    #[test]
    fn test_manifest_class_count_must_match_config() {
        let dir = tempfile::tempdir().unwrap();
        save_with_manifest(dir.path(), |m| m.num_classes = 4);

        let device = Default::default();
        let err = load_artifact::<TestBackend>(dir.path(), Some(1), &device).unwrap_err();
        assert!(matches!(err, TomatoError::Artifact(_)));
        assert!(err.to_string().contains("4 classes"));
    }

    #[test]
    fn test_manifest_label_list_must_match_config() {
        let dir = tempfile::tempdir().unwrap();
        save_with_manifest(dir.path(), |m| m.class_names.push("d".to_string()));

        let device = Default::default();
        let err = load_artifact::<TestBackend>(dir.path(), Some(1), &device).unwrap_err();
        assert!(matches!(err, TomatoError::Artifact(_)));
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let result = save_artifact(&model, &config, &["only", "two"], dir.path(), 1, None);
        assert!(matches!(result, Err(TomatoError::Artifact(_))));
    }

    #[test]
    fn test_architecture_name() {
        assert_eq!(architecture_depth(&ResNetConfig::new()), 34);
    }
}
