use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_MODEL_PATH: &str = "PLANT_DOCTOR_MODEL_PATH";
pub const ENV_CLASS_NAMES_PATH: &str = "PLANT_DOCTOR_CLASS_NAMES_PATH";
pub const ENV_ALLOW_FALLBACK_CATALOG: &str = "PLANT_DOCTOR_ALLOW_FALLBACK_CATALOG";

/// Default label order for the bundled Potato/Tomato/Pepper model.
pub const DEFAULT_CLASS_NAMES: [&str; 15] = [
    "Pepper_bell_Bacterial_spot",
    "Pepper_bell_healthy",
    "Potato_Early_blight",
    "Potato_Late_blight",
    "Potato_healthy",
    "Tomato_Bacterial_spot",
    "Tomato_Early_blight",
    "Tomato_Late_blight",
    "Tomato_Leaf_Mold",
    "Tomato_Septoria_leaf_spot",
    "Tomato_Spider_mites",
    "Tomato_Target_Spot",
    "Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato_mosaic_virus",
    "Tomato_healthy",
];

pub const DEFAULT_TARGET_PLANTS: [&str; 3] = ["Potato", "Tomato", "Pepper"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image: ImageConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub min_width: u32,
    pub min_height: u32,
    pub contrast_factor: f32,
    pub sharpness_factor: f32,
    /// Used only when the model input shape has dynamic spatial dims.
    pub default_target_size: (u32, u32),
    /// Upper bound on encoded upload size, checked before decoding.
    pub max_upload_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 100,
            contrast_factor: 1.2,
            sharpness_factor: 1.1,
            default_target_size: (224, 224),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    /// Opt-in: start with `fallback_class_names` when the label file is missing.
    pub allow_fallback_catalog: bool,
    pub fallback_class_names: Vec<String>,
    pub target_plants: Vec<String>,
    pub use_gpu: bool,
    pub intra_threads: usize,
    pub model_type: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/plant_disease_model.onnx"),
            class_names_path: Some(PathBuf::from("models/class_names.json")),
            allow_fallback_catalog: false,
            fallback_class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            target_plants: DEFAULT_TARGET_PLANTS.iter().map(|s| s.to_string()).collect(),
            use_gpu: false,
            intra_threads: 4,
            model_type: "onnx".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PLANT_DOCTOR_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, AppError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_MODEL_PATH) {
            debug!("{} overrides model path: {}", ENV_MODEL_PATH, path);
            self.model.model_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_CLASS_NAMES_PATH) {
            debug!("{} overrides class names path: {}", ENV_CLASS_NAMES_PATH, path);
            self.model.class_names_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_ALLOW_FALLBACK_CATALOG) {
            self.model.allow_fallback_catalog = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => {
                    return Err(AppError::Config(format!(
                        "{} must be a boolean, got '{}'",
                        ENV_ALLOW_FALLBACK_CATALOG, other
                    )))
                }
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let image = &self.image;
        if image.default_target_size.0 == 0 || image.default_target_size.1 == 0 {
            return Err(AppError::Config("default_target_size must be non-zero".into()));
        }
        if self.model.target_plants.is_empty() {
            return Err(AppError::Config("target_plants must not be empty".into()));
        }
        if self.model.intra_threads == 0 {
            return Err(AppError::Config("intra_threads must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_pipeline_contract() {
        let config = PipelineConfig::default();
        assert_eq!((config.image.min_width, config.image.min_height), (100, 100));
        assert_eq!(config.image.contrast_factor, 1.2);
        assert_eq!(config.image.sharpness_factor, 1.1);
        assert!(!config.model.allow_fallback_catalog);
        assert_eq!(config.model.target_plants, vec!["Potato", "Tomato", "Pepper"]);
        assert_eq!(config.model.fallback_class_names.len(), 15);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "image": {{ "min_width": 64 }}, "model": {{ "use_gpu": true }} }}"#).unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.image.min_width, 64);
        assert_eq!(config.image.min_height, 100);
        assert!(config.model.use_gpu);
        assert_eq!(config.model.intra_threads, 4);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = PipelineConfig::from_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn empty_target_plants_rejected() {
        let mut config = PipelineConfig::default();
        config.model.target_plants.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (ENV_MODEL_PATH, "/srv/model.onnx"),
            (ENV_ALLOW_FALLBACK_CATALOG, "true"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.model.model_path, PathBuf::from("/srv/model.onnx"));
        assert!(config.model.allow_fallback_catalog);
        assert_eq!(
            config.model.class_names_path,
            Some(PathBuf::from("models/class_names.json"))
        );
    }

    #[test]
    fn bad_boolean_override_rejected() {
        let result = PipelineConfig::default()
            .with_overrides_from(|k| (k == ENV_ALLOW_FALLBACK_CATALOG).then(|| "maybe".to_string()));
        assert!(result.is_err());
    }
}
