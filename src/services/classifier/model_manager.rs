use crate::config::ModelConfig;
use crate::error::AppError;
use crate::models::diagnosis_types::ModelStatus;
use crate::services::classifier::catalog::ClassCatalog;
use crate::services::classifier::inference::{ImageTensor, TensorLayout, TensorShape};
use ort::session::Session;
use ort::value::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// A loaded classifier. Implementations are shared across requests, so any
/// state that cannot be used concurrently must be guarded internally.
pub trait ModelRuntime: Send + Sync {
    fn model_type(&self) -> &str;
    fn input_shape(&self) -> &TensorShape;
    fn output_shape(&self) -> &TensorShape;
    /// One forward pass; returns one score per class.
    fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, AppError>;
}

pub struct OnnxModel {
    session: Mutex<Session>,
    input_name: String,
    input_shape: TensorShape,
    output_shape: TensorShape,
    layout: TensorLayout,
    model_type: String,
}

impl OnnxModel {
    pub fn load(config: &ModelConfig) -> Result<Self, AppError> {
        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(AppError::ModelLoad(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        info!("Loading ONNX model from {}", model_path.display());
        if let Ok(meta) = std::fs::metadata(model_path) {
            debug!("Model file size: {:.2} MB", meta.len() as f64 / (1024.0 * 1024.0));
        }

        let _ = ort::init().with_name("plant-doctor").commit();

        let mut builder = Session::builder()
            .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set intra threads: {}", e)))?;

        if config.use_gpu {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::DirectMLExecutionProvider::default().build(),
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| {
                    AppError::ModelLoad(format!("Failed to register GPU execution providers: {}", e))
                })?;
        } else {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| {
                    AppError::ModelLoad(format!("Failed to register CPU execution provider: {}", e))
                })?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| AppError::ModelLoad(format!("Failed to load ONNX model: {}", e)))?;

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| AppError::ModelLoad("Model declares no inputs".to_string()))?;
        let input_name = input.name().to_string();
        let input_shape = input
            .dtype()
            .tensor_shape()
            .map(|shape| TensorShape::new(shape.to_vec()))
            .ok_or_else(|| AppError::ModelLoad("Model input is not a tensor".to_string()))?;

        let output_shape = session
            .outputs()
            .first()
            .and_then(|output| output.dtype().tensor_shape())
            .map(|shape| TensorShape::new(shape.to_vec()))
            .ok_or_else(|| AppError::ModelLoad("Model declares no tensor output".to_string()))?;

        let layout = input_shape.layout().ok_or_else(|| {
            AppError::ModelLoad(format!(
                "Unsupported input shape {:?}; expected an image tensor of rank 3 or 4",
                input_shape.dims()
            ))
        })?;

        info!(
            "Model input '{}' shape {:?} ({}), output shape {:?}",
            input_name,
            input_shape.dims(),
            layout,
            output_shape.dims()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            input_shape,
            output_shape,
            layout,
            model_type: config.model_type.clone(),
        })
    }
}

impl ModelRuntime for OnnxModel {
    fn model_type(&self) -> &str {
        &self.model_type
    }

    fn input_shape(&self) -> &TensorShape {
        &self.input_shape
    }

    fn output_shape(&self) -> &TensorShape {
        &self.output_shape
    }

    fn infer(&self, tensor: ImageTensor) -> Result<Vec<f32>, AppError> {
        let input = tensor.arrange(self.layout);
        let input_tensor = Value::from_array(input)
            .map_err(|e| AppError::Prediction(format!("Failed to create tensor value: {}", e)))?;

        // The session needs exclusive access for a run; this is the only
        // serialization point in the pipeline.
        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Prediction("Model lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| AppError::Prediction(format!("Inference failed: {}", e)))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| AppError::Prediction("Model produced no outputs".to_string()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Prediction(format!("Failed to extract output tensor: {}", e)))?;

        Ok(data.iter().copied().collect())
    }
}

/// Reads the label file. A missing file is fatal unless the fallback catalog
/// was explicitly enabled.
pub fn load_catalog(config: &ModelConfig) -> Result<ClassCatalog, AppError> {
    if let Some(path) = config.class_names_path.as_deref().filter(|p| p.exists()) {
        let catalog = ClassCatalog::from_json_file(path)?;
        info!("Loaded {} class names from {}", catalog.len(), path.display());
        return Ok(catalog);
    }

    let shown = config
        .class_names_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    if !config.allow_fallback_catalog {
        return Err(AppError::ModelLoad(format!(
            "Class names file {} not found and the fallback catalog is disabled",
            shown
        )));
    }

    error!(
        "Class names file {} not found; using the built-in {}-class catalog. \
         Labels are wrong if the model was trained with a different class order",
        shown,
        config.fallback_class_names.len()
    );
    ClassCatalog::new(config.fallback_class_names.clone())
}

/// A runtime paired with the catalog that names its outputs.
#[derive(Clone)]
pub struct LoadedModel {
    pub runtime: Arc<dyn ModelRuntime>,
    pub catalog: ClassCatalog,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model_type", &self.runtime.model_type())
            .field("input_shape", self.runtime.input_shape())
            .field("output_shape", self.runtime.output_shape())
            .field("num_classes", &self.catalog.len())
            .finish()
    }
}

impl LoadedModel {
    /// Refuses a catalog whose length contradicts a static output dimension.
    pub fn new(runtime: Arc<dyn ModelRuntime>, catalog: ClassCatalog) -> Result<Self, AppError> {
        if let Some(classes) = runtime.output_shape().num_classes() {
            if classes != catalog.len() {
                return Err(AppError::ModelLoad(format!(
                    "Model outputs {} classes but the catalog has {} labels",
                    classes,
                    catalog.len()
                )));
            }
        }
        Ok(Self { runtime, catalog })
    }

    /// Preprocessing size: the model's declared input size, else `fallback`.
    pub fn target_size(&self, fallback: (u32, u32)) -> (u32, u32) {
        self.runtime.input_shape().target_size().unwrap_or(fallback)
    }

    pub fn status(&self, fallback: (u32, u32)) -> ModelStatus {
        let input_shape = self.runtime.input_shape();
        ModelStatus {
            model_type: self.runtime.model_type().to_string(),
            input_shape: input_shape.dims().to_vec(),
            output_shape: self.runtime.output_shape().dims().to_vec(),
            layout: input_shape
                .layout()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            target_size: self.target_size(fallback),
            num_classes: self.catalog.len(),
        }
    }
}

/// Loads the label catalog and the ONNX session once at startup.
pub fn load_model(config: &ModelConfig) -> Result<LoadedModel, AppError> {
    let catalog = load_catalog(config)?;
    let runtime = OnnxModel::load(config)?;
    let loaded = LoadedModel::new(Arc::new(runtime), catalog)?;
    info!("Model ready: {:?}", loaded);
    Ok(loaded)
}

pub async fn load_model_async(config: ModelConfig) -> Result<LoadedModel, AppError> {
    tokio::task::spawn_blocking(move || load_model(&config))
        .await
        .map_err(|e| AppError::ModelLoad(format!("Failed to spawn model loading task: {}", e)))?
}
