use crate::config::{ImageConfig, PipelineConfig};
use crate::error::AppError;
use crate::models::diagnosis_types::{ModelStatus, PredictionResult, SupportedPlant};
use crate::services::classifier::catalog::{PlantCategoryIndex, TargetPlants};
use crate::services::classifier::diagnosis;
use crate::services::classifier::inference;
use crate::services::classifier::model_manager::{self, LoadedModel};
use crate::services::image_service;
use image::DynamicImage;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validated,
    Enhanced,
    Preprocessed,
    Inferred,
    Synthesized,
    Returned,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Enhanced => "enhanced",
            PipelineStage::Preprocessed => "preprocessed",
            PipelineStage::Inferred => "inferred",
            PipelineStage::Synthesized => "synthesized",
            PipelineStage::Returned => "returned",
        };
        write!(f, "{}", name)
    }
}

/// Request-scoped diagnosis over one shared, already loaded model.
pub struct PredictionService {
    model: LoadedModel,
    plants: TargetPlants,
    index: PlantCategoryIndex,
    image_config: ImageConfig,
    target_size: (u32, u32),
}

impl PredictionService {
    pub fn new(model: LoadedModel, plants: TargetPlants, image_config: ImageConfig) -> Self {
        let index = PlantCategoryIndex::build(&model.catalog, &plants);
        let target_size = model.target_size(image_config.default_target_size);
        for (plant, labels) in index.iter() {
            debug!("{}: {} classes", plant, labels.len());
        }
        info!(
            "Prediction service ready: {} classes, target size {}x{}",
            model.catalog.len(),
            target_size.0,
            target_size.1
        );
        Self {
            model,
            plants,
            index,
            image_config,
            target_size,
        }
    }

    /// Loads the model named by `config` and builds the service around it.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, AppError> {
        config.validate()?;
        let model = model_manager::load_model(&config.model)?;
        let plants = TargetPlants::new(config.model.target_plants.iter().cloned());
        Ok(Self::new(model, plants, config.image.clone()))
    }

    pub fn predict_disease(
        &self,
        image: &DynamicImage,
        caller_id: Option<&str>,
    ) -> Result<PredictionResult, AppError> {
        let started = Instant::now();
        let trace = |stage: PipelineStage| {
            debug!("stage {} after {:.2} ms", stage, started.elapsed().as_secs_f64() * 1000.0);
        };
        trace(PipelineStage::Received);

        let min_size = (self.image_config.min_width, self.image_config.min_height);
        if !image_service::validate_image(image, min_size) {
            return Err(AppError::InvalidImage(format!(
                "Image must be at least {}x{} and not a single flat colour (got {}x{})",
                min_size.0,
                min_size.1,
                image.width(),
                image.height()
            )));
        }
        trace(PipelineStage::Validated);

        let rgb = image_service::to_canonical_rgb(image);
        let enhanced = match image_service::enhance_image(
            &rgb,
            self.image_config.contrast_factor,
            self.image_config.sharpness_factor,
        ) {
            Ok(enhanced) => enhanced,
            Err(warning) => {
                warn!("Could not enhance image, using original: {}", warning);
                rgb
            }
        };
        trace(PipelineStage::Enhanced);

        let tensor = inference::rgb_to_tensor(&enhanced, self.target_size)?;
        trace(PipelineStage::Preprocessed);

        let scores = self.model.runtime.infer(tensor)?;
        trace(PipelineStage::Inferred);

        let mut result = diagnosis::synthesize(
            &scores,
            &self.model.catalog,
            &self.plants,
            image,
            self.model.runtime.model_type(),
        )?;
        trace(PipelineStage::Synthesized);

        result.caller_id = caller_id.map(str::to_string);
        info!(
            "Prediction completed: {} ({:.1}%)",
            result.predicted_label,
            result.confidence * 100.0
        );
        trace(PipelineStage::Returned);
        Ok(result)
    }

    /// Diagnoses many images in parallel; inference itself stays serialized.
    pub fn predict_batch(
        &self,
        images: &[DynamicImage],
        caller_id: Option<&str>,
    ) -> Vec<Result<PredictionResult, AppError>> {
        images
            .par_iter()
            .map(|image| self.predict_disease(image, caller_id))
            .collect()
    }

    pub async fn predict_disease_async(
        self: Arc<Self>,
        image: DynamicImage,
        caller_id: Option<String>,
    ) -> Result<PredictionResult, AppError> {
        tokio::task::spawn_blocking(move || self.predict_disease(&image, caller_id.as_deref()))
            .await
            .map_err(|e| AppError::Prediction(format!("Prediction task failed: {}", e)))?
    }

    /// Decodes an upload (raw bytes) and diagnoses it.
    pub fn predict_bytes(
        &self,
        bytes: &[u8],
        caller_id: Option<&str>,
    ) -> Result<PredictionResult, AppError> {
        let image = image_service::decode_image(bytes, self.image_config.max_upload_bytes)?;
        self.predict_disease(&image, caller_id)
    }

    /// Decodes a base64 or data-URL upload and diagnoses it.
    pub fn predict_base64(
        &self,
        data: &str,
        caller_id: Option<&str>,
    ) -> Result<PredictionResult, AppError> {
        let image = image_service::decode_base64_image(data, self.image_config.max_upload_bytes)?;
        self.predict_disease(&image, caller_id)
    }

    pub fn supported_plants(&self) -> Vec<SupportedPlant> {
        self.index.supported_plants()
    }

    pub fn model_status(&self) -> ModelStatus {
        self.model.status(self.image_config.default_target_size)
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }
}
