use super::print_json;
use plant_doctor_lib::config::PipelineConfig;
use plant_doctor_lib::services::classifier::catalog::{PlantCategoryIndex, TargetPlants};
use plant_doctor_lib::services::classifier::model_manager;
use tracing::info;

/// Prints the per-plant disease summary. Needs only the label catalog.
pub fn plants(config: &PipelineConfig) -> anyhow::Result<()> {
    let catalog = model_manager::load_catalog(&config.model)?;
    let plants = TargetPlants::new(config.model.target_plants.iter().cloned());
    let summary = PlantCategoryIndex::build(&catalog, &plants).supported_plants();
    info!("{} labels across {} target plants", catalog.len(), summary.len());
    print_json(&summary)
}

pub fn inspect(config: &PipelineConfig) -> anyhow::Result<()> {
    let model = model_manager::load_model(&config.model)?;
    print_json(&model.status(config.image.default_target_size))
}
