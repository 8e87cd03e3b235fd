use crate::error::AppError;
use crate::models::diagnosis_types::{
    PredictionMetadata, PredictionResult, TopPrediction, UNKNOWN_PLANT,
};
use crate::services::classifier::catalog::{plant_matches, ClassCatalog, TargetPlants};
use crate::services::image_service;
use image::DynamicImage;

pub const TOP_K: usize = 3;

/// Turns raw class scores into a diagnosis.
///
/// Ties are broken toward the lower class index, both for the top class and
/// within the top-k list. `original` is the image as submitted; statistics are
/// computed from it rather than from the enhanced or resized copy.
pub fn synthesize(
    scores: &[f32],
    catalog: &ClassCatalog,
    plants: &TargetPlants,
    original: &DynamicImage,
    model_type: &str,
) -> Result<PredictionResult, AppError> {
    if scores.is_empty() {
        return Err(AppError::Prediction("Model returned an empty score vector".to_string()));
    }
    if scores.len() != catalog.len() {
        return Err(AppError::Prediction(format!(
            "Model returned {} scores for a catalog of {} labels",
            scores.len(),
            catalog.len()
        )));
    }
    if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
        return Err(AppError::Prediction(format!(
            "Model returned a non-finite score at index {}",
            idx
        )));
    }

    let ranked = rank(scores);
    let (predicted_index, confidence) = ranked[0];
    let predicted_label = label_at(catalog, predicted_index)?;

    let raw_top: Vec<TopPrediction> = ranked
        .iter()
        .take(TOP_K)
        .map(|&(idx, score)| {
            let label = label_at(catalog, idx)?;
            Ok(TopPrediction {
                plant: plant_or_unknown(plants, label),
                label: label.to_string(),
                confidence: score,
            })
        })
        .collect::<Result<_, AppError>>()?;

    // Out-of-domain top-k still yields a non-empty list.
    let in_domain: Vec<TopPrediction> = raw_top
        .iter()
        .filter(|p| plants.supports(&p.label))
        .cloned()
        .collect();
    let top_predictions = if in_domain.is_empty() { raw_top } else { in_domain };

    let image_statistics = image_service::image_statistics(original)?;

    Ok(PredictionResult {
        predicted_label: predicted_label.to_string(),
        predicted_plant: plant_or_unknown(plants, predicted_label),
        confidence,
        top_predictions,
        is_healthy: plant_matches(predicted_label, "healthy"),
        is_supported_plant: plants.supports(predicted_label),
        image_statistics,
        metadata: PredictionMetadata {
            model_type: model_type.to_string(),
            supported_plants: plants.names().to_vec(),
        },
        caller_id: None,
    })
}

/// Indices ordered by descending score. The sort is stable, so equal scores
/// keep ascending index order.
fn rank(scores: &[f32]) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed
}

fn label_at(catalog: &ClassCatalog, index: usize) -> Result<&str, AppError> {
    catalog
        .get(index)
        .ok_or_else(|| AppError::Prediction(format!("No label for class index {}", index)))
}

fn plant_or_unknown(plants: &TargetPlants, label: &str) -> String {
    plants.attribute(label).unwrap_or(UNKNOWN_PLANT).to_string()
}
