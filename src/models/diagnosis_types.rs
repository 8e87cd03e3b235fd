use serde::Serialize;

pub const UNKNOWN_PLANT: &str = "Unknown";

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PredictionResult {
    pub predicted_label: String,
    pub predicted_plant: String,
    pub confidence: f32,
    pub top_predictions: Vec<TopPrediction>,
    pub is_healthy: bool,
    pub is_supported_plant: bool,
    pub image_statistics: ImageStatistics,
    pub metadata: PredictionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TopPrediction {
    pub label: String,
    pub confidence: f32,
    pub plant: String,
}

/// Statistics of the image as submitted, before enhancement or resizing.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ImageStatistics {
    pub width: u32,
    pub height: u32,
    pub color_mode: String,
    pub mean_brightness: f64,
    pub std_brightness: f64,
    /// Extremes on the image's own sample scale (0-255, 0-65535 or float).
    pub min_pixel: f64,
    pub max_pixel: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PredictionMetadata {
    pub model_type: String,
    pub supported_plants: Vec<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SupportedPlant {
    pub plant_name: String,
    pub diseases_count: usize,
    pub diseases: Vec<String>,
    pub has_healthy_class: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub model_type: String,
    pub input_shape: Vec<i64>,
    pub output_shape: Vec<i64>,
    pub layout: String,
    pub target_size: (u32, u32),
    pub num_classes: usize,
}
