//! Leaf photo to disease diagnosis.
//!
//! A [`services::prediction_service::PredictionService`] owns one loaded
//! classifier and runs each request through validation, enhancement,
//! tensor preprocessing, inference and diagnosis synthesis.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::PipelineConfig;
pub use error::AppError;
pub use models::diagnosis_types::PredictionResult;
pub use services::prediction_service::PredictionService;
