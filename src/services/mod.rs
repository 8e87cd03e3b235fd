pub mod classifier;
pub mod fs_service;
pub mod image_service;
pub mod prediction_service;
