use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AppError {
    /// The image failed validation. The caller should ask for a new photo.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Preprocessing failed: {message}")]
    Preprocessing {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Fatal at startup; the service must not accept requests.
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn preprocessing(message: impl Into<String>) -> Self {
        AppError::Preprocessing {
            message: message.into(),
            source: None,
        }
    }

    pub fn preprocessing_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AppError::Preprocessing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Stable identifier used in serialized responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidImage(_) => "invalid_image",
            AppError::Preprocessing { .. } => "preprocessing",
            AppError::ModelLoad(_) => "model_load",
            AppError::Prediction(_) => "prediction",
            AppError::Config(_) => "config",
        }
    }
}

impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::preprocessing_with(format!("Image error: {}", err), err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Enhancement is best-effort; a warning means the original image is used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnhancementWarning {
    #[error("{name} factor must be finite and non-negative, got {value}")]
    InvalidFactor { name: &'static str, value: f32 },
    #[error("cannot enhance an empty image")]
    EmptyImage,
}
