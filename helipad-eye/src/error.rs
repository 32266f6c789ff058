//! Error types for helipad-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl From<opencv::Error> for DetectionError {
    fn from(err: opencv::Error) -> Self {
        DetectionError::OpenCv(err.message)
    }
}
