use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Missing template image: {path}")]
    MissingTemplateImage { path: PathBuf },
    #[error("Failed to load template image {path}: {source}")]
    TemplateImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Invalid geometry: line from x={start_x} to x={end_x} has no horizontal extent")]
    InvalidGeometry { start_x: f64, end_x: f64 },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Unknown background: {0}")]
    UnknownBackground(String),
    #[error("Unknown foreground category: {0}")]
    UnknownCategory(String),
    #[error("Unknown object '{label}' in category '{category}'")]
    UnknownObject { category: String, label: String },
    #[error("No class id mapped for category: {0}")]
    MissingClassId(String),
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Generation cancelled")]
    Cancelled,
    #[error("Nothing to merge")]
    Empty,
}

pub type Result<T> = std::result::Result<T, SynthError>;
