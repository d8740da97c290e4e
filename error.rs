use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Path Error: {0}")]
    Path(String),

    /// Model or catalogue could not be loaded; the owning instance stays not-ready.
    #[error("Initialization Failed: {0}")]
    Init(String),

    /// Bitmap conversion or buffer size mismatch for a single call.
    #[error("Codec Error: {0}")]
    Codec(String),

    /// The inference engine failed for a single call.
    #[error("Inference Failed: {0}")]
    Inference(String),
}

impl Error {
    /// Whether the failure is scoped to one call rather than to the instance.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Codec(_) | Self::Inference(_) | Self::Image(_))
    }
}
