use stereo_core::ImageSize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenseError {
    #[error("invalid matcher parameters: {0}")]
    InvalidParams(String),
    #[error("empty image ({0})")]
    EmptyImage(ImageSize),
    #[error("image size mismatch: left {left}, right {right}")]
    SizeMismatch { left: ImageSize, right: ImageSize },
    #[error("rectification failed: {0}")]
    Rectification(String),
    #[error("malformed PLY: {0}")]
    Ply(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
