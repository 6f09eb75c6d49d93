use std::fmt;
use std::path::PathBuf;

use stereo_core::Real;
use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Calibration step a quality gate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStage {
    MonoLeft,
    MonoRight,
    Stereo,
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MonoLeft => "left camera",
            Self::MonoRight => "right camera",
            Self::Stereo => "stereo",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InputStructure(String),
    #[error("calibration target not found in pair {pair}")]
    FeatureNotFound { pair: usize },
    #[error("no image pair with the calibration target visible in both images")]
    EmptyObservationSet,
    #[error("{stage} reprojection error {rms:.4} px exceeds {ceiling} px")]
    CalibrationQuality {
        stage: CalibrationStage,
        rms: Real,
        ceiling: Real,
    },
    #[error("calibration file {} not found; run calibration first", path.display())]
    MissingCalibration { path: PathBuf },
    #[error("{name} has shape {found}, expected {expected}")]
    GeometryShape {
        name: String,
        expected: String,
        found: String,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<stereo_dense::DenseError> for PipelineError {
    fn from(err: stereo_dense::DenseError) -> Self {
        match err {
            stereo_dense::DenseError::SizeMismatch { left, right } => {
                Self::InputStructure(format!("image sizes differ: {left} vs {right}"))
            }
            stereo_dense::DenseError::EmptyImage(size) => {
                Self::InputStructure(format!("empty image ({size})"))
            }
            stereo_dense::DenseError::InvalidParams(msg) => Self::InvalidConfig(msg),
            stereo_dense::DenseError::Io(e) => Self::Io(e),
            other => Self::Other(other.into()),
        }
    }
}
