//! End-to-end stereo runs over image files.
//!
//! - [`run_calibration`]: chessboard image pairs → detection → mono and
//!   stereo calibration → quality gates → persisted [`StereoParameters`].
//! - [`run_reconstruction`]: calibration file plus one image pair →
//!   rectification → SGM → point cloud, written as PNG or PLY.
//!
//! All stage parameters come from an explicit [`PipelineConfig`].
//!
//! [`StereoParameters`]: stereo_core::StereoParameters

pub mod calibration;
pub mod config;
pub mod error;
pub mod params_io;
pub mod reconstruction;
pub mod sources;
pub mod visualize;

pub use calibration::{
    calibrate, detect_pairs, run_calibration, CalibrationOutcome, DetectionObserver,
    ObservationSet, PairDetection, StereoView,
};
pub use config::{
    load_config, CalibrationConfig, PathsConfig, PipelineConfig, ReconstructionConfig,
};
pub use error::{CalibrationStage, PipelineError, Result};
pub use params_io::{load_stereo_params, save_stereo_params, StereoParamsDocument};
pub use reconstruction::{
    process_pair, run_reconstruction, OutputMode, PairProducts, ReconstructionOutcome,
    ReconstructionRequest,
};
pub use sources::{check_resolutions, natural_cmp, resolve_pairs, ImageSource};
pub use visualize::CornerOverlayWriter;
