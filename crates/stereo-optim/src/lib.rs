//! Non-linear refinement for stereo calibration.
//!
//! [`NllsProblem`] describes a dense least-squares problem; [`LmBackend`]
//! solves it with `levenberg-marquardt`. The calibration problems share one
//! planar bundle model (cameras, optional rig transform, per-view board
//! poses) and differ only in which parameters are free.

pub mod backend_lm;
pub mod params;
pub mod problems;
pub mod robust;
pub mod traits;

pub use backend_lm::LmBackend;
pub use problems::mono::{calibrate_mono, MonoCalibOptions, MonoCalibration};
pub use problems::stereo::{calibrate_stereo, StereoCalibOptions, StereoCalibration};
pub use robust::RobustKernel;
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
