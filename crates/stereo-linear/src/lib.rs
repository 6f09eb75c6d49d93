//! Linear and closed-form solvers used to initialise stereo calibration.
//!
//! Everything here is deterministic and non-iterative; the results seed the
//! Levenberg-Marquardt refinement in `stereo-optim`.
//!
//! - [`homography`]: normalized DLT plane-to-image homography,
//! - [`zhang_intrinsics`]: intrinsics from homographies,
//! - [`planar_pose`]: board pose from a homography and K,
//! - [`distortion_fit`]: linear Brown-Conrady estimate from homography residuals,
//! - [`rig`]: permutation-invariant relative pose of a two-camera rig,
//! - [`epipolar`]: essential and fundamental matrices.

pub mod distortion_fit;
pub mod epipolar;
pub mod homography;
pub mod math;
pub mod planar_pose;
pub mod rig;
pub mod zhang_intrinsics;

pub use distortion_fit::{estimate_distortion_from_homographies, DistortionFitError, DistortionFitOptions, DistortionView};
pub use epipolar::{epipolar_line_distance, essential_from_extrinsics, fundamental_from_essential};
pub use homography::{dlt_homography, HomographyError};
pub use planar_pose::{estimate_planar_pose_from_h, PlanarPoseError};
pub use rig::{estimate_rig_extrinsics, RigInitError};
pub use zhang_intrinsics::{
    estimate_focal_with_fixed_principal_point, estimate_intrinsics_from_homographies,
    IntrinsicsInitError,
};
