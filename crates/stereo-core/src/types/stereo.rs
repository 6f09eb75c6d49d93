use serde::{Deserialize, Serialize};

use crate::{ImageSize, Iso3, Mat3, PinholeCamera, Real, Vec3};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};

/// Pose of the right camera relative to the left: `X_r = R · X_l + T`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoExtrinsics {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl StereoExtrinsics {
    pub fn from_iso(right_from_left: &Iso3) -> Self {
        Self {
            rotation: right_from_left.rotation.to_rotation_matrix().into_inner(),
            translation: right_from_left.translation.vector,
        }
    }

    /// Rigid transform from the left camera frame into the right one.
    ///
    /// The rotation is re-normalized, so slightly non-orthonormal input is tolerated.
    pub fn to_iso(&self) -> Iso3 {
        let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&self.rotation));
        Iso3::from_parts(Translation3::from(self.translation), rot)
    }

    pub fn baseline(&self) -> Real {
        self.translation.norm()
    }
}

/// Complete result of a stereo calibration run.
///
/// Created once by calibration, then only read by rectification and
/// reconstruction. A new run produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StereoParameters {
    pub image_size: ImageSize,
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    pub extrinsics: StereoExtrinsics,
    /// Essential matrix `[T]× R`.
    pub essential: Mat3,
    /// Fundamental matrix `K2⁻ᵀ E K1⁻¹`.
    pub fundamental: Mat3,
    /// Joint stereo RMS reprojection error in pixels.
    pub rms: Real,
    /// Left-camera RMS from the mono stage, when available.
    pub rms_left: Option<Real>,
    /// Right-camera RMS from the mono stage, when available.
    pub rms_right: Option<Real>,
}
