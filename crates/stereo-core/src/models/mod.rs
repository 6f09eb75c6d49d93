//! Camera model building blocks.
//!
//! - [`IntrinsicsModel`] maps the normalized image plane to pixels,
//! - [`DistortionModel`] applies and removes lens distortion,
//! - [`PinholeCamera`] composes both into full projection.

mod camera;
mod distortion;
mod intrinsics;

pub use camera::*;
pub use distortion::*;
pub use intrinsics::*;
