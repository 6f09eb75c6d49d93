//! Calibration problems built on the shared planar bundle.

pub mod bundle;
pub mod mono;
pub mod stereo;

pub use bundle::{BundleLayout, ObservationGroup, PlanarBundleProblem};
