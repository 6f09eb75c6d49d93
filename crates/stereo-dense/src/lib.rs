//! Dense stereo: rectification, semi-global matching and reconstruction.
//!
//! Typical flow for a calibrated rig:
//!
//! 1. [`StereoRectifier::rectify_pair`] warps both frames so epipolar lines
//!    become image rows and returns the reprojection matrix `Q`,
//! 2. [`SgmMatcher::compute`] produces a [`DisparityField`] on the grey
//!    rectified pair,
//! 3. [`reconstruct`] turns disparities into a dense [`PointGrid`] and a
//!    filtered, coloured [`PointCloud`],
//! 4. [`write_ply`] exports the cloud.

pub mod disparity;
pub mod error;
pub mod ply;
pub mod reconstruct;
pub mod rectifier;
pub mod rectify;
pub mod remap;
pub mod sgm;
pub mod speckle;

pub use disparity::DisparityField;
pub use error::DenseError;
pub use ply::{read_ply, write_ply};
pub use reconstruct::{
    decimate, filter_points, reconstruct, reproject_image_to_3d, PointCloud, PointGrid,
    Reconstruction, DEFAULT_MAX_DEPTH,
};
pub use rectifier::{RectifiedPair, RectifierMaps, StereoRectifier};
pub use rectify::{stereo_rectify, Rect, RectificationTransforms, RectifyOptions};
pub use remap::{init_rectify_map, remap, RemapTable};
pub use sgm::{SgmMatcher, SgmParams, SgmPaths};
