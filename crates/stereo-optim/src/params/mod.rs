//! Packing of model parameters into flat optimisation blocks.

pub mod camera;
pub mod pose;

pub use camera::{CameraBlock, CAMERA_BLOCK_LEN};
pub use pose::{pack_pose, unpack_pose, POSE_BLOCK_LEN};
