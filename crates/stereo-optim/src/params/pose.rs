use nalgebra::{Translation3, UnitQuaternion};
use stereo_core::{Iso3, Real, Vec3};

/// Axis-angle rotation followed by translation.
pub const POSE_BLOCK_LEN: usize = 6;

pub fn pack_pose(pose: &Iso3) -> [Real; POSE_BLOCK_LEN] {
    let w = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    [w.x, w.y, w.z, t.x, t.y, t.z]
}

pub fn unpack_pose(block: &[Real]) -> Iso3 {
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(block[0], block[1], block[2]));
    Iso3::from_parts(Translation3::new(block[3], block[4], block[5]), rot)
}
