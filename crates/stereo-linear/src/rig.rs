//! Relative pose initialisation for a two-camera rig.
//!
//! Every view where both cameras saw the board gives one estimate
//! `right_from_left = right_from_board · left_from_board⁻¹`. The estimates are
//! combined with order-independent statistics: the chordal L2 mean of the
//! rotations and the per-axis median of the translations.

use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use stereo_core::{project_to_rotation, Iso3, Mat3, Real, Vec3};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum RigInitError {
    #[error("no views to initialise the rig from")]
    NoViews,
    #[error("left/right pose counts differ: {0} vs {1}")]
    CountMismatch(usize, usize),
    #[error("rotation averaging failed")]
    AveragingFailed,
}

pub fn estimate_rig_extrinsics(
    left_from_board: &[Iso3],
    right_from_board: &[Iso3],
) -> Result<Iso3, RigInitError> {
    if left_from_board.len() != right_from_board.len() {
        return Err(RigInitError::CountMismatch(
            left_from_board.len(),
            right_from_board.len(),
        ));
    }
    if left_from_board.is_empty() {
        return Err(RigInitError::NoViews);
    }

    let relative: Vec<Iso3> = left_from_board
        .iter()
        .zip(right_from_board)
        .map(|(l, r)| r * l.inverse())
        .collect();

    let rot_sum = relative.iter().fold(Mat3::zeros(), |acc, iso| {
        acc + iso.rotation.to_rotation_matrix().into_inner()
    });
    let rot = project_to_rotation(&rot_sum).ok_or(RigInitError::AveragingFailed)?;

    let mut t = Vec3::zeros();
    for axis in 0..3 {
        let values: Vec<Real> = relative.iter().map(|iso| iso.translation.vector[axis]).collect();
        t[axis] = median(values);
    }

    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
    Ok(Iso3::from_parts(Translation3::from(t), q))
}

fn median(mut values: Vec<Real>) -> Real {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
