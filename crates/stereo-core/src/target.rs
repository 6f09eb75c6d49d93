use serde::{Deserialize, Serialize};

use crate::{Pt2, Pt3, Real};

/// Planar chessboard target: `rows × cols` interior corners spaced `square_size` apart.
///
/// `square_size` is in millimetres, which makes every recovered translation
/// (and the reconstructed point cloud) millimetre-scaled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationTarget {
    /// Interior corners per row (along the board x axis).
    pub cols: usize,
    /// Interior corners per column (along the board y axis).
    pub rows: usize,
    /// Physical spacing between neighbouring corners.
    pub square_size: Real,
}

impl Default for CalibrationTarget {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 6,
            square_size: 25.0,
        }
    }
}

impl CalibrationTarget {
    pub fn new(cols: usize, rows: usize, square_size: Real) -> Self {
        Self {
            cols,
            rows,
            square_size,
        }
    }

    pub fn num_corners(&self) -> usize {
        self.cols * self.rows
    }

    /// Canonical object points on Z = 0, row-major with x varying fastest.
    pub fn object_points(&self) -> Vec<Pt3> {
        self.board_points()
            .into_iter()
            .map(|p| Pt3::new(p.x, p.y, 0.0))
            .collect()
    }

    /// Canonical board-plane coordinates, same order as [`Self::object_points`].
    pub fn board_points(&self) -> Vec<Pt2> {
        let mut pts = Vec::with_capacity(self.num_corners());
        for j in 0..self.rows {
            for i in 0..self.cols {
                pts.push(Pt2::new(
                    i as Real * self.square_size,
                    j as Real * self.square_size,
                ));
            }
        }
        pts
    }

    /// Grid index `(i, j)` of the canonical point at `idx`.
    pub fn grid_index(&self, idx: usize) -> (usize, usize) {
        (idx % self.cols, idx / self.cols)
    }
}
