//! Board observations and image dimensions.

use crate::{Pt2, Pt3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Target corners of one image and where they were observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceView {
    /// Target frame, `z = 0` on the board.
    pub points_3d: Vec<Pt3>,
    /// Pixels, index-aligned with `points_3d`.
    pub points_2d: Vec<Pt2>,
}

impl CorrespondenceView {
    pub fn new(points_3d: Vec<Pt3>, points_2d: Vec<Pt2>) -> Result<Self> {
        ensure!(
            points_3d.len() == points_2d.len(),
            "3D / 2D point counts must match: {} vs {}",
            points_3d.len(),
            points_2d.len()
        );
        Ok(Self {
            points_3d,
            points_2d,
        })
    }

    /// Target points dropped onto the Z = 0 plane.
    pub fn planar_points(&self) -> Vec<Pt2> {
        self.points_3d
            .iter()
            .map(|p3| Pt2::new(p3.x, p3.y))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_3d.is_empty()
    }
}

/// Image resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_counts_are_rejected() {
        let err = CorrespondenceView::new(vec![Pt3::origin()], vec![]).unwrap_err();
        assert!(err.to_string().contains("must match"));
    }
}
