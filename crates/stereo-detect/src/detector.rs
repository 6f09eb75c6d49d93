use calib_targets::chessboard::ChessboardDetectionResult;
use calib_targets::{detect, ChessboardParams};
use chess_corners::ChessConfig;
use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};
use stereo_core::{CalibrationTarget, Pt2, Real};
use stereo_linear::{dlt_homography, homography::apply_homography};

use crate::grid::order_labelled;
use crate::image_f32::ImageF32;
use crate::subpix::{refine_corners, SubPixParams};

/// Tunables of the chessboard detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Maximum deviation from the best-fit homography, as a fraction of the
    /// mean lattice step.
    pub max_homography_residual: Real,
    pub subpix: SubPixParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            max_homography_residual: 0.3,
            subpix: SubPixParams::default(),
        }
    }
}

/// Outcome of a detection: all corners or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum CornerObservation {
    /// Refined corners in canonical row-major order.
    Found(Vec<Pt2>),
    NotFound,
}

impl CornerObservation {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn corners(&self) -> Option<&[Pt2]> {
        match self {
            Self::Found(c) => Some(c),
            Self::NotFound => None,
        }
    }

    pub fn into_corners(self) -> Option<Vec<Pt2>> {
        match self {
            Self::Found(c) => Some(c),
            Self::NotFound => None,
        }
    }
}

/// Grid-labelled corner positions of a localiser result.
fn labelled_corners(detection: ChessboardDetectionResult) -> Vec<((i64, i64), Pt2)> {
    let mut out = Vec::new();
    for corner in detection.detection.corners {
        let Some(grid) = corner.grid else {
            continue;
        };
        let (Ok(i), Ok(j)) = (i64::try_from(grid.i), i64::try_from(grid.j)) else {
            continue;
        };
        out.push((
            (i, j),
            Pt2::new(corner.position.x as Real, corner.position.y as Real),
        ));
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct ChessboardDetector {
    params: DetectorParams,
}

impl ChessboardDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Unrefined corners in canonical order, or `None` when the board is
    /// missing, partial or fails the homography gate.
    pub fn coarse_corners(&self, img: &GrayImage, target: &CalibrationTarget) -> Option<Vec<Pt2>> {
        if img.width() < 3 || img.height() < 3 {
            return None;
        }
        let chess_config = ChessConfig::default();
        let board_params = ChessboardParams {
            expected_rows: target.rows.try_into().ok(),
            expected_cols: target.cols.try_into().ok(),
            ..ChessboardParams::default()
        };
        let Some(detection) = detect::detect_chessboard(img, &chess_config, board_params) else {
            debug!("no {}x{} chessboard located", target.cols, target.rows);
            return None;
        };

        let labelled = labelled_corners(detection);
        let Some(coarse) = order_labelled(&labelled, target.cols, target.rows) else {
            debug!(
                "{} labelled corners do not form a complete {}x{} grid",
                labelled.len(),
                target.cols,
                target.rows
            );
            return None;
        };
        self.homography_consistent(&coarse, target).then_some(coarse)
    }

    pub fn detect(&self, img: &GrayImage, target: &CalibrationTarget) -> CornerObservation {
        let Some(coarse) = self.coarse_corners(img, target) else {
            return CornerObservation::NotFound;
        };
        let src = ImageF32::from_gray(img);
        CornerObservation::Found(refine_corners(&src, &coarse, &self.params.subpix))
    }

    fn homography_consistent(&self, corners: &[Pt2], target: &CalibrationTarget) -> bool {
        let board = target.board_points();
        let Ok(h) = dlt_homography(&board, corners) else {
            debug!("degenerate corner homography");
            return false;
        };
        let cols = target.cols;
        let mut step = 0.0;
        let mut n = 0usize;
        for (idx, p) in corners.iter().enumerate() {
            if (idx + 1) % cols != 0 {
                step += (corners[idx + 1] - p).norm();
                n += 1;
            }
            if idx + cols < corners.len() {
                step += (corners[idx + cols] - p).norm();
                n += 1;
            }
        }
        let step = step / n.max(1) as Real;
        let worst = board
            .iter()
            .zip(corners)
            .map(|(b, c)| (apply_homography(&h, b) - c).norm())
            .fold(0.0, Real::max);
        let ok = worst <= self.params.max_homography_residual * step;
        if !ok {
            debug!("homography residual {worst:.2}px exceeds gate (step {step:.1}px)");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_image_is_not_found() {
        let img = GrayImage::new(8, 8);
        let det = ChessboardDetector::default();
        let obs = det.detect(&img, &CalibrationTarget::new(4, 3, 10.0));
        assert_eq!(obs, CornerObservation::NotFound);
        assert!(obs.corners().is_none());
        let empty = GrayImage::new(0, 0);
        assert!(!det.detect(&empty, &CalibrationTarget::new(4, 3, 10.0)).is_found());
    }

    fn perspective_lattice(target: &CalibrationTarget) -> Vec<Pt2> {
        target
            .board_points()
            .iter()
            .map(|b| {
                let w = 1.0 + 0.002 * b.x;
                Pt2::new((120.0 + 2.0 * b.x) / w, (80.0 + 2.0 * b.y + 0.3 * b.x) / w)
            })
            .collect()
    }

    #[test]
    fn gate_accepts_projective_lattices_and_rejects_outliers() {
        let target = CalibrationTarget::new(6, 4, 20.0);
        let det = ChessboardDetector::default();
        let mut corners = perspective_lattice(&target);
        assert!(det.homography_consistent(&corners, &target));

        // One corner half a square off its lattice position.
        corners[9].x += 20.0;
        assert!(!det.homography_consistent(&corners, &target));
    }
}
