//! Chessboard image pairs to stereo parameters.

use std::path::{Path, PathBuf};

use image::GrayImage;
use log::{debug, info, warn};
use rayon::prelude::*;
use stereo_core::{
    rotation_defect, CalibrationTarget, CorrespondenceView, ImageSize, Pt2, Pt3, Real,
    StereoParameters,
};
use stereo_detect::{ChessboardDetector, CornerObservation};
use stereo_optim::{calibrate_mono, calibrate_stereo, MonoCalibration, StereoCalibration};

use crate::sources::{check_resolutions, open_image, resolve_pairs, ImageSource};
use crate::{save_stereo_params, CalibrationConfig, CalibrationStage, PipelineConfig, PipelineError, Result};

/// Largest tolerated deviation of `R` from a proper rotation.
const ROTATION_TOLERANCE: Real = 1e-6;

/// Receives every pair after detection, found or not.
///
/// Used for diagnostics only; it cannot influence the run.
pub trait DetectionObserver: Send + Sync {
    fn on_pair(&self, left: &GrayImage, right: &GrayImage, detection: &PairDetection);
}

/// Detection result for one image pair.
#[derive(Debug, Clone)]
pub struct PairDetection {
    /// Position of the pair in the resolved source.
    pub index: usize,
    pub left_path: PathBuf,
    pub right_path: PathBuf,
    pub left: CornerObservation,
    pub right: CornerObservation,
}

impl PairDetection {
    pub fn is_complete(&self) -> bool {
        self.left.is_found() && self.right.is_found()
    }

    /// Corners of both images, or `FeatureNotFound` when either side failed.
    pub fn require(&self) -> Result<(&[Pt2], &[Pt2])> {
        match (self.left.corners(), self.right.corners()) {
            (Some(l), Some(r)) => Ok((l, r)),
            _ => Err(PipelineError::FeatureNotFound { pair: self.index }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StereoView {
    /// Index of the source pair.
    pub index: usize,
    pub left: CorrespondenceView,
    pub right: CorrespondenceView,
}

/// Accepted pairs with their board correspondences.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    pub target: CalibrationTarget,
    pub object_points: Vec<Pt3>,
    pub image_size: ImageSize,
    pub views: Vec<StereoView>,
}

impl ObservationSet {
    pub fn new(target: CalibrationTarget, image_size: ImageSize) -> Self {
        Self {
            object_points: target.object_points(),
            target,
            image_size,
            views: Vec::new(),
        }
    }

    /// Append a pair whose corners were found on both sides.
    pub fn push(&mut self, detection: &PairDetection) -> Result<()> {
        let (l, r) = detection.require()?;
        self.views.push(StereoView {
            index: detection.index,
            left: CorrespondenceView::new(self.object_points.clone(), l.to_vec())?,
            right: CorrespondenceView::new(self.object_points.clone(), r.to_vec())?,
        });
        Ok(())
    }

    pub fn left_views(&self) -> Vec<CorrespondenceView> {
        self.views.iter().map(|v| v.left.clone()).collect()
    }

    pub fn right_views(&self) -> Vec<CorrespondenceView> {
        self.views.iter().map(|v| v.right.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub params: StereoParameters,
    pub observations: ObservationSet,
    pub detections: Vec<PairDetection>,
    pub mono_left: MonoCalibration,
    pub mono_right: MonoCalibration,
    pub stereo: StereoCalibration,
}

/// Detect the target in every pair, in parallel. Output keeps input order.
pub fn detect_pairs(
    pairs: &[(PathBuf, PathBuf)],
    target: &CalibrationTarget,
    detector: &ChessboardDetector,
    observer: Option<&dyn DetectionObserver>,
) -> Result<Vec<PairDetection>> {
    pairs
        .par_iter()
        .enumerate()
        .map(|(index, (lp, rp))| -> Result<PairDetection> {
            let left_img = open_image(lp)?.to_luma8();
            let right_img = open_image(rp)?.to_luma8();
            let detection = PairDetection {
                index,
                left_path: lp.clone(),
                right_path: rp.clone(),
                left: detector.detect(&left_img, target),
                right: detector.detect(&right_img, target),
            };
            debug!(
                "pair {index}: left {}, right {}",
                found_str(&detection.left),
                found_str(&detection.right)
            );
            if let Some(obs) = observer {
                obs.on_pair(&left_img, &right_img, &detection);
            }
            Ok(detection)
        })
        .collect()
}

fn found_str(obs: &CornerObservation) -> &'static str {
    if obs.is_found() {
        "found"
    } else {
        "not found"
    }
}

fn gate(stage: CalibrationStage, rms: Real, ceiling: Real) -> Result<()> {
    if rms.is_finite() && rms <= ceiling {
        Ok(())
    } else {
        Err(PipelineError::CalibrationQuality {
            stage,
            rms,
            ceiling,
        })
    }
}

fn check_geometry(params: &StereoParameters) -> Result<()> {
    let defect = rotation_defect(&params.extrinsics.rotation);
    if !(defect < ROTATION_TOLERANCE) {
        return Err(PipelineError::GeometryShape {
            name: "R".into(),
            expected: "proper rotation".into(),
            found: format!("deviation {defect:.3e}"),
        });
    }
    if !params.extrinsics.translation.iter().all(|v| v.is_finite()) {
        return Err(PipelineError::GeometryShape {
            name: "T".into(),
            expected: "finite 3x1".into(),
            found: "non-finite entries".into(),
        });
    }
    Ok(())
}

/// Detection, per-camera calibration and joint stereo refinement.
pub fn calibrate(
    source: &ImageSource,
    config: &CalibrationConfig,
    observer: Option<&dyn DetectionObserver>,
) -> Result<CalibrationOutcome> {
    let pairs = resolve_pairs(source)?;
    let image_size = check_resolutions(&pairs)?;

    let detector = ChessboardDetector::new(config.detector);
    let detections = detect_pairs(&pairs, &config.target, &detector, observer)?;

    let mut observations = ObservationSet::new(config.target, image_size);
    for detection in &detections {
        match observations.push(detection) {
            Ok(()) => {}
            Err(err @ PipelineError::FeatureNotFound { .. }) => {
                warn!(
                    "{err}, skipping {} / {}",
                    detection.left_path.display(),
                    detection.right_path.display()
                );
            }
            Err(err) => return Err(err),
        }
    }
    if observations.is_empty() {
        return Err(PipelineError::EmptyObservationSet);
    }
    info!(
        "target found in {} of {} pairs",
        observations.len(),
        detections.len()
    );

    let left_views = observations.left_views();
    let right_views = observations.right_views();

    let mono_left = calibrate_mono(&left_views, image_size, &config.mono)?;
    gate(CalibrationStage::MonoLeft, mono_left.rms, config.mono_max_rms)?;
    let mono_right = calibrate_mono(&right_views, image_size, &config.mono)?;
    gate(CalibrationStage::MonoRight, mono_right.rms, config.mono_max_rms)?;

    let stereo = calibrate_stereo(&left_views, &right_views, &mono_left, &mono_right, &config.stereo)?;
    gate(CalibrationStage::Stereo, stereo.rms, config.stereo_max_rms)?;

    let params = stereo.to_parameters(image_size, Some((mono_left.rms, mono_right.rms)));
    check_geometry(&params)?;

    Ok(CalibrationOutcome {
        params,
        observations,
        detections,
        mono_left,
        mono_right,
        stereo,
    })
}

/// [`calibrate`] followed by saving the parameters to `params_path`.
///
/// The file is only touched once every stage has passed.
pub fn run_calibration(
    source: &ImageSource,
    config: &PipelineConfig,
    params_path: &Path,
    observer: Option<&dyn DetectionObserver>,
) -> Result<CalibrationOutcome> {
    config.validate()?;
    let outcome = calibrate(source, &config.calibration, observer)?;
    save_stereo_params(params_path, &outcome.params)?;
    info!(
        "calibration done: rms {:.4} px, baseline {:.3}",
        outcome.params.rms,
        outcome.params.extrinsics.baseline()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(index: usize, left: bool, right: bool) -> PairDetection {
        let corners = |found: bool| {
            if found {
                CornerObservation::Found(CalibrationTarget::new(3, 2, 10.0).board_points())
            } else {
                CornerObservation::NotFound
            }
        };
        PairDetection {
            index,
            left_path: PathBuf::from("l.png"),
            right_path: PathBuf::from("r.png"),
            left: corners(left),
            right: corners(right),
        }
    }

    #[test]
    fn incomplete_pair_reports_its_index() {
        assert!(detection(0, true, true).is_complete());
        let err = detection(4, true, false).require().unwrap_err();
        assert!(matches!(err, PipelineError::FeatureNotFound { pair: 4 }));
    }

    #[test]
    fn observation_set_pairs_corners_with_object_points() {
        let target = CalibrationTarget::new(3, 2, 10.0);
        let mut set = ObservationSet::new(target, ImageSize::new(64, 48));
        set.push(&detection(2, true, true)).unwrap();
        assert!(set.push(&detection(3, false, true)).is_err());
        assert_eq!(set.len(), 1);
        assert_eq!(set.views[0].index, 2);
        assert_eq!(set.left_views()[0].points_3d, target.object_points());
        assert_eq!(set.right_views()[0].points_2d[1], Pt2::new(10.0, 0.0));
    }

    #[test]
    fn quality_gate_rejects_large_and_non_finite_errors() {
        assert!(gate(CalibrationStage::Stereo, 0.5, 1.0).is_ok());
        assert!(gate(CalibrationStage::MonoLeft, 1.5, 1.0).is_err());
        let err = gate(CalibrationStage::MonoRight, Real::NAN, 1.0).unwrap_err();
        assert!(err.to_string().starts_with("right camera"));
    }
}
