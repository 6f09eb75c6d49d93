//! Run configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! overrides. CLI flags are applied on top of the loaded value.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stereo_core::{CalibrationTarget, Real};
use stereo_dense::{RectifyOptions, SgmParams, DEFAULT_MAX_DEPTH};
use stereo_detect::DetectorParams;
use stereo_optim::{MonoCalibOptions, StereoCalibOptions};

use crate::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub target: CalibrationTarget,
    pub detector: DetectorParams,
    pub mono: MonoCalibOptions,
    /// Per-camera RMS ceiling in pixels.
    pub mono_max_rms: Real,
    pub stereo: StereoCalibOptions,
    /// Joint RMS ceiling in pixels.
    pub stereo_max_rms: Real,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target: CalibrationTarget::default(),
            detector: DetectorParams::default(),
            mono: MonoCalibOptions::default(),
            mono_max_rms: 1.0,
            stereo: StereoCalibOptions::default(),
            stereo_max_rms: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Points at or beyond this depth (calibration units) are dropped.
    pub max_depth: f32,
    /// Keep every n-th cloud point; 0 or 1 keeps all.
    pub decimation: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            decimation: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub calibration_images: PathBuf,
    pub test_images: PathBuf,
    pub output_dir: PathBuf,
    pub params_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            calibration_images: "data/calibration_images".into(),
            test_images: "data/test_images".into(),
            output_dir: "output".into(),
            params_file: "output/stereo_params.json".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub calibration: CalibrationConfig,
    pub matching: SgmParams,
    pub rectify: RectifyOptions,
    pub reconstruction: ReconstructionConfig,
    pub paths: PathsConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        let t = &self.calibration.target;
        if t.cols < 2 || t.rows < 2 {
            return invalid(format!("target needs at least 2x2 corners, got {}x{}", t.cols, t.rows));
        }
        if !(t.square_size > 0.0) {
            return invalid(format!("square size must be positive, got {}", t.square_size));
        }
        if !(self.calibration.mono_max_rms > 0.0) || !(self.calibration.stereo_max_rms > 0.0) {
            return invalid("RMS ceilings must be positive".into());
        }
        if let Some(alpha) = self.rectify.alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return invalid(format!("rectification alpha must be in [0, 1], got {alpha}"));
            }
        }
        if !(self.reconstruction.max_depth > 0.0) {
            return invalid(format!(
                "max depth must be positive, got {}",
                self.reconstruction.max_depth
            ));
        }
        self.matching.validate()?;
        Ok(())
    }
}

/// Read a configuration file, or defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(p) => {
            let text = fs::read_to_string(p)?;
            serde_json::from_str(&text)?
        }
        None => PipelineConfig::default(),
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{
                "calibration": { "target": { "cols": 7, "rows": 5, "square_size": 30.0 } },
                "matching": { "num_disparities": 96 },
                "rectify": { "alpha": null }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.calibration.target.cols, 7);
        assert_eq!(cfg.calibration.mono_max_rms, 1.0);
        assert_eq!(cfg.matching.num_disparities, 96);
        assert_eq!(cfg.matching.block_size, 5);
        assert_eq!(cfg.rectify.alpha, None);
        assert_eq!(cfg.paths.params_file, PathBuf::from("output/stereo_params.json"));
        cfg.validate().unwrap();
    }

    #[test]
    fn defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
        assert_eq!(PipelineConfig::default().rectify.alpha, Some(0.0));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.matching.num_disparities = 50;
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));

        let mut cfg = PipelineConfig::default();
        cfg.rectify.alpha = Some(1.5);
        assert!(cfg.validate().is_err());
    }
}
