//! One image pair plus a stored calibration to a disparity map or point cloud.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{imageops, GrayImage, Luma, RgbImage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use stereo_core::{ImageSize, Mat4};
use stereo_dense::{
    decimate, reconstruct, write_ply, DisparityField, PointCloud, Reconstruction, SgmMatcher,
    StereoRectifier,
};

use crate::sources::open_image;
use crate::visualize::side_by_side_with_guides;
use crate::{load_stereo_params, PipelineConfig, PipelineError, Result};

/// What a reconstruction run writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Colour-mapped disparity PNG.
    Disparity,
    /// ASCII PLY point cloud.
    #[default]
    #[serde(rename = "cloud")]
    PointCloud,
    None,
}

#[derive(Debug, Clone)]
pub struct ReconstructionRequest {
    pub left: PathBuf,
    pub right: PathBuf,
    pub params_path: PathBuf,
    pub output: OutputMode,
    pub out_dir: PathBuf,
    /// Also write the rectified pair and a raw disparity preview.
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct ReconstructionOutcome {
    pub disparity: DisparityField,
    pub reconstruction: Reconstruction,
    /// Filtered cloud after decimation.
    pub cloud: PointCloud,
    pub q: Mat4,
    pub written: Vec<PathBuf>,
}

/// Intermediate products of [`process_pair`].
pub struct PairProducts {
    pub rectified_left: RgbImage,
    pub rectified_right: RgbImage,
    pub disparity: DisparityField,
    pub reconstruction: Reconstruction,
    pub cloud: PointCloud,
    pub q: Mat4,
}

/// Rectify, match and reproject one colour pair.
///
/// The rectifier caches its tables, so a caller processing a sequence of
/// equally sized frames should keep it alive between calls.
pub fn process_pair(
    rectifier: &StereoRectifier,
    left: &RgbImage,
    right: &RgbImage,
    config: &PipelineConfig,
) -> Result<PairProducts> {
    let rectified = rectifier.rectify_pair(left, right, &config.rectify)?;
    let left_gray = imageops::grayscale(&rectified.left);
    let right_gray = imageops::grayscale(&rectified.right);

    let matcher = SgmMatcher::new(config.matching.clone())?;
    let disparity = matcher.compute(&left_gray, &right_gray)?;
    debug!(
        "disparity: {} of {} pixels valid",
        disparity.valid_count(),
        disparity.data.len()
    );

    let reconstruction = reconstruct(
        &disparity,
        &rectified.q,
        &rectified.left,
        config.reconstruction.max_depth,
    )?;
    let cloud = decimate(&reconstruction.cloud, config.reconstruction.decimation);
    info!(
        "point cloud: {} points ({} before decimation)",
        cloud.len(),
        reconstruction.cloud.len()
    );

    Ok(PairProducts {
        rectified_left: rectified.left,
        rectified_right: rectified.right,
        disparity,
        reconstruction,
        cloud,
        q: rectified.q,
    })
}

/// Grey preview of the raw search range; rejected pixels are black.
fn disparity_preview(disparity: &DisparityField) -> GrayImage {
    let lo = disparity.min_disparity as f32;
    let span = disparity.num_disparities.max(1) as f32;
    GrayImage::from_fn(disparity.width, disparity.height, |x, y| {
        let v = disparity
            .value(x, y)
            .map_or(0.0, |d| ((d - lo) / span * 255.0).clamp(0.0, 255.0));
        Luma([v.round() as u8])
    })
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(PipelineError::InputStructure(format!(
            "image {} does not exist",
            path.display()
        )));
    }
    Ok(open_image(path)?.to_rgb8())
}

pub fn run_reconstruction(
    request: &ReconstructionRequest,
    config: &PipelineConfig,
) -> Result<ReconstructionOutcome> {
    config.validate()?;
    let params = load_stereo_params(&request.params_path)?;

    let left = load_rgb(&request.left)?;
    let right = load_rgb(&request.right)?;
    let size = ImageSize::new(left.width(), left.height());
    let right_size = ImageSize::new(right.width(), right.height());
    if size != right_size {
        return Err(PipelineError::InputStructure(format!(
            "left image is {size}, right image is {right_size}"
        )));
    }
    if size != params.image_size {
        warn!(
            "images are {size} but the calibration was made at {}",
            params.image_size
        );
    }

    let rectifier = StereoRectifier::new(Arc::new(params));
    let products = process_pair(&rectifier, &left, &right, config)?;

    let mut written = Vec::new();
    if request.output != OutputMode::None || request.verbose {
        fs::create_dir_all(&request.out_dir)?;
    }
    match request.output {
        OutputMode::Disparity => {
            let path = request.out_dir.join("disparity.png");
            products.disparity.to_color_image().save(&path)?;
            written.push(path);
        }
        OutputMode::PointCloud => {
            let path = request.out_dir.join("point_cloud.ply");
            write_ply(&path, &products.cloud)?;
            written.push(path);
        }
        OutputMode::None => {}
    }
    if request.verbose {
        let path = request.out_dir.join("rectified_pair.png");
        side_by_side_with_guides(&products.rectified_left, &products.rectified_right).save(&path)?;
        written.push(path);
        let path = request.out_dir.join("disparity_preview.png");
        disparity_preview(&products.disparity).save(&path)?;
        written.push(path);
    }
    for path in &written {
        info!("wrote {}", path.display());
    }

    Ok(ReconstructionOutcome {
        disparity: products.disparity,
        reconstruction: products.reconstruction,
        cloud: products.cloud,
        q: products.q,
        written,
    })
}
